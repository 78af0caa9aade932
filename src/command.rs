use crate::env::Environment;
use anyhow::Result;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::os::fd::{AsRawFd, RawFd};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Signal-terminated children are reported as `128 + signal`.
pub type ExitCode = i32;

/// Output stream handed to a command run in the interpreter's process.
pub trait CommandOutput: Write {
    /// Descriptor the stream writes to, for helper processes that print on
    /// their own. `None` for in-memory buffers.
    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

impl CommandOutput for Vec<u8> {}

impl CommandOutput for File {
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.as_raw_fd())
    }
}

impl CommandOutput for io::Stdout {
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.as_raw_fd())
    }
}

/// Object-safe trait for a command the interpreter runs in its own process.
///
/// `stdin` is the caller's buffered reader itself, so whatever the command
/// does not consume stays available to the next reader.
pub trait ExecutableCommand {
    /// Runs the command to completion with the given streams.
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn BufRead,
        stdout: &mut dyn CommandOutput,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory {
    /// Name the factory answers to, used for completion.
    fn name(&self) -> &'static str;

    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}

/// Builtins consulted before any executable lookup.
pub struct BuiltinTable {
    factories: Vec<Box<dyn CommandFactory>>,
}

impl BuiltinTable {
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { factories }
    }

    /// A table without any builtin, so every name goes through `PATH`.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Creates the builtin registered under `name`, if any.
    pub fn lookup(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        self.factories
            .iter()
            .find_map(|factory| factory.try_create(env, name, args))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.iter().map(|factory| factory.name())
    }
}

impl Default for BuiltinTable {
    /// `cd`, `cut` and `chatroom`.
    fn default() -> Self {
        use crate::builtin::{Cd, Chatroom, Cut, Factory};
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Cut>::default()),
            Box::new(Factory::<Chatroom>::default()),
        ])
    }
}
