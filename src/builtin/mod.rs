//! Commands run inside the interpreter process.
//!
//! Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
//! in-process without spawning a child process.

mod cd;
mod chatroom;
mod cut;

pub use cd::Cd;
pub use chatroom::Chatroom;
pub use cut::Cut;

use crate::SYSNAME;
use crate::command::{CommandFactory, CommandOutput, ExecutableCommand, ExitCode};
use crate::env::Environment;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::io::{BufRead, Write};

/// Built-in commands known to the shell at compile time.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "cut".
    fn name() -> &'static str;

    /// Rewrites raw arguments before they reach `argh`.
    fn normalize_args(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn BufRead,
        stdout: &mut dyn CommandOutput,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn BufRead,
        stdout: &mut dyn CommandOutput,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match <T as BuiltinCommand>::execute(*self, stdin, stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                stdout.flush()?;
                eprintln!("-{}: {}: {:#}", SYSNAME, T::name(), e);
                Ok(1)
            }
        }
    }
}

/// Stands in for a builtin whose arguments did not parse, or that was asked for `--help`.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: &mut dyn BufRead,
        stdout: &mut dyn CommandOutput,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.is_error {
            eprintln!("{}", self.output.trim_end());
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output.trim_end())?;
            Ok(0)
        }
    }
}

/// Factory allows creating instances of a builtin by name.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        let normalized = T::normalize_args(args);
        let normalized: Vec<&str> = normalized.iter().map(String::as_str).collect();
        Some(match T::from_args(&[name], &normalized) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        })
    }
}
