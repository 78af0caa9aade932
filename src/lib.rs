//! A small line-oriented shell.
//!
//! Each input line is parsed into a chain of [`Stage`]s, one per pipeline
//! command, and handed to the [`Orchestrator`], which resolves executables on
//! `PATH`, wires pipes and file redirections between the child processes and
//! either waits for them or leaves them running in the background. A handful of
//! builtins (`cd`, `cut`, `chatroom`) run inside the interpreter process.
//!
//! The main entry point is [`Interpreter`], which drives the read-eval loop over
//! any [`LineSource`](editor::LineSource).

mod builtin;
pub mod command;
mod complete;
pub mod editor;
pub mod env;
pub mod error;
mod interpreter;
pub mod orchestrator;
pub mod parser;
pub mod resolve;
pub mod stage;

pub use interpreter::Interpreter;
pub use orchestrator::{Completion, Orchestrator, Outcome};
pub use stage::Stage;

/// Name used in prompts and as the prefix of every diagnostic.
pub const SYSNAME: &str = "shellish";

/// First word that ends the read-eval loop.
pub const EXIT_KEYWORD: &str = "exit";

/// Prints a one-line diagnostic on stderr, prefixed with the shell's name.
pub(crate) fn report(message: impl std::fmt::Display) {
    eprintln!("-{}: {}", SYSNAME, message);
}
