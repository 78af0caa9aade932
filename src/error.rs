use std::io;
use thiserror::Error;

/// Failures met while turning a stage chain into processes.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A `<`, `>` or `>>` operator was given no file name.
    #[error("{command}: syntax error: missing redirection target")]
    EmptyRedirect { command: String },

    /// A `|` with no command on one of its sides.
    #[error("syntax error near unexpected token `|'")]
    EmptyStage,

    /// No builtin or executable answers to the stage's program name.
    #[error("{command}: command not found")]
    NotFound { command: String },

    #[error("{command}: cannot create pipe: {source}")]
    Pipe {
        command: String,
        #[source]
        source: nix::Error,
    },

    #[error("{command}: {path}: {source}")]
    Redirect {
        command: String,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl ExecError {
    /// Exit status a stage reports when it fails with this error.
    pub fn status(&self) -> i32 {
        match self {
            ExecError::NotFound { .. } => 127,
            ExecError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            ExecError::Spawn { .. } => 126,
            _ => 1,
        }
    }
}
