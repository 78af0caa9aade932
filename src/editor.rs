//! Where input lines come from.

use crate::SYSNAME;
use crate::env::Environment;
use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead};

/// Delivers one completed line at a time.
pub trait LineSource {
    /// Reads the next line without its terminator. `None` means end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Interactive source backed by `rustyline`, with in-memory history.
pub struct Editor {
    inner: DefaultEditor,
}

impl Editor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: DefaultEditor::new()?,
        })
    }
}

impl LineSource for Editor {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.inner.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.inner.add_history_entry(line.as_str())?;
                }
                Ok(Some(line))
            }
            // Ctrl-C drops whatever was typed and shows a fresh prompt.
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Non-interactive source reading newline-terminated lines. No prompt is shown.
pub struct PlainLines<R> {
    reader: R,
}

impl<R: BufRead> PlainLines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for PlainLines<R> {
    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        next_line(&mut self.reader)
    }
}

/// Reads from the process's standard input without holding its lock between
/// lines, so builtins can read the same stream.
impl LineSource for io::Stdin {
    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        next_line(&mut self.lock())
    }
}

fn next_line(reader: &mut dyn BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

/// `<user>@<host>:<cwd> shellish$ `
pub fn prompt(env: &Environment) -> String {
    let user = env.get_var("USER").unwrap_or_else(|| "user".to_string());
    let host = nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    format!(
        "{}@{}:{} {}$ ",
        user,
        host,
        env.current_dir.display(),
        SYSNAME
    )
}
