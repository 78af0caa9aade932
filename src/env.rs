use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Name of the variable holding the executable search list.
pub const PATH_VAR: &str = "PATH";

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: variables passed to every spawned process and used to resolve `PATH`.
/// - `current_dir`: the working directory for spawned processes and redirections.
/// - `should_exit`: set once the read loop has seen `exit` or end of input.
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    pub current_dir: PathBuf,
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            should_exit: false,
        }
    }

    /// Get the value of a variable, falling back to the process environment.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override a variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// The colon-separated executable search list, empty when `PATH` is unset.
    pub fn search_path(&self) -> String {
        self.get_var(PATH_VAR).unwrap_or_default()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
