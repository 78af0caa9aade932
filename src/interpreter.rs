use crate::command::{BuiltinTable, ExitCode};
use crate::complete;
use crate::editor::{LineSource, prompt};
use crate::env::Environment;
use crate::orchestrator::{Completion, Orchestrator, Outcome};
use crate::parser;
use crate::report;
use std::io::{self, Write};
use tracing::{debug, info};

/// The read-eval loop around the [`Orchestrator`].
///
/// Each line is parsed into a stage chain and executed; errors are printed and
/// never end the loop. `exit` or end of input stop it.
///
/// Example
/// ```
/// use shellish::Interpreter;
/// let mut sh = Interpreter::default();
/// sh.run_line("true");
/// assert_eq!(sh.last_status(), 0);
/// ```
pub struct Interpreter {
    orchestrator: Orchestrator,
    last_status: ExitCode,
}

impl Interpreter {
    pub fn new(env: Environment, builtins: BuiltinTable) -> Self {
        Self {
            orchestrator: Orchestrator::new(env, builtins),
            last_status: 0,
        }
    }

    pub fn env(&self) -> &Environment {
        self.orchestrator.env()
    }

    /// Status of the last foreground chain. Failed lines count as 1.
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// Parses and runs one line. A line ending in `?` prints completion
    /// candidates instead of running.
    pub fn run_line(&mut self, line: &str) -> Outcome {
        let chain = parser::parse(line);
        if chain.requests_autocomplete {
            let found = complete::candidates(
                &chain,
                self.orchestrator.builtins(),
                self.orchestrator.env(),
            );
            if let Err(e) = print_candidates(&found) {
                return Outcome::Error(e.into());
            }
            return Outcome::Continue(Completion::Finished(0));
        }

        let outcome = self.orchestrator.run(&chain);
        match &outcome {
            Outcome::Continue(Completion::Finished(code)) => self.last_status = *code,
            Outcome::Continue(Completion::Background(_)) => self.last_status = 0,
            Outcome::Error(_) => self.last_status = 1,
            Outcome::RequestExit => {}
        }
        outcome
    }

    /// Reads and runs lines from `source` until `exit` or end of input.
    pub fn repl(&mut self, source: &mut dyn LineSource) -> anyhow::Result<()> {
        while !self.env().should_exit {
            let Some(line) = source.read_line(&prompt(self.env()))? else {
                debug!("end of input");
                break;
            };
            match self.run_line(&line) {
                Outcome::Continue(_) => {}
                Outcome::RequestExit => break,
                Outcome::Error(e) => report(e),
            }
        }
        self.orchestrator.env_mut().should_exit = true;
        info!(status = self.last_status, "leaving");
        Ok(())
    }
}

impl Default for Interpreter {
    /// Interpreter over the current process environment with `cd`, `cut` and
    /// `chatroom`.
    fn default() -> Self {
        Self::new(Environment::new(), BuiltinTable::default())
    }
}

fn print_candidates(found: &[String]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    for candidate in found {
        writeln!(stdout, "{}", candidate)?;
    }
    stdout.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::PlainLines;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn interpreter_in(dir: &TempDir) -> Interpreter {
        let mut env = Environment::new();
        env.current_dir = dir.path().to_path_buf();
        Interpreter::new(env, BuiltinTable::default())
    }

    fn feed(sh: &mut Interpreter, script: &str) {
        let mut source = PlainLines::new(Cursor::new(script.to_string()));
        sh.repl(&mut source).unwrap();
    }

    #[test]
    fn test_repl_runs_every_line_until_end_of_input() {
        let dir = TempDir::new().unwrap();
        let mut sh = interpreter_in(&dir);
        feed(&mut sh, "echo one > a.txt\n\necho two >> a.txt\n");
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\ntwo\n");
        assert!(sh.env().should_exit);
    }

    #[test]
    fn test_exit_stops_the_loop() {
        let dir = TempDir::new().unwrap();
        let mut sh = interpreter_in(&dir);
        feed(&mut sh, "echo before > a.txt\nexit\necho after > b.txt\n");
        assert!(dir.path().join("a.txt").exists());
        assert!(!dir.path().join("b.txt").exists());
        assert!(sh.env().should_exit);
    }

    #[test]
    fn test_errors_do_not_end_the_loop() {
        let dir = TempDir::new().unwrap();
        let mut sh = interpreter_in(&dir);
        feed(
            &mut sh,
            "shellish_no_such_command_42\necho broken >\nls |\necho fine > ok.txt\n",
        );
        assert_eq!(fs::read_to_string(dir.path().join("ok.txt")).unwrap(), "fine\n");
        assert_eq!(sh.last_status(), 0);
    }

    #[test]
    fn test_last_status_tracks_foreground_chains() {
        let dir = TempDir::new().unwrap();
        let mut sh = interpreter_in(&dir);
        sh.run_line("false");
        assert_eq!(sh.last_status(), 1);
        sh.run_line("shellish_no_such_command_42");
        assert_eq!(sh.last_status(), 127);
        sh.run_line("echo x >");
        assert_eq!(sh.last_status(), 1);
        sh.run_line("true");
        assert_eq!(sh.last_status(), 0);
    }

    #[test]
    fn test_autocomplete_line_is_not_executed() {
        let dir = TempDir::new().unwrap();
        let mut sh = interpreter_in(&dir);
        let outcome = sh.run_line("echo hi > never.txt ?");
        assert!(matches!(outcome, Outcome::Continue(Completion::Finished(0))));
        assert!(!dir.path().join("never.txt").exists());
    }
}
