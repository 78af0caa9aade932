use super::BuiltinCommand;
use crate::command::{CommandOutput, ExitCode};
use crate::env::Environment;
use anyhow::{Context, Result};
use argh::FromArgs;
use std::env;
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn BufRead,
        _stdout: &mut dyn CommandOutput,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => anyhow::bail!("no target and HOME not set"),
            },
        };

        let new_dir = env.current_dir.join(target);

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("{}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("{}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}
