//! Turns a parsed stage chain into running processes.
//!
//! Every stage that is not handled in-process becomes one child process. Stages
//! are spawned left to right; adjacent stages are connected with a pipe whose
//! ends are handed to exactly one child each. All pipe descriptors are
//! close-on-exec and the interpreter drops its copies as soon as the child owning
//! them exists, so a reader sees end of file once its writer exits.

use crate::command::{BuiltinTable, CommandOutput, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::error::ExecError;
use crate::resolve::find_executable;
use crate::stage::{OutputMode, OutputRedirect, Stage};
use crate::{EXIT_KEYWORD, report};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, warn};

/// How a chain ended when it did not ask the interpreter to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Foreground chain; the status of its last stage.
    Finished(ExitCode),
    /// Background chain; pids of the processes left running, in pipeline order.
    Background(Vec<u32>),
}

/// Result of running one line.
#[derive(Debug)]
pub enum Outcome {
    Continue(Completion),
    /// `exit` was entered.
    RequestExit,
    /// The line was rejected before or while creating its processes.
    Error(anyhow::Error),
}

/// A stage after the spawn attempt.
enum Spawned {
    Running(Child),
    Failed(ExitCode),
}

/// Runs stage chains against an environment and a builtin table.
pub struct Orchestrator {
    env: Environment,
    builtins: BuiltinTable,
    background: Vec<Child>,
}

impl Orchestrator {
    pub fn new(env: Environment, builtins: BuiltinTable) -> Self {
        Self {
            env,
            builtins,
            background: Vec::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn builtins(&self) -> &BuiltinTable {
        &self.builtins
    }

    /// Executes a chain and reports how it ended.
    ///
    /// Foreground chains are waited for; background chains return as soon as
    /// every stage has been spawned.
    pub fn run(&mut self, chain: &Stage) -> Outcome {
        self.reap_background();

        if chain.is_noop() {
            return Outcome::Continue(Completion::Finished(0));
        }
        if chain.program_name == EXIT_KEYWORD {
            return Outcome::RequestExit;
        }
        if let Err(e) = validate(chain) {
            return Outcome::Error(e.into());
        }

        if chain.next.is_none() {
            let args: Vec<&str> = chain.arguments.iter().skip(1).map(String::as_str).collect();
            if let Some(builtin) = self.builtins.lookup(&self.env, &chain.program_name, &args) {
                return match self.run_builtin(chain, builtin) {
                    Ok(code) => Outcome::Continue(Completion::Finished(code)),
                    Err(e) => Outcome::Error(e.into()),
                };
            }
        }

        match self.spawn_chain(chain) {
            Ok(processes) => Outcome::Continue(self.complete(chain, processes)),
            Err(e) => Outcome::Error(e.into()),
        }
    }

    /// Runs a builtin in-process with the stage's redirections applied.
    ///
    /// Without `<` the builtin reads through the shared stdin buffer, so lines
    /// it does not consume are still there for the read loop.
    fn run_builtin(
        &mut self,
        stage: &Stage,
        builtin: Box<dyn ExecutableCommand>,
    ) -> Result<ExitCode, ExecError> {
        let mut stdin: Box<dyn BufRead> = match &stage.stdin_redirect {
            Some(path) => Box::new(BufReader::new(self.open_input(stage, path)?)),
            None => Box::new(io::stdin().lock()),
        };
        let mut stdout: Box<dyn CommandOutput> = match &stage.stdout_redirect {
            Some(redirect) => Box::new(self.open_output(stage, redirect)?),
            None => Box::new(io::stdout()),
        };

        debug!(command = %stage.program_name, "running builtin");
        let code = match builtin.execute(&mut *stdin, &mut *stdout, &mut self.env) {
            Ok(code) => code,
            Err(e) => {
                report(format_args!("{}: {:#}", stage.program_name, e));
                1
            }
        };
        if let Err(e) = stdout.flush() {
            warn!(command = %stage.program_name, error = %e, "cannot flush builtin output");
        }
        Ok(code)
    }

    /// Creates every pipe of the chain, then spawns its stages in order.
    ///
    /// A stage that cannot be started is reported and recorded as failed; the
    /// stages around it still run.
    fn spawn_chain(&mut self, chain: &Stage) -> Result<Vec<Spawned>, ExecError> {
        let count = chain.len();
        let mut pipes = Vec::with_capacity(count - 1);
        for _ in 1..count {
            let pipe = pipe2(OFlag::O_CLOEXEC).map_err(|source| ExecError::Pipe {
                command: chain.program_name.clone(),
                source,
            })?;
            pipes.push(pipe);
        }

        let mut pipes = pipes.into_iter();
        let mut upstream: Option<OwnedFd> = None;
        let mut processes = Vec::with_capacity(count);
        for stage in chain.stages() {
            let (downstream, pipe_out) = match pipes.next() {
                Some((reader, writer)) => (Some(reader), Some(writer)),
                None => (None, None),
            };

            let process = match self.spawn_stage(stage, upstream.take(), pipe_out) {
                Ok(child) => {
                    debug!(pid = child.id(), command = %stage.program_name, "spawned stage");
                    Spawned::Running(child)
                }
                Err(e) => {
                    report(&e);
                    Spawned::Failed(e.status())
                }
            };
            processes.push(process);
            upstream = downstream;
        }
        Ok(processes)
    }

    /// Spawns one stage. Redirections win over pipe ends on the same stream;
    /// an unused pipe end is closed when this function returns.
    fn spawn_stage(
        &self,
        stage: &Stage,
        pipe_in: Option<OwnedFd>,
        pipe_out: Option<OwnedFd>,
    ) -> Result<Child, ExecError> {
        let stdin = match &stage.stdin_redirect {
            Some(path) => Stdio::from(self.open_input(stage, path)?),
            None => pipe_in.map_or_else(Stdio::inherit, Stdio::from),
        };
        let stdout = match &stage.stdout_redirect {
            Some(redirect) => Stdio::from(self.open_output(stage, redirect)?),
            None => pipe_out.map_or_else(Stdio::inherit, Stdio::from),
        };

        let program = if stage.program_name.starts_with("./") {
            self.env.current_dir.join(&stage.program_name).to_string_lossy().into_owned()
        } else {
            stage.program_name.clone()
        };
        let executable = find_executable(&self.env.search_path(), &program)
            .ok_or_else(|| ExecError::NotFound {
                command: stage.program_name.clone(),
            })?;

        Command::new(&executable)
            .arg0(&stage.program_name)
            .args(stage.arguments.iter().skip(1))
            .stdin(stdin)
            .stdout(stdout)
            .envs(&self.env.vars)
            .current_dir(&self.env.current_dir)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: stage.program_name.clone(),
                source,
            })
    }

    fn open_input(&self, stage: &Stage, path: &str) -> Result<File, ExecError> {
        File::open(self.env.current_dir.join(path)).map_err(|source| ExecError::Redirect {
            command: stage.program_name.clone(),
            path: path.to_string(),
            source,
        })
    }

    fn open_output(&self, stage: &Stage, redirect: &OutputRedirect) -> Result<File, ExecError> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).mode(0o644);
        match redirect.mode {
            OutputMode::Truncate => options.truncate(true),
            OutputMode::Append => options.append(true),
        };
        options
            .open(self.env.current_dir.join(&redirect.path))
            .map_err(|source| ExecError::Redirect {
                command: stage.program_name.clone(),
                path: redirect.path.clone(),
                source,
            })
    }

    /// Waits for a foreground chain, or hands a background chain over to the
    /// reaper and announces it.
    fn complete(&mut self, chain: &Stage, processes: Vec<Spawned>) -> Completion {
        if chain.is_background() {
            let mut pids = Vec::new();
            for process in processes {
                if let Spawned::Running(child) = process {
                    pids.push(child.id());
                    self.background.push(child);
                }
            }
            if let Some(pid) = pids.last() {
                println!("[Process running in background, PID: {}]", pid);
            }
            return Completion::Background(pids);
        }

        let mut status = 0;
        for process in processes {
            status = match process {
                Spawned::Running(mut child) => match child.wait() {
                    Ok(exit) => exit_code(exit),
                    Err(e) => {
                        warn!(pid = child.id(), error = %e, "cannot wait for child");
                        1
                    }
                },
                Spawned::Failed(code) => code,
            };
        }
        debug!(status, "foreground chain finished");
        Completion::Finished(status)
    }

    /// Collects background children that have exited, without blocking.
    fn reap_background(&mut self) {
        self.background.retain_mut(|child| match child.try_wait() {
            Ok(Some(exit)) => {
                debug!(pid = child.id(), status = exit_code(exit), "background process finished");
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(pid = child.id(), error = %e, "cannot poll background process");
                false
            }
        });
    }
}

/// Rejects chains that cannot be executed before any process exists.
fn validate(chain: &Stage) -> Result<(), ExecError> {
    for (index, stage) in chain.stages().enumerate() {
        if index > 0 && stage.is_noop() {
            return Err(ExecError::EmptyStage);
        }
        let empty_input = stage.stdin_redirect.as_deref().is_some_and(|p| p.trim().is_empty());
        let empty_output = stage
            .stdout_redirect
            .as_ref()
            .is_some_and(|r| r.path.trim().is_empty());
        if empty_input || empty_output {
            return Err(ExecError::EmptyRedirect {
                command: stage.program_name.clone(),
            });
        }
    }
    Ok(())
}

/// Exit code of a child, or `128 + signal` when it was killed.
fn exit_code(exit_status: ExitStatus) -> ExitCode {
    if let Some(code) = exit_status.code() {
        code
    } else if let Some(signal) = exit_status.signal() {
        128 + signal
    } else {
        -1
    }
}
