use super::BuiltinCommand;
use crate::command::{CommandOutput, ExitCode};
use crate::env::Environment;
use anyhow::{Context, Result};
use argh::FromArgs;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::stat::Mode;
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, fork, mkfifo};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, Read, Write};
use std::os::fd::RawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Overrides the directory chat rooms are created in.
pub const CHAT_DIR_VAR: &str = "SHELLISH_CHAT_DIR";
const DEFAULT_CHAT_DIR: &str = "/tmp";
const LEAVE_COMMAND: &str = "\\q";

#[derive(FromArgs)]
/// join a chat room shared through named pipes by every user of this machine.
pub struct Chatroom {
    #[argh(positional)]
    /// name of the room to join; created on first use.
    pub room: String,

    #[argh(positional)]
    /// name shown to the other members of the room.
    pub user: String,
}

impl BuiltinCommand for Chatroom {
    fn name() -> &'static str {
        "chatroom"
    }

    fn execute(
        self,
        stdin: &mut dyn BufRead,
        stdout: &mut dyn CommandOutput,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let base = env
            .get_var(CHAT_DIR_VAR)
            .unwrap_or_else(|| DEFAULT_CHAT_DIR.to_string());
        let room_dir = PathBuf::from(base).join(format!("chatroom-{}", self.room));
        fs::create_dir_all(&room_dir)
            .with_context(|| format!("cannot create {}", room_dir.display()))?;

        let inbox = room_dir.join(&self.user);
        match mkfifo(&inbox, Mode::from_bits_truncate(0o666)) {
            Ok(()) | Err(Errno::EEXIST) => {}
            Err(e) => {
                return Err(e).with_context(|| format!("cannot create {}", inbox.display()));
            }
        }

        writeln!(
            stdout,
            "[Joined chat room '{}' as '{}'. Type '{}' to leave.]",
            self.room, self.user, LEAVE_COMMAND
        )?;
        stdout.flush()?;

        let output = stdout.raw_fd().unwrap_or(libc::STDOUT_FILENO);
        let listener = Listener::spawn(inbox, output)?;

        for line in stdin.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line == LEAVE_COMMAND {
                break;
            }
            if line.is_empty() {
                continue;
            }
            let message = format!("[{}]: {}", self.user, line);
            broadcast(&room_dir, &self.user, &message)?;
        }

        drop(listener);
        writeln!(stdout, "[Left the chat room.]")?;
        Ok(0)
    }
}

/// Writes `message` into the inbox of every room member except `sender`.
///
/// Inboxes are opened without blocking, so members that are not listening are
/// skipped.
fn broadcast(room_dir: &Path, sender: &str, message: &str) -> Result<()> {
    let entries = fs::read_dir(room_dir)
        .with_context(|| format!("cannot read {}", room_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_name() == sender {
            continue;
        }
        let opened = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(entry.path());
        match opened {
            Ok(mut inbox) => {
                if let Err(e) = inbox.write_all(message.as_bytes()) {
                    debug!(inbox = %entry.path().display(), error = %e, "message dropped");
                }
            }
            Err(e) => debug!(inbox = %entry.path().display(), error = %e, "member not listening"),
        }
    }
    Ok(())
}

/// Child process printing everything that arrives in one inbox to the
/// descriptor the builtin's output goes to.
///
/// Dropping the listener terminates it, waits for it and removes the inbox.
struct Listener {
    pid: Pid,
    inbox: PathBuf,
}

impl Listener {
    fn spawn(inbox: PathBuf, output: RawFd) -> Result<Self> {
        // SAFETY: the child only performs open/read/write system calls before `_exit`.
        match unsafe { fork() }.context("cannot fork chat listener")? {
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), inbox = %inbox.display(), "chat listener started");
                Ok(Listener { pid: child, inbox })
            }
            ForkResult::Child => {
                listen(&inbox, output);
                unsafe { libc::_exit(1) }
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Err(e) = kill(self.pid, Signal::SIGTERM) {
            warn!(pid = self.pid.as_raw(), error = %e, "cannot stop chat listener");
        }
        if let Err(e) = waitpid(self.pid, None) {
            warn!(pid = self.pid.as_raw(), error = %e, "cannot reap chat listener");
        }
        let _ = fs::remove_file(&self.inbox);
        debug!(pid = self.pid.as_raw(), "chat listener stopped");
    }
}

/// Body of the listener process. Returns only when the inbox cannot be read.
fn listen(inbox: &Path, output: RawFd) {
    // Opened read-write so the pipe never reports end of file while the room is idle.
    let Ok(mut fifo) = OpenOptions::new().read(true).write(true).open(inbox) else {
        return;
    };
    let mut buf = [0u8; 1024];
    loop {
        match fifo.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                write_raw(output, b"\r");
                write_raw(output, &buf[..n]);
                write_raw(output, b"\n");
            }
        }
    }
}

/// Writes straight to `fd`, bypassing the lock around `std::io::stdout`.
fn write_raw(fd: RawFd, bytes: &[u8]) {
    // SAFETY: the pointer and length describe a live, initialized slice.
    unsafe {
        libc::write(fd, bytes.as_ptr().cast(), bytes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, ErrorKind};
    use std::time::Duration;

    fn test_env(dir: &Path) -> Environment {
        let mut env = Environment::new();
        env.set_var(CHAT_DIR_VAR, dir.to_string_lossy().to_string());
        env
    }

    #[test]
    fn test_message_reaches_other_members_and_inbox_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let room_dir = dir.path().join("chatroom-lobby");
        fs::create_dir_all(&room_dir).unwrap();
        let bob = room_dir.join("bob");
        mkfifo(&bob, Mode::from_bits_truncate(0o666)).unwrap();
        let mut bob_inbox = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&bob)
            .unwrap();

        let chat = Chatroom {
            room: "lobby".to_string(),
            user: "alice".to_string(),
        };
        let mut env = test_env(dir.path());
        let mut out = Vec::new();
        let input = b"hello bob\n\n\\q\nnever sent\n".to_vec();
        let code = chat
            .execute(&mut Cursor::new(input), &mut out, &mut env)
            .unwrap();
        assert_eq!(code, 0);

        let mut received = [0u8; 256];
        let n = bob_inbox.read(&mut received).expect("bob got a message");
        assert_eq!(&received[..n], b"[alice]: hello bob");
        match bob_inbox.read(&mut received) {
            Err(e) => assert_eq!(e.kind(), ErrorKind::WouldBlock),
            Ok(n) => panic!("unexpected extra message of {} bytes", n),
        }

        assert!(!room_dir.join("alice").exists());
        let transcript = String::from_utf8(out).unwrap();
        assert!(transcript.starts_with("[Joined chat room 'lobby' as 'alice'."));
        assert!(transcript.ends_with("[Left the chat room.]\n"));
    }

    #[test]
    fn test_end_of_input_leaves_room() {
        let dir = tempfile::tempdir().unwrap();
        let chat = Chatroom {
            room: "quiet".to_string(),
            user: "carol".to_string(),
        };
        let mut env = test_env(dir.path());
        let code = chat
            .execute(&mut Cursor::new(Vec::new()), &mut Vec::new(), &mut env)
            .unwrap();
        assert_eq!(code, 0);
        assert!(dir.path().join("chatroom-quiet").is_dir());
        assert!(!dir.path().join("chatroom-quiet").join("carol").exists());
    }

    #[test]
    fn test_input_after_leaving_is_left_unread() {
        let dir = tempfile::tempdir().unwrap();
        let chat = Chatroom {
            room: "lobby".to_string(),
            user: "frank".to_string(),
        };
        let mut env = test_env(dir.path());
        let mut input = Cursor::new(b"hi\n\\q\necho after\nls\n".to_vec());
        chat.execute(&mut input, &mut Vec::new(), &mut env).unwrap();

        let mut rest = String::new();
        input.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "echo after\nls\n");
    }

    #[test]
    fn test_incoming_messages_follow_redirected_output() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.txt");
        let mut log = fs::File::create(&log_path).unwrap();
        let inbox = dir.path().join("chatroom-lobby").join("grace");

        let (reader, writer) = nix::unistd::pipe().unwrap();
        let mut typed = fs::File::from(writer);
        let sender = std::thread::spawn(move || {
            while !inbox.exists() {
                std::thread::sleep(Duration::from_millis(10));
            }
            // Blocks until the listener has opened its inbox.
            let mut fifo = OpenOptions::new().write(true).open(&inbox).unwrap();
            fifo.write_all(b"[heidi]: welcome").unwrap();
            std::thread::sleep(Duration::from_millis(300));
            typed.write_all(b"\\q\n").unwrap();
        });

        let chat = Chatroom {
            room: "lobby".to_string(),
            user: "grace".to_string(),
        };
        let mut env = test_env(dir.path());
        let mut stdin = std::io::BufReader::new(fs::File::from(reader));
        chat.execute(&mut stdin, &mut log, &mut env).unwrap();
        sender.join().unwrap();

        let transcript = fs::read_to_string(&log_path).unwrap();
        assert!(transcript.contains("\r[heidi]: welcome\n"), "{:?}", transcript);
        assert!(transcript.ends_with("[Left the chat room.]\n"), "{:?}", transcript);
    }

    #[test]
    fn test_broadcast_skips_members_without_listener() {
        let dir = tempfile::tempdir().unwrap();
        mkfifo(&dir.path().join("dave"), Mode::from_bits_truncate(0o666)).unwrap();
        assert!(broadcast(dir.path(), "erin", "[erin]: anyone?").is_ok());
    }
}
