use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn run_script(dir: &TempDir, script: &str) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shellish"));
    command.arg("--plain");
    run_with(command, dir, script)
}

fn run_with(mut command: Command, dir: &TempDir, script: &str) -> Output {
    let mut child = command
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env("SHELLISH_CHAT_DIR", dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("start shellish");
    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(script.as_bytes())
        .expect("write script");
    child.wait_with_output().expect("shellish finishes")
}

#[test]
fn test_pipeline_with_redirections() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("words.txt"), "pear\napple\npear\n").unwrap();

    let output = run_script(&dir, "sort < words.txt | uniq > unique.txt\n");
    assert!(output.status.success());
    let unique = fs::read_to_string(dir.path().join("unique.txt")).unwrap();
    assert_eq!(unique, "apple\npear\n");
}

#[test]
fn test_unknown_command_is_reported_and_loop_continues() {
    let dir = TempDir::new().unwrap();
    let output = run_script(&dir, "shellish_no_such_command_42\necho after\n");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("-shellish: shellish_no_such_command_42: command not found"),
        "{}",
        stderr
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout), "after\n");
}

#[test]
fn test_syntax_errors_are_reported() {
    let dir = TempDir::new().unwrap();
    let output = run_script(&dir, "echo hi >\nls |\n");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("-shellish: echo: syntax error"), "{}", stderr);
    assert!(stderr.contains("unexpected token `|'"), "{}", stderr);
    assert!(output.stdout.is_empty());
}

#[test]
fn test_exit_ignores_remaining_lines() {
    let dir = TempDir::new().unwrap();
    let output = run_script(&dir, "echo first\nexit\necho second\n");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "first\n");
}

#[test]
fn test_cd_changes_directory_for_later_lines() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    run_script(&dir, "cd sub\necho here > marker.txt\n");
    assert!(dir.path().join("sub").join("marker.txt").exists());
    assert!(!dir.path().join("marker.txt").exists());
}

#[test]
fn test_lines_after_chatroom_still_run() {
    let dir = TempDir::new().unwrap();
    let output = run_script(
        &dir,
        "chatroom lobby alice\nhello\n\\q\necho after > after.txt\n",
    );

    assert!(output.status.success());
    let after = fs::read_to_string(dir.path().join("after.txt")).expect("line after leaving ran");
    assert_eq!(after, "after\n");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[Left the chat room.]"), "{}", stdout);
}

#[test]
fn test_pipe_exhaustion_aborts_the_chain() {
    let dir = TempDir::new().unwrap();
    let mut line = String::from("echo x");
    for _ in 0..40 {
        line.push_str(" | cat");
    }
    line.push_str(" > out.txt\necho after\n");

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg("ulimit -n 24 && exec \"$0\" --plain")
        .arg(env!("CARGO_BIN_EXE_shellish"));
    let output = run_with(command, &dir, &line);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("-shellish: echo: cannot create pipe"), "{}", stderr);
    assert!(!dir.path().join("out.txt").exists());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "after\n");
}

#[test]
fn test_background_job_does_not_block_the_loop() {
    let dir = TempDir::new().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_shellish"))
        .arg("--plain")
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("start shellish");
    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(b"sleep 3 > /dev/null &\necho done\n")
        .expect("write script");

    let started = Instant::now();
    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut text = String::new();
    std::io::Read::read_to_string(&mut stdout, &mut text).expect("read stdout");
    child.wait().expect("shellish finishes");

    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert!(text.contains("[Process running in background, PID: "), "{}", text);
    assert!(text.ends_with("done\n"), "{}", text);
}
