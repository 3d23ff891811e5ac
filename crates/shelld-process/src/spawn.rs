//! Child-process spawning for one-shot executions.

use std::path::Path;

use tokio::process::Command;

/// Build a `sh -c <command>` child with piped stdio, isolated into its own
/// process group via `setsid()` so timeout/kill escalation can target the
/// whole group rather than only the immediate child (covers shell
/// pipelines and subshells the same way a direct `kill -9 $pid` would not).
pub fn build_command(command: &str, cwd: Option<&Path>, want_stdin: bool) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(if want_stdin {
        std::process::Stdio::piped()
    } else {
        std::process::Stdio::null()
    });
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    cmd
}

/// Send a signal to the process group led by `pid`.
///
/// SAFETY: `kill()` is async-signal-safe; targeting a negative pid sends the
/// signal to the whole process group instead of just `pid`.
#[cfg(unix)]
pub fn signal_process_group(pid: i32, signal: libc::c_int) {
    unsafe {
        libc::kill(-pid, signal);
    }
}

#[cfg(not(unix))]
pub fn signal_process_group(_pid: i32, _signal: i32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_command_pipes_captures_without_stdin() {
        let mut cmd = build_command("echo hi", None, false);
        let mut child = cmd.spawn().expect("spawn");
        let status = child.wait().await.expect("wait");
        assert!(status.success());
    }

    #[tokio::test]
    async fn build_command_honors_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = build_command("pwd", Some(dir.path()), false);
        let output = cmd.output().await.expect("output");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.trim().ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
    }
}
