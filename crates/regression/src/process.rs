//! Bounded subprocess execution.

use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of a bounded subprocess run.
#[derive(Debug)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Whether the process exited on its own with status zero.
    pub success: bool,
    /// Whether the deadline expired and the process was killed.
    pub timed_out: bool,
}

/// Runs `cmd` to completion or kills it when `timeout` expires.
///
/// Stdout and stderr are drained on separate threads so a chatty child
/// cannot deadlock against a full pipe. When `stdin` names a file it is
/// attached to the child's stdin, otherwise stdin is null.
pub fn run_with_timeout(
    cmd: &mut Command,
    stdin: Option<&Path>,
    timeout: Duration,
) -> Result<RunOutput> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    match stdin {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| anyhow!("cannot open stdin file {}: {}", path.display(), e))?;
            cmd.stdin(Stdio::from(file));
        }
        None => {
            cmd.stdin(Stdio::null());
        }
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| anyhow!("cannot spawn {:?}: {}", cmd.get_program(), e))?;

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout_pipe));
    let stderr_reader = thread::spawn(move || drain(stderr_pipe));

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    timed_out = true;
                    // Killing closes the pipes, so the readers finish too.
                    let _ = child.kill();
                    break child.wait()?;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(RunOutput {
        stdout,
        stderr,
        success: !timed_out && status.success(),
        timed_out,
    })
}

fn drain(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_captures_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);
        let out = run_with_timeout(&mut cmd, None, Duration::from_secs(5)).unwrap();
        assert!(out.success);
        assert!(!out.timed_out);
        assert_eq!(String::from_utf8_lossy(&out.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&out.stderr), "err\n");
    }

    #[test]
    fn test_nonzero_exit_is_not_success() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 7"]);
        let out = run_with_timeout(&mut cmd, None, Duration::from_secs(5)).unwrap();
        assert!(!out.success);
        assert!(!out.timed_out);
    }

    #[test]
    fn test_deadline_kills_the_child() {
        let started = Instant::now();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30"]);
        let out = run_with_timeout(&mut cmd, None, Duration::from_millis(200)).unwrap();
        assert!(out.timed_out);
        assert!(!out.success);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_stdin_from_file() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        write!(input, "hello stdin").unwrap();
        let mut cmd = Command::new("cat");
        let out = run_with_timeout(&mut cmd, Some(input.path()), Duration::from_secs(5)).unwrap();
        assert!(out.success);
        assert_eq!(String::from_utf8_lossy(&out.stdout), "hello stdin");
    }

    #[test]
    fn test_missing_program_is_error() {
        let mut cmd = Command::new("jouletune-no-such-binary");
        assert!(run_with_timeout(&mut cmd, None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_missing_stdin_file_is_error() {
        let mut cmd = Command::new("cat");
        let err = run_with_timeout(
            &mut cmd,
            Some(Path::new("/no/such/input.txt")),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("stdin file"));
    }
}
