// ABOUTME: Bounded child process capture shared by the sandbox and the dependency installer
// ABOUTME: Feeds stdin, pumps both output streams under a byte ceiling and enforces a wall-clock timeout

use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tracing::{debug, warn};

const READ_CHUNK: usize = 8192;

#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Why a capture ended without a normal exit. The child is already dead.
#[derive(Debug)]
pub enum CaptureFailure {
    TimedOut {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    LimitExceeded {
        stream: &'static str,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    Io(std::io::Error),
}

enum PumpError {
    Overflow(&'static str),
    Io(std::io::Error),
}

/// Drive `child` to completion.
///
/// The child must have been spawned with piped stdio and, on unix, in its own
/// process group so the whole group can be killed. `stdin_body` is written
/// and the pipe closed; `None` closes stdin immediately.
pub async fn run_captured(
    mut child: Child,
    stdin_body: Option<Vec<u8>>,
    timeout: Duration,
    limit: usize,
) -> Result<CapturedOutput, CaptureFailure> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let outcome = {
        let work = async {
            tokio::try_join!(
                feed_stdin(stdin, stdin_body),
                pump(stdout, &mut stdout_buf, limit, "stdout"),
                pump(stderr, &mut stderr_buf, limit, "stderr"),
            )?;
            child.wait().await.map_err(PumpError::Io)
        };
        tokio::time::timeout(timeout, work).await
    };

    match outcome {
        Ok(Ok(status)) => Ok(CapturedOutput {
            status,
            stdout: stdout_buf,
            stderr: stderr_buf,
        }),
        Ok(Err(PumpError::Overflow(stream))) => {
            warn!("Child exceeded {} byte limit on {}, killing", limit, stream);
            terminate(&mut child).await;
            Err(CaptureFailure::LimitExceeded {
                stream,
                stdout: stdout_buf,
                stderr: stderr_buf,
            })
        }
        Ok(Err(PumpError::Io(e))) => {
            terminate(&mut child).await;
            Err(CaptureFailure::Io(e))
        }
        Err(_) => {
            warn!("Child exceeded {:?} timeout, killing", timeout);
            terminate(&mut child).await;
            Err(CaptureFailure::TimedOut {
                stdout: stdout_buf,
                stderr: stderr_buf,
            })
        }
    }
}

async fn feed_stdin(stdin: Option<ChildStdin>, body: Option<Vec<u8>>) -> Result<(), PumpError> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    if let Some(body) = body {
        // A script that never reads its body closes the pipe early; not an error
        if let Err(e) = stdin.write_all(&body).await {
            debug!("Child stopped reading stdin: {}", e);
        } else if let Err(e) = stdin.shutdown().await {
            debug!("Failed to close child stdin: {}", e);
        }
    }
    drop(stdin);
    Ok(())
}

async fn pump<R>(
    reader: Option<R>,
    buf: &mut Vec<u8>,
    limit: usize,
    stream: &'static str,
) -> Result<(), PumpError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await.map_err(PumpError::Io)?;
        if n == 0 {
            return Ok(());
        }
        if buf.len() + n > limit {
            let room = limit.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..room]);
            return Err(PumpError::Overflow(stream));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Kill the child's process group, then the child itself, and reap it
pub async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => debug!("Sent SIGKILL to process group {}", pid),
                Err(e) => debug!("Process group {} already gone: {}", pid, e),
            }
        }
    }

    if let Err(e) = child.kill().await {
        debug!("Child already exited: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Instant;
    use tokio::process::Command;

    fn bash(script: &str) -> Child {
        Command::new("bash")
            .args(["-c", script])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_stdin_is_echoed() {
        let child = bash("cat");
        let out = run_captured(child, Some(b"payload".to_vec()), Duration::from_secs(5), 1024)
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout, b"payload");
    }

    #[tokio::test]
    async fn test_no_body_closes_stdin() {
        let child = bash("cat; echo done >&2");
        let out = run_captured(child, None, Duration::from_secs(5), 1024)
            .await
            .unwrap();
        assert!(out.stdout.is_empty());
        assert_eq!(out.stderr, b"done\n");
    }

    #[tokio::test]
    async fn test_background_children_are_killed_on_timeout() {
        let child = bash("sleep 30 & sleep 30");
        let started = Instant::now();
        let result = run_captured(child, None, Duration::from_millis(200), 1024).await;
        assert!(matches!(result, Err(CaptureFailure::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_partial_output_kept_on_timeout() {
        let child = bash("echo started; sleep 30");
        match run_captured(child, None, Duration::from_millis(300), 1024).await {
            Err(CaptureFailure::TimedOut { stdout, .. }) => assert_eq!(stdout, b"started\n"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stderr_limit() {
        let child = bash("while true; do echo xxxxxxxxxxxxxxxx >&2; done");
        match run_captured(child, None, Duration::from_secs(10), 4096).await {
            Err(CaptureFailure::LimitExceeded { stream, stderr, .. }) => {
                assert_eq!(stream, "stderr");
                assert_eq!(stderr.len(), 4096);
            }
            other => panic!("expected limit failure, got {:?}", other),
        }
    }
}
