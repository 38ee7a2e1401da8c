//! Bounded capture of long-running browser processes.
//!
//! DNS-SD browsers stream results until killed, so a window elapsing is the
//! normal way a capture ends. Whatever the process printed before the kill is
//! still returned for parsing.

use crate::error::DiscoveryError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

/// How long to wait for a killed process to be reaped.
const REAP_GRACE: Duration = Duration::from_millis(500);

/// Shortest window worth spawning a browser for.
const MIN_STEP: Duration = Duration::from_millis(50);

/// Window for the next step: `window`, cut short so it ends by `deadline`.
/// `None` once too little time is left to start another process.
pub fn step_window(window: Duration, deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left < MIN_STEP {
        None
    } else {
        Some(window.min(left))
    }
}

/// Output collected from one browser invocation.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    /// Captured stdout (lossy UTF-8)
    pub stdout: String,
    /// Captured stderr (lossy UTF-8), only populated when the process exited by itself
    pub stderr: String,
    /// Whether the window elapsed and the process was killed
    pub timed_out: bool,
    /// Exit code when the process exited by itself
    pub exit_code: Option<i32>,
}

/// Run `program args..` for at most `window`, then kill it and return what it printed.
pub async fn capture(
    program: &str,
    args: &[&str],
    window: Duration,
) -> Result<CapturedOutput, DiscoveryError> {
    debug!(program = %program, ?args, window_ms = window.as_millis() as u64, "spawning browser");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DiscoveryError::launch(program, e))?;

    let mut stdout = child.stdout.take();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let deadline = Instant::now() + window;
    let mut timed_out = false;

    if let Some(out) = stdout.as_mut() {
        loop {
            match tokio::time::timeout_at(deadline, out.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(source)) => {
                    return Err(DiscoveryError::Output {
                        program: program.to_string(),
                        source,
                    })
                }
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }
    }

    let mut captured = CapturedOutput {
        stdout: String::from_utf8_lossy(&buf).into_owned(),
        timed_out,
        ..Default::default()
    };

    if timed_out {
        // Expected for streaming browsers; reap so no zombie outlives the probe.
        let _ = child.start_kill();
        let _ = tokio::time::timeout(REAP_GRACE, child.wait()).await;
        debug!(program = %program, bytes = buf.len(), "browser window elapsed, process killed");
        return Ok(captured);
    }

    // stdout closed before the deadline: the process is exiting on its own.
    let remaining = deadline.saturating_duration_since(Instant::now()) + REAP_GRACE;
    match tokio::time::timeout(remaining, child.wait()).await {
        Ok(Ok(status)) => {
            captured.exit_code = status.code();
            if let Some(mut err) = child.stderr.take() {
                let mut err_buf = Vec::new();
                let _ = tokio::time::timeout(REAP_GRACE, err.read_to_end(&mut err_buf)).await;
                captured.stderr = String::from_utf8_lossy(&err_buf).trim().to_string();
            }
            if !status.success() && captured.stdout.trim().is_empty() {
                return Err(DiscoveryError::BrowserFailed {
                    program: program.to_string(),
                    status: status.to_string(),
                    stderr: captured.stderr,
                });
            }
        }
        Ok(Err(source)) => {
            return Err(DiscoveryError::Output {
                program: program.to_string(),
                source,
            })
        }
        Err(_) => {
            let _ = child.start_kill();
            captured.timed_out = true;
        }
    }

    Ok(captured)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_short_lived_process() {
        let out = capture("echo", &["hello"], Duration::from_secs(5))
            .await
            .expect("capture failed");
        assert!(out.stdout.contains("hello"));
        assert!(!out.timed_out);
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_capture_keeps_partial_output_on_timeout() {
        let out = capture(
            "sh",
            &["-c", "echo first; sleep 30; echo never"],
            Duration::from_millis(500),
        )
        .await
        .expect("capture failed");
        assert!(out.timed_out);
        assert!(out.stdout.contains("first"));
        assert!(!out.stdout.contains("never"));
    }

    #[tokio::test]
    async fn test_capture_returns_within_window() {
        let start = std::time::Instant::now();
        let _ = capture("sleep", &["30"], Duration::from_millis(300)).await;
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_step_window_respects_deadline() {
        let window = Duration::from_secs(2);
        let far = Instant::now() + Duration::from_secs(60);
        assert_eq!(step_window(window, far), Some(window));

        let near = Instant::now() + Duration::from_millis(500);
        let step = step_window(window, near).expect("time left");
        assert!(step <= Duration::from_millis(500));

        assert_eq!(step_window(window, Instant::now()), None);
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let err = capture("hapcheck-no-such-browser", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::BrowserUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_silent_failure_is_error() {
        let err = capture("sh", &["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::BrowserFailed { .. }));
        assert!(err.to_string().contains("boom"));
    }
}
