use std::io::Read;
use std::process::{ChildStderr, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::app::cancel::{CancelToken, OpContext};
use crate::app::error::AppError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

fn join_drains(stdout: JoinHandle<Vec<u8>>, stderr: JoinHandle<Vec<u8>>) -> (Vec<u8>, Vec<u8>) {
    (
        stdout.join().unwrap_or_default(),
        stderr.join().unwrap_or_default(),
    )
}

/// Runs `program` to completion, killing it when `timeout` elapses or `cancel` fires.
///
/// Timeouts map to `ERR_TRANSPORT_TIMEOUT`, cancellation (including an expired cancel
/// deadline) to `ERR_CANCELLED`. A non-zero exit status is not an error here; callers decide.
pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    cancel: &CancelToken,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    if cancel.is_cancelled() {
        return Err(AppError::cancelled("Operation cancelled", trace_id));
    }

    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            AppError::transport_failure(format!("Failed to spawn command: {err}"), trace_id)
        })?;

    // both pipes drain concurrently so a chatty child never stalls on a full buffer
    let stdout: ChildStdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr: ChildStderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
    let stdout_handle = drain(stdout);
    let stderr_handle = drain(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                let timed_out = start.elapsed() > timeout;
                let cancelled = cancel.is_cancelled();
                if timed_out || cancelled {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = join_drains(stdout_handle, stderr_handle);
                    if cancelled {
                        return Err(AppError::cancelled("Operation cancelled", trace_id));
                    }
                    return Err(AppError::transport_timeout(
                        format!("Command timed out after {}s", timeout.as_secs_f32()),
                        trace_id,
                    ));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                let _ = join_drains(stdout_handle, stderr_handle);
                return Err(AppError::transport_failure(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let (stdout_bytes, stderr_bytes) = join_drains(stdout_handle, stderr_handle);

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

/// Runs an adb invocation and turns a non-zero exit into `ERR_TRANSPORT_FAILURE`.
pub fn run_adb(
    program: &str,
    args: &[String],
    timeout: Duration,
    ctx: &OpContext,
) -> Result<CommandOutput, AppError> {
    let output = run_command_with_timeout(program, args, timeout, &ctx.cancel, &ctx.trace_id)?;
    if !output.success() {
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        return Err(AppError::transport_failure(
            format!(
                "adb exited with status {}: {detail}",
                output
                    .exit_code
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            ),
            &ctx.trace_id,
        ));
    }
    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::app::error::ErrorCode;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn run_command_with_timeout_does_not_deadlock_on_large_stdout() {
        // an undrained pipe stalls the child and would surface as a timeout
        let output = run_command_with_timeout(
            "sh",
            &sh("i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done"),
            Duration::from_secs(10),
            &CancelToken::new(),
            "test-trace-large-output",
        )
        .expect("expected large-output command to complete without timing out");

        assert_eq!(output.exit_code, Some(0));
        assert!(
            output.stdout.len() >= 1_000_000,
            "expected stdout >= 1000000, got {}",
            output.stdout.len()
        );
    }

    #[test]
    fn slow_command_reports_transport_timeout() {
        let err = run_command_with_timeout(
            "sh",
            &sh("sleep 5"),
            Duration::from_millis(100),
            &CancelToken::new(),
            "trace-timeout",
        )
        .expect_err("expected timeout");
        assert_eq!(err.code, ErrorCode::TransportTimeout);
        assert_eq!(err.trace_id, "trace-timeout");
    }

    #[test]
    fn cancelled_token_stops_the_child() {
        let cancel = CancelToken::with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let err = run_command_with_timeout(
            "sh",
            &sh("sleep 5"),
            Duration::from_secs(10),
            &cancel,
            "trace-cancel",
        )
        .expect_err("expected cancellation");
        assert_eq!(err.code, ErrorCode::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_transport_failure() {
        let err = run_command_with_timeout(
            "/this/program/does/not/exist",
            &[],
            Duration::from_secs(1),
            &CancelToken::new(),
            "trace-spawn",
        )
        .expect_err("expected spawn failure");
        assert_eq!(err.code, ErrorCode::TransportFailure);
    }

    #[test]
    fn run_adb_rejects_non_zero_exit() {
        let ctx = OpContext::new("trace-exit");
        let err = run_adb("sh", &sh("echo boom >&2; exit 3"), Duration::from_secs(5), &ctx)
            .expect_err("expected failure");
        assert_eq!(err.code, ErrorCode::TransportFailure);
        assert!(err.error.contains("status 3"));
        assert!(err.error.contains("boom"));
    }
}
