//! Uniform subprocess wrapper for external reconstruction tools
//!
//! Every pipeline stage shells out through [`ToolCommand`]: exit 0 yields
//! captured stdout, a non-zero exit yields [`ToolError::NonZeroExit`]
//! carrying the tool's stderr verbatim. There is no retry and no timeout;
//! retry policy, if any, belongs to the caller.

use std::ffi::OsString;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Interval at which a running tool is polled for exit or cancellation
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors from an external tool invocation
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed waiting on '{program}': {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {code:?}: {stderr}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("'{program}' was cancelled")]
    Cancelled { program: String },
}

/// Cooperative cancellation flag shared between a job and its controller.
///
/// Setting the flag prevents further stage dispatch and makes an in-flight
/// [`ToolCommand::run`] kill its child process at the next poll.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builder for one external tool invocation with a fixed argument list
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
}

impl ToolCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run the tool to completion, capturing stdout and stderr.
    ///
    /// Polls the child between [`WAIT_POLL_INTERVAL`] ticks; when `cancel`
    /// is set mid-run the child is killed and [`ToolError::Cancelled`] is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned, exits non-zero,
    /// or is cancelled.
    pub fn run(&self, cancel: &CancelFlag) -> Result<String, ToolError> {
        info!("Running command: {} {:?}", self.program, self.args);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Drain both pipes on their own threads so a chatty tool cannot
        // deadlock against a full pipe buffer while we poll for exit.
        let stdout_handle = child.stdout.take().map(spawn_reader);
        let stderr_handle = child.stderr.take().map(spawn_reader);

        let status = loop {
            if cancel.is_cancelled() {
                debug!("Cancellation requested, killing '{}'", self.program);
                let _ = child.kill();
                let _ = child.wait();
                join_reader(stdout_handle);
                join_reader(stderr_handle);
                return Err(ToolError::Cancelled {
                    program: self.program.clone(),
                });
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
                Err(source) => {
                    join_reader(stdout_handle);
                    join_reader(stderr_handle);
                    return Err(ToolError::Wait {
                        program: self.program.clone(),
                        source,
                    });
                }
            }
        };

        let stdout = join_reader(stdout_handle);
        let stderr = join_reader(stderr_handle);

        if status.success() {
            debug!("'{}' completed successfully", self.program);
            Ok(stdout)
        } else {
            Err(ToolError::NonZeroExit {
                program: self.program.clone(),
                code: status.code(),
                stderr,
            })
        }
    }
}

fn spawn_reader(mut pipe: impl Read + Send + 'static) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_on_success() {
        let out = ToolCommand::new("sh")
            .arg("-c")
            .arg("echo hello")
            .run(&CancelFlag::new())
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let err = ToolCommand::new("sh")
            .arg("-c")
            .arg("echo broken input >&2; exit 3")
            .run(&CancelFlag::new())
            .unwrap_err();
        match err {
            ToolError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("broken input"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = ToolCommand::new("definitely-not-a-real-binary-42")
            .run(&CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn test_cancel_kills_long_running_child() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let start = std::time::Instant::now();
        let err = ToolCommand::new("sleep")
            .arg("30")
            .run(&cancel)
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
