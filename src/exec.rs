//! Command execution behind a trait seam.
//!
//! The pipeline never shells out directly; it hands an [`ExecutionRequest`]
//! to an [`Executor`] and consumes the outcome. Tests substitute scripted
//! executors, production uses [`ProcessExecutor`] via tokio::process.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Everything an executor needs: the command text plus the resource limits
/// the configuration imposes.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub command: String,
    pub timeout: Duration,
    pub max_output_bytes: u64,
    pub working_dir: Option<PathBuf>,
}

impl ExecutionRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: Duration::from_secs(30),
            max_output_bytes: 1024 * 1024,
            working_dir: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_output_bytes(mut self, limit: u64) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub fn working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            output: String::new(),
            error: error.into(),
            timed_out: false,
            duration: Duration::ZERO,
        }
    }
}

pub trait Executor {
    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> impl std::future::Future<Output = ExecutionOutcome> + Send;
}

/// Runs commands through `sh -c` with a hard timeout and output caps.
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let started = Instant::now();
        debug!(command = %request.command, timeout_secs = request.timeout.as_secs(), "spawning");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&request.command);
        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ExecutionOutcome::failure(format!("failed to spawn shell: {err}"));
            }
        };

        match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => {
                let duration = started.elapsed();
                ExecutionOutcome {
                    success: out.status.success(),
                    exit_code: out.status.code(),
                    output: truncate(out.stdout, request.max_output_bytes),
                    error: truncate(out.stderr, request.max_output_bytes),
                    timed_out: false,
                    duration,
                }
            }
            Ok(Err(err)) => ExecutionOutcome {
                duration: started.elapsed(),
                ..ExecutionOutcome::failure(format!("failed to collect output: {err}"))
            },
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped.
                warn!(command = %request.command, "timed out, killing");
                ExecutionOutcome {
                    success: false,
                    exit_code: None,
                    output: String::new(),
                    error: format!("timed out after {}s", request.timeout.as_secs()),
                    timed_out: true,
                    duration: started.elapsed(),
                }
            }
        }
    }
}

fn truncate(bytes: Vec<u8>, limit: u64) -> String {
    let limit = limit as usize;
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if text.len() > limit {
        let mut cut = limit;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n[output truncated]");
    }
    text
}
