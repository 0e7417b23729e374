//! Stage execution.
//!
//! `CommandExecutor` is the seam between the engine and the operating system.
//! `ShellExecutor` runs commands through `sh -c` in the project root;
//! `StageRunner` wraps an executor and turns its output into a `StageOutcome`.
//! Neither ever returns an error: timeouts and launch failures are outcomes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::{Stage, StageOutcome};
use crate::metrics::METRICS;
use crate::obs;

/// What came back from one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or -1 when the command never produced one.
    pub exit_code: i32,

    /// stdout followed by stderr, or the executor's own failure message.
    pub output: String,

    /// Whether the command was killed for exceeding its timeout.
    pub timed_out: bool,

    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Output for a command that could not be run at all.
    pub fn failed(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            exit_code: -1,
            output: message.into(),
            timed_out: false,
            duration_ms,
        }
    }
}

/// Runs shell command lines.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` and wait at most `timeout`.
    async fn execute(&self, command: &str, timeout: Duration) -> CommandOutput;
}

/// Executes commands through `sh -c` in a fixed working directory.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    working_dir: PathBuf,
}

impl ShellExecutor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str, timeout: Duration) -> CommandOutput {
        let start = Instant::now();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The shell leads its own group so a timeout can reach everything it forked.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(command = %command, error = %e, "failed to launch command");
                return CommandOutput::failed(e.to_string(), elapsed_ms(start));
            }
        };

        let pid = child.id();

        // Dropping the wait future on timeout drops the child, which kills the shell.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                CommandOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    output: combined,
                    timed_out: false,
                    duration_ms: elapsed_ms(start),
                }
            }
            Ok(Err(e)) => CommandOutput::failed(e.to_string(), elapsed_ms(start)),
            Err(_) => {
                kill_process_group(pid);
                CommandOutput {
                    exit_code: -1,
                    output: format!("Command timed out after {}s", timeout.as_secs()),
                    timed_out: true,
                    duration_ms: elapsed_ms(start),
                }
            }
        }
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        // ESRCH: the group already exited.
        tracing::debug!(pgid = pid, error = %e, "process group not signalled");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Runs verification stages through a `CommandExecutor`.
#[derive(Clone)]
pub struct StageRunner {
    executor: Arc<dyn CommandExecutor>,
}

impl StageRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> Arc<dyn CommandExecutor> {
        Arc::clone(&self.executor)
    }

    /// Run one stage. Never fails; problems show up as a failed outcome.
    pub async fn run(&self, stage: &Stage, timeout: Duration) -> StageOutcome {
        let output = self.executor.execute(&stage.command, timeout).await;

        METRICS.inc_stages_run();
        if output.timed_out {
            METRICS.inc_stage_timeouts();
            tracing::warn!(stage = %stage.name, timeout_secs = timeout.as_secs(), "stage timed out");
        }

        let outcome = StageOutcome {
            stage: stage.clone(),
            succeeded: output.success(),
            raw_output: output.output,
            exit_code: output.exit_code,
            duration_ms: output.duration_ms,
        };
        obs::emit_stage_finished(
            &stage.name,
            outcome.succeeded,
            outcome.exit_code,
            outcome.duration_ms,
        );
        outcome
    }
}
