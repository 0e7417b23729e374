//! In-memory fakes for the engine's seams (testing only)
//!
//! Provides `ScriptedExecutor`, `PanickingExecutor`, `MemoryAuditSink`,
//! `RecordingNotifier` and `FixedProfileResolver`, which satisfy the trait
//! contracts without touching processes, disk or the network.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::audit::{sha256_hex, AuditSink, GateRecord, StoredReport};
use crate::domain::{EngineError, FixAttempt, Result, Stage};
use crate::notify::{Notification, NotificationSink};
use crate::profile::{ProfileResolver, ProjectProfile};
use crate::report::RemediationReport;
use crate::runner::{CommandExecutor, CommandOutput};
use crate::strategy::StrategyProfile;

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

/// Executor that replays scripted outputs per command line.
///
/// Each command has its own queue. Entries are consumed in order and the last
/// one repeats. Unscripted commands exit 127.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: &str, output: CommandOutput) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(command.to_string()).or_default().push_back(output);
    }

    pub fn push_exit(&self, command: &str, exit_code: i32, output: &str) {
        self.push(
            command,
            CommandOutput {
                exit_code,
                output: output.to_string(),
                timed_out: false,
                duration_ms: 1,
            },
        );
    }

    pub fn push_timeout(&self, command: &str, timeout: Duration) {
        self.push(
            command,
            CommandOutput {
                exit_code: -1,
                output: format!("Command timed out after {}s", timeout.as_secs()),
                timed_out: true,
                duration_ms: timeout.as_millis() as u64,
            },
        );
    }

    /// Every command executed, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, command: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == command).count()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &str, _timeout: Duration) -> CommandOutput {
        self.calls.lock().unwrap().push(command.to_string());
        let mut scripts = self.scripts.lock().unwrap();
        if let Some(queue) = scripts.get_mut(command) {
            let next = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
            if let Some(output) = next {
                return output;
            }
        }
        CommandOutput {
            exit_code: 127,
            output: format!("sh: {}: command not found", command),
            timed_out: false,
            duration_ms: 0,
        }
    }
}

/// Executor that panics on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanickingExecutor;

#[async_trait]
impl CommandExecutor for PanickingExecutor {
    async fn execute(&self, command: &str, _timeout: Duration) -> CommandOutput {
        panic!("executor exploded running {}", command);
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditSink
// ---------------------------------------------------------------------------

/// Audit sink that keeps everything in memory. `failing()` rejects every write.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    attempts: Mutex<Vec<FixAttempt>>,
    gates: Mutex<Vec<GateRecord>>,
    reports: Mutex<Vec<RemediationReport>>,
    fail: bool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<FixAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn gates(&self) -> Vec<GateRecord> {
        self.gates.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<RemediationReport> {
        self.reports.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            return Err(EngineError::Audit("memory sink configured to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record_attempt(&self, attempt: &FixAttempt) -> Result<()> {
        self.check()?;
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(())
    }

    async fn record_gate(&self, record: &GateRecord) -> Result<()> {
        self.check()?;
        self.gates.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn write_report(&self, report: &RemediationReport) -> Result<StoredReport> {
        self.check()?;
        let json = serde_json::to_vec_pretty(report)?;
        let mut reports = self.reports.lock().unwrap();
        reports.push(report.clone());
        Ok(StoredReport {
            path: PathBuf::from(format!("memory/{}/{}", reports.len(), report.file_name())),
            digest: sha256_hex(&json),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notification sink that records what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("recording notifier configured to fail");
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FixedProfileResolver
// ---------------------------------------------------------------------------

/// Resolver that always answers with the same profile and stages.
#[derive(Debug, Clone)]
pub struct FixedProfileResolver {
    profile: ProjectProfile,
}

impl FixedProfileResolver {
    pub fn new(profile: StrategyProfile, stages: Vec<Stage>) -> Self {
        Self {
            profile: ProjectProfile { profile, stages },
        }
    }
}

impl ProfileResolver for FixedProfileResolver {
    fn resolve(&self, _project_root: &Path) -> ProjectProfile {
        self.profile.clone()
    }
}
