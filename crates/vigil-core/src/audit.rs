//! Append-only audit trail and report persistence.
//!
//! Layout under the audit directory:
//!
//! ```text
//! fix_attempts.jsonl
//! completion_gates.jsonl
//! reports/remediation_report_YYYYmmdd_HHMMSS.json
//! reports/remediation_report_YYYYmmdd_HHMMSS.digest
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::{EngineError, FixAttempt, Issue, Result};
use crate::report::RemediationReport;

/// One completion gate decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateRecord {
    pub timestamp: DateTime<Utc>,
    pub issues: Vec<Issue>,
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

/// Where a report landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReport {
    pub path: PathBuf,
    pub digest: String,
}

/// Sink for attempts, gate decisions and reports.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_attempt(&self, attempt: &FixAttempt) -> Result<()>;

    async fn record_gate(&self, record: &GateRecord) -> Result<()>;

    async fn write_report(&self, report: &RemediationReport) -> Result<StoredReport>;
}

/// Hex sha256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Filesystem sink. Writes are serialized through one mutex.
#[derive(Debug)]
pub struct FsAuditSink {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FsAuditSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn attempts_path(&self) -> PathBuf {
        self.dir.join("fix_attempts.jsonl")
    }

    pub fn gates_path(&self) -> PathBuf {
        self.dir.join("completion_gates.jsonl")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.join("reports")
    }

    async fn append_line<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| audit_error(&self.dir, e))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| audit_error(path, e))?;
        file.write_all(&line).await.map_err(|e| audit_error(path, e))?;
        file.flush().await.map_err(|e| audit_error(path, e))?;
        Ok(())
    }

    /// Read a report and verify it against its `.digest` sidecar.
    pub fn read_report(path: &Path) -> Result<RemediationReport> {
        let json = std::fs::read(path)?;
        let expected = std::fs::read_to_string(path.with_extension("digest"))?;
        let actual = sha256_hex(&json);
        if expected.trim() != actual {
            return Err(EngineError::DigestMismatch {
                expected: expected.trim().to_string(),
                actual,
            });
        }
        Ok(serde_json::from_slice(&json)?)
    }
}

fn audit_error(path: &Path, e: std::io::Error) -> EngineError {
    EngineError::Audit(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl AuditSink for FsAuditSink {
    async fn record_attempt(&self, attempt: &FixAttempt) -> Result<()> {
        self.append_line(&self.attempts_path(), attempt).await
    }

    async fn record_gate(&self, record: &GateRecord) -> Result<()> {
        self.append_line(&self.gates_path(), record).await
    }

    async fn write_report(&self, report: &RemediationReport) -> Result<StoredReport> {
        let json = serde_json::to_vec_pretty(report)?;
        let digest = sha256_hex(&json);

        let _guard = self.write_lock.lock().await;
        let reports_dir = self.reports_dir();
        tokio::fs::create_dir_all(&reports_dir)
            .await
            .map_err(|e| audit_error(&reports_dir, e))?;

        // Same-second reports get a numeric suffix instead of overwriting.
        let base = report.file_name();
        let stem = base.trim_end_matches(".json");
        let mut path = reports_dir.join(&base);
        let mut n = 1;
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            path = reports_dir.join(format!("{}_{}.json", stem, n));
            n += 1;
        }

        tokio::fs::write(&path, &json)
            .await
            .map_err(|e| audit_error(&path, e))?;
        let digest_path = path.with_extension("digest");
        tokio::fs::write(&digest_path, digest.as_bytes())
            .await
            .map_err(|e| audit_error(&digest_path, e))?;

        tracing::info!(path = %path.display(), digest = %digest, "report written");
        Ok(StoredReport { path, digest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FixOutcome, IssueKind, RemediationStatus};
    use crate::remediation::RemediationResult;
    use crate::strategy::StrategyProfile;

    fn report() -> RemediationReport {
        let result = RemediationResult {
            status: RemediationStatus::Verified,
            initial_issues: Vec::new(),
            residual_issues: Vec::new(),
            rounds: Vec::new(),
            attempts: Vec::new(),
            final_outcomes: Vec::new(),
            fixed_count: 0,
            remaining_count: 0,
            all_fixed: true,
            transitions: Vec::new(),
        };
        RemediationReport::new("inv", "/proj", StrategyProfile::Python, &result, Vec::new())
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_attempts_append_as_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FsAuditSink::new(dir.path().join("audit"));
        let attempt = FixAttempt {
            issue: Issue::new(IssueKind::LintError, "lint", "x"),
            strategy_name: "eslint-fix".to_string(),
            outcome: FixOutcome::Fixed,
            claimed: true,
            round: 1,
            timestamp: Utc::now(),
        };
        sink.record_attempt(&attempt).await.expect("append");
        sink.record_attempt(&attempt).await.expect("append");

        let raw = std::fs::read_to_string(sink.attempts_path()).expect("read");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: FixAttempt = serde_json::from_str(lines[0]).expect("parse");
        assert_eq!(parsed, attempt);
    }

    #[tokio::test]
    async fn test_gate_record_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FsAuditSink::new(dir.path());
        let record = GateRecord {
            timestamp: Utc::now(),
            issues: vec![Issue::new(IssueKind::TypeError, "tsc", "bad")],
            blocked: true,
            trigger: Some("all done".to_string()),
        };
        sink.record_gate(&record).await.expect("append");

        let raw = std::fs::read_to_string(sink.gates_path()).expect("read");
        let value: serde_json::Value = serde_json::from_str(raw.trim()).expect("parse");
        assert_eq!(value["blocked"], true);
        assert_eq!(value["issues"].as_array().map(|a| a.len()), Some(1));
        assert!(value.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn test_report_roundtrip_with_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FsAuditSink::new(dir.path());
        let stored = sink.write_report(&report()).await.expect("write");

        assert!(stored.path.starts_with(sink.reports_dir()));
        let read = FsAuditSink::read_report(&stored.path).expect("read");
        assert_eq!(read.invocation_id, "inv");
    }

    #[tokio::test]
    async fn test_same_second_reports_do_not_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FsAuditSink::new(dir.path());
        let r = report();
        let a = sink.write_report(&r).await.expect("write");
        let b = sink.write_report(&r).await.expect("write");
        assert_ne!(a.path, b.path);
    }

    #[tokio::test]
    async fn test_tampered_report_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FsAuditSink::new(dir.path());
        let stored = sink.write_report(&report()).await.expect("write");

        let mut json = std::fs::read_to_string(&stored.path).expect("read");
        json = json.replace("\"inv\"", "\"forged\"");
        std::fs::write(&stored.path, json).expect("write");

        let err = FsAuditSink::read_report(&stored.path).unwrap_err();
        assert!(matches!(err, EngineError::DigestMismatch { .. }));
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_audit_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a dir").expect("write");
        let sink = FsAuditSink::new(blocker.join("audit"));

        let record = GateRecord {
            timestamp: Utc::now(),
            issues: Vec::new(),
            blocked: false,
            trigger: None,
        };
        let err = sink.record_gate(&record).await.unwrap_err();
        assert!(matches!(err, EngineError::Audit(_)));
    }
}
