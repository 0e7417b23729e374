//! The remediation report persisted at the end of every invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FixAttempt, Issue, RemediationRound, RemediationStatus, StageKind, StageOutcome};
use crate::remediation::RemediationResult;
use crate::strategy::StrategyProfile;

/// Characters of stage output kept in a report.
pub const MAX_STAGE_OUTPUT_CHARS: usize = 1000;

/// One stage of the final verification pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub name: String,
    pub command: String,
    pub kind: StageKind,
    pub succeeded: bool,
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Leading part of the raw output.
    pub output: String,
}

impl From<&StageOutcome> for StageSummary {
    fn from(outcome: &StageOutcome) -> Self {
        Self {
            name: outcome.stage.name.clone(),
            command: outcome.stage.command.clone(),
            kind: outcome.stage.kind,
            succeeded: outcome.succeeded,
            exit_code: outcome.exit_code,
            duration_ms: outcome.duration_ms,
            output: truncate_chars(&outcome.raw_output, MAX_STAGE_OUTPUT_CHARS),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StageStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Full account of one remediation invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemediationReport {
    pub invocation_id: String,
    pub timestamp: DateTime<Utc>,
    pub project_root: String,
    pub profile: StrategyProfile,
    pub stages_run: Vec<StageSummary>,
    pub stats: StageStats,
    /// Issues found by the first verification pass.
    pub issues: Vec<Issue>,
    pub residual_issues: Vec<Issue>,
    pub rounds: Vec<RemediationRound>,
    pub fix_attempts: Vec<FixAttempt>,
    pub fixed_count: usize,
    pub remaining_count: usize,
    pub all_fixed: bool,
    pub status: RemediationStatus,
    #[serde(default)]
    pub changed_files: Vec<String>,
}

impl RemediationReport {
    pub fn new(
        invocation_id: impl Into<String>,
        project_root: impl Into<String>,
        profile: StrategyProfile,
        result: &RemediationResult,
        changed_files: Vec<String>,
    ) -> Self {
        let stages_run: Vec<StageSummary> = result.final_outcomes.iter().map(StageSummary::from).collect();
        let passed = stages_run.iter().filter(|s| s.succeeded).count();
        let stats = StageStats {
            total: stages_run.len(),
            passed,
            failed: stages_run.len() - passed,
        };

        Self {
            invocation_id: invocation_id.into(),
            timestamp: Utc::now(),
            project_root: project_root.into(),
            profile,
            stages_run,
            stats,
            issues: result.initial_issues.clone(),
            residual_issues: result.residual_issues.clone(),
            rounds: result.rounds.clone(),
            fix_attempts: result.attempts.clone(),
            fixed_count: result.fixed_count,
            remaining_count: result.remaining_count,
            all_fixed: result.all_fixed,
            status: result.status,
            changed_files,
        }
    }

    /// `remediation_report_YYYYmmdd_HHMMSS.json`
    pub fn file_name(&self) -> String {
        format!(
            "remediation_report_{}.json",
            self.timestamp.format("%Y%m%d_%H%M%S")
        )
    }
}

/// First `max` characters of `s`, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueKind, Stage};

    fn result_with(outcomes: Vec<StageOutcome>, residual: Vec<Issue>) -> RemediationResult {
        RemediationResult {
            status: if residual.is_empty() {
                RemediationStatus::AllFixed
            } else {
                RemediationStatus::PartiallyFixed
            },
            initial_issues: residual.clone(),
            remaining_count: residual.len(),
            all_fixed: residual.is_empty(),
            residual_issues: residual,
            rounds: Vec::new(),
            attempts: Vec::new(),
            final_outcomes: outcomes,
            fixed_count: 0,
            transitions: Vec::new(),
        }
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_stage_summary_truncates_output() {
        let outcome = StageOutcome {
            stage: Stage::new("test", "npm test", StageKind::Test),
            succeeded: false,
            raw_output: "x".repeat(5000),
            exit_code: 1,
            duration_ms: 3,
        };
        let summary = StageSummary::from(&outcome);
        assert_eq!(summary.output.len(), MAX_STAGE_OUTPUT_CHARS);
    }

    #[test]
    fn test_report_stats_and_wire_names() {
        let pass = StageOutcome {
            stage: Stage::new("test", "npm test", StageKind::Test),
            succeeded: true,
            raw_output: String::new(),
            exit_code: 0,
            duration_ms: 3,
        };
        let fail = StageOutcome {
            stage: Stage::new("lint", "npm run lint", StageKind::Lint),
            succeeded: false,
            raw_output: "app.js:1:1: bad".to_string(),
            exit_code: 1,
            duration_ms: 3,
        };
        let residual = vec![Issue::new(IssueKind::LintError, "lint", "bad")];
        let report = RemediationReport::new(
            "inv-1",
            "/proj",
            StrategyProfile::Javascript,
            &result_with(vec![pass, fail], residual),
            vec!["app.js".to_string()],
        );

        assert_eq!(report.stats, StageStats { total: 2, passed: 1, failed: 1 });
        assert!(report.file_name().starts_with("remediation_report_"));
        assert!(report.file_name().ends_with(".json"));

        let value = serde_json::to_value(&report).expect("serialize");
        for key in [
            "timestamp",
            "projectRoot",
            "profile",
            "stagesRun",
            "issues",
            "residualIssues",
            "rounds",
            "fixAttempts",
            "fixedCount",
            "remainingCount",
            "allFixed",
            "status",
            "changedFiles",
        ] {
            assert!(value.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(value["status"], "partially_fixed");
        assert_eq!(value["profile"], "javascript");
    }
}
