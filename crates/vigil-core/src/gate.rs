//! Completion gate: one verification pass, no remediation, block or allow.
//!
//! The gate never edits the project. Any internal failure while evaluating
//! allows the completion and records why.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditSink, GateRecord};
use crate::domain::{GateDecision, Issue, IssueKind, Stage};
use crate::metrics::METRICS;
use crate::obs;
use crate::report::truncate_chars;
use crate::verify::Verifier;

/// Phrases that mark an utterance as a completion signal.
pub const COMPLETION_PATTERNS: [&str; 7] = [
    "all done",
    "complete",
    "finished",
    "ready",
    "all set",
    "that's it",
    "task complete",
];

/// Entries shown per kind before "… and N more".
pub const MAX_ENTRIES_PER_KIND: usize = 5;

/// Longest message shown in a block entry.
pub const MAX_MESSAGE_CHARS: usize = 120;

/// Case-insensitive substring match against [`COMPLETION_PATTERNS`].
pub fn is_completion_signal(trigger: &str) -> bool {
    let lower = trigger.to_lowercase();
    COMPLETION_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Human-readable block message, grouped by kind in first-seen order.
pub fn render_block_message(issues: &[Issue]) -> String {
    let mut groups: Vec<(IssueKind, Vec<&Issue>)> = Vec::new();
    for issue in issues {
        match groups.iter_mut().find(|(kind, _)| *kind == issue.kind) {
            Some((_, members)) => members.push(issue),
            None => groups.push((issue.kind, vec![issue])),
        }
    }

    let mut out = format!(
        "Cannot mark complete - found {} issue(s):\n",
        issues.len()
    );
    for (kind, members) in &groups {
        out.push_str(&format!("\n{} ({}):\n", kind.heading(), members.len()));
        for issue in members.iter().take(MAX_ENTRIES_PER_KIND) {
            let message = shorten(&issue.message);
            match issue.location() {
                Some(location) => out.push_str(&format!("  {} - {}\n", location, message)),
                None => out.push_str(&format!("  {}\n", message)),
            }
            out.push_str(&format!("    → {}\n", kind.hint()));
        }
        if members.len() > MAX_ENTRIES_PER_KIND {
            out.push_str(&format!("  … and {} more\n", members.len() - MAX_ENTRIES_PER_KIND));
        }
    }
    out.push_str("\nAddress the issues above, then try completing again.");
    out
}

fn shorten(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message.to_string();
    }
    format!("{}…", truncate_chars(message, MAX_MESSAGE_CHARS - 1))
}

/// What the `vigil gate` command prints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GateOutput {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_message: Option<String>,
}

impl From<&GateDecision> for GateOutput {
    fn from(decision: &GateDecision) -> Self {
        Self {
            allowed: decision.allowed,
            blocking_message: if decision.allowed {
                None
            } else {
                Some(render_block_message(&decision.blocking_issues))
            },
        }
    }
}

pub struct CompletionGate {
    verifier: Verifier,
    audit: Arc<dyn AuditSink>,
}

impl CompletionGate {
    pub fn new(verifier: Verifier, audit: Arc<dyn AuditSink>) -> Self {
        Self { verifier, audit }
    }

    /// Decide whether a completion may proceed. Never fails.
    pub async fn evaluate(&self, stages: &[Stage], trigger: Option<&str>) -> GateDecision {
        if let Some(trigger) = trigger {
            if !is_completion_signal(trigger) {
                tracing::debug!(trigger = %trigger, "not a completion signal");
                return GateDecision::allow();
            }
        }

        let decision = match self.verifier.run(stages).await {
            Ok(pass) => GateDecision::from_issues(pass.issues),
            Err(e) => return fail_open(&e),
        };

        let record = GateRecord {
            timestamp: Utc::now(),
            issues: decision.blocking_issues.clone(),
            blocked: !decision.allowed,
            trigger: trigger.map(str::to_string),
        };
        if let Err(e) = self.audit.record_gate(&record).await {
            return fail_open(&e);
        }

        if !decision.allowed {
            METRICS.inc_gate_blocks();
        }
        obs::emit_gate_evaluated(decision.allowed, decision.blocking_issues.len());
        decision
    }
}

/// Allow because evaluation itself failed; counted and logged at error level.
pub fn fail_open(error: &dyn std::fmt::Display) -> GateDecision {
    METRICS.inc_gate_fail_opens();
    obs::emit_gate_fail_open(error);
    GateDecision::fail_open(error.to_string())
}
