//! Fix attempts, remediation rounds and gate decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issue::Issue;

/// Verified result of a fix attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FixOutcome {
    /// The issue was absent from the next verification pass.
    Fixed,
    /// The issue was still present, or the strategy failed.
    Failed,
}

/// One strategy dispatch against one issue. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FixAttempt {
    /// The issue the strategy was pointed at.
    pub issue: Issue,

    /// Registered name of the strategy.
    pub strategy_name: String,

    /// Outcome as judged by re-verification.
    pub outcome: FixOutcome,

    /// What the strategy itself reported.
    pub claimed: bool,

    /// Round in which the attempt was made (1-indexed).
    pub round: u32,

    pub timestamp: DateTime<Utc>,
}

/// One remediate-then-reverify cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemediationRound {
    pub round_number: u32,
    pub issues_before: Vec<Issue>,
    pub attempts: Vec<FixAttempt>,
    pub issues_after: Vec<Issue>,
}

/// Terminal result of a remediation invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStatus {
    /// The first verification pass was already clean.
    Verified,
    /// Issues were found and a later pass came back clean.
    AllFixed,
    /// The round budget ran out with issues remaining.
    PartiallyFixed,
}

impl RemediationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationStatus::Verified => "verified",
            RemediationStatus::AllFixed => "all_fixed",
            RemediationStatus::PartiallyFixed => "partially_fixed",
        }
    }
}

/// States of the remediation loop, in the order they can be visited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Verifying,
    Clean,
    HasIssues,
    Remediating,
    Reverifying,
    ResidualIssues,
    Reporting,
    Done,
}

impl LoopState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, next),
            (Idle, Verifying)
                | (Verifying, Clean)
                | (Verifying, HasIssues)
                | (HasIssues, Remediating)
                | (Remediating, Reverifying)
                | (Reverifying, Clean)
                | (Reverifying, Remediating)
                | (Reverifying, ResidualIssues)
                | (ResidualIssues, Reporting)
                | (Clean, Done)
                | (Reporting, Done)
        )
    }
}

/// The completion gate's decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    pub allowed: bool,

    pub blocking_issues: Vec<Issue>,

    /// Set only when the gate allowed because evaluation itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_open_reason: Option<String>,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            blocking_issues: Vec::new(),
            fail_open_reason: None,
        }
    }

    pub fn from_issues(issues: Vec<Issue>) -> Self {
        Self {
            allowed: issues.is_empty(),
            blocking_issues: issues,
            fail_open_reason: None,
        }
    }

    pub fn fail_open(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            blocking_issues: Vec::new(),
            fail_open_reason: Some(reason.into()),
        }
    }
}
