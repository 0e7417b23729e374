//! Verification stage definitions and outcomes.

use serde::{Deserialize, Serialize};

use super::error::{EngineError, Result};
use super::issue::IssueKind;

/// Category of a verification stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Unit/integration test runners (`npm test`, `pytest`).
    Test,

    /// Linters (`eslint`, `ruff`, `flake8`).
    Lint,

    /// Type checkers (`tsc`, `mypy`).
    TypeCheck,

    /// Builds (`npm run build`, `docker-compose build`).
    Build,
}

impl StageKind {
    /// Stable label, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Test => "test",
            StageKind::Lint => "lint",
            StageKind::TypeCheck => "type-check",
            StageKind::Build => "build",
        }
    }

    /// Issue kind used when a failed stage's output matches no extraction rule.
    pub fn default_issue_kind(&self) -> IssueKind {
        match self {
            StageKind::Test => IssueKind::TestFailure,
            StageKind::Lint => IssueKind::LintError,
            StageKind::TypeCheck => IssueKind::TypeError,
            StageKind::Build => IssueKind::BuildError,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named verification step. Immutable once configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Stage {
    /// Human-readable stage name.
    pub name: String,

    /// Shell command line, run through `sh -c` in the project root.
    pub command: String,

    /// Stage category; selects the extraction rules.
    pub kind: StageKind,
}

impl Stage {
    /// Create a stage with an explicit name.
    pub fn new(name: impl Into<String>, command: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            kind,
        }
    }

    /// Create a stage named after its command.
    pub fn from_command(command: impl Into<String>, kind: StageKind) -> Self {
        let command = command.into();
        Self {
            name: command.clone(),
            command,
            kind,
        }
    }

    /// Reject stages that cannot be executed.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidStage("stage has empty name".to_string()));
        }
        if self.command.trim().is_empty() {
            return Err(EngineError::InvalidStage(format!(
                "stage '{}' has empty command",
                self.name
            )));
        }
        Ok(())
    }
}

/// Result of running one stage. Created once per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    /// The stage that ran.
    pub stage: Stage,

    /// Whether the command exited with status 0.
    pub succeeded: bool,

    /// Captured stdout followed by stderr, or the runner's own failure message.
    pub raw_output: String,

    /// Exit code (-1 on timeout, launch failure or signal).
    pub exit_code: i32,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl StageOutcome {
    /// Outcome for a command that never produced an exit status.
    pub fn aborted(stage: &Stage, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage: stage.clone(),
            succeeded: false,
            raw_output: message.into(),
            exit_code: -1,
            duration_ms,
        }
    }
}
