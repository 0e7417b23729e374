//! Domain models for the verification & remediation engine.
//!
//! - `Stage` / `StageOutcome`: what runs and what came back
//! - `Issue`: a classified failure
//! - `FixAttempt` / `RemediationRound`: remediation bookkeeping
//! - `GateDecision`: the completion gate's output

pub mod error;
pub mod issue;
pub mod remediation;
pub mod stage;

pub use error::{EngineError, Result};
pub use issue::{Issue, IssueFingerprint, IssueKind};
pub use remediation::{
    FixAttempt, FixOutcome, GateDecision, LoopState, RemediationRound, RemediationStatus,
};
pub use stage::{Stage, StageKind, StageOutcome};
