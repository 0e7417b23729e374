//! Vigil Core Library
//!
//! Verification and remediation engine for automated coding sessions: runs
//! configured verification stages, classifies their failures into issues,
//! dispatches bounded fix strategies, re-verifies, and gates completion
//! claims on a clean pass.

pub mod audit;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod engine;
pub mod fakes;
pub mod gate;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod profile;
pub mod remediation;
pub mod report;
pub mod runner;
pub mod session;
pub mod strategy;
pub mod telemetry;
pub mod verify;

pub use domain::{
    EngineError, FixAttempt, FixOutcome, GateDecision, Issue, IssueFingerprint, IssueKind,
    LoopState, RemediationRound, RemediationStatus, Result, Stage, StageKind, StageOutcome,
};

pub use audit::{AuditSink, FsAuditSink, GateRecord, StoredReport};
pub use classifier::FailureClassifier;
pub use config::{EngineConfig, NtfyConfig};
pub use engine::{Engine, InvocationLock, RemediationOutcome};
pub use gate::{is_completion_signal, render_block_message, CompletionGate, GateOutput};
pub use notify::{Notification, NotificationSink, NtfySink};
pub use profile::{MarkerFileResolver, ProfileResolver, ProjectProfile};
pub use remediation::{RemediationLoop, RemediationResult};
pub use report::RemediationReport;
pub use runner::{CommandExecutor, CommandOutput, ShellExecutor, StageRunner};
pub use session::{InvocationPayload, ToolUse};
pub use strategy::{Strategy, StrategyContext, StrategyProfile, StrategyRegistry};
pub use telemetry::init_tracing;
pub use verify::{VerificationPass, Verifier};
