//! Structured observability hooks for engine invocations.
//!
//! - Invocation-scoped tracing spans via `invocation_span`
//! - Emission functions for lifecycle events: remediation start/finish,
//!   stage completion, round completion, gate evaluation

use tracing::info;

/// Span covering one engine invocation.
///
/// ```ignore
/// engine_work().instrument(invocation_span("6f1c...", "remediate")).await
/// // every event inside carries invocation_id and mode
/// ```
pub fn invocation_span(invocation_id: &str, mode: &str) -> tracing::Span {
    tracing::info_span!("vigil.invocation", invocation_id = %invocation_id, mode = %mode)
}

pub fn emit_remediation_started(project_root: &str, profile: &str, stages: usize, max_rounds: u32) {
    info!(
        event = "remediation.started",
        project_root = %project_root,
        profile = %profile,
        stages = stages,
        max_rounds = max_rounds,
    );
}

/// Emit event: one stage finished.
pub fn emit_stage_finished(stage: &str, succeeded: bool, exit_code: i32, duration_ms: u64) {
    info!(
        event = "stage.finished",
        stage = %stage,
        succeeded = succeeded,
        exit_code = exit_code,
        duration_ms = duration_ms,
    );
}

/// Emit event: a remediate-then-reverify round finished.
pub fn emit_round_finished(round: u32, issues_before: usize, attempts: usize, issues_after: usize) {
    info!(
        event = "round.finished",
        round = round,
        issues_before = issues_before,
        attempts = attempts,
        issues_after = issues_after,
    );
}

pub fn emit_remediation_finished(status: &str, rounds: u32, fixed: usize, remaining: usize) {
    info!(
        event = "remediation.finished",
        status = %status,
        rounds = rounds,
        fixed = fixed,
        remaining = remaining,
    );
}

/// Emit event: gate evaluation completed.
pub fn emit_gate_evaluated(allowed: bool, blocking: usize) {
    info!(event = "gate.evaluated", allowed = allowed, blocking = blocking);
}

/// Emit event: the gate allowed because evaluation failed (error level).
pub fn emit_gate_fail_open(error: &dyn std::fmt::Display) {
    tracing::error!(event = "gate.fail_open", error = %error);
}

/// Emit event: a notification could not be delivered (warning level).
pub fn emit_notification_dropped(sink: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "notification.dropped", sink = %sink, error = %error);
}
