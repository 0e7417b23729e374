//! The bounded remediate-then-reverify loop.
//!
//! Each round dispatches one strategy per fixable issue, then re-runs every
//! stage. Only re-verification decides what counts as fixed: an attempt is
//! `Fixed` iff the next pass holds fewer issues with its fingerprint than the
//! attempts still waiting to be matched against it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::audit::AuditSink;
use crate::domain::{
    FixAttempt, FixOutcome, Issue, IssueFingerprint, LoopState, RemediationRound,
    RemediationStatus, Result, Stage, StageOutcome,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::strategy::{dispatch, StrategyContext, StrategyProfile, StrategyRegistry};
use crate::verify::Verifier;

/// What the loop hands back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RemediationResult {
    pub status: RemediationStatus,
    /// Issues from the first verification pass.
    pub initial_issues: Vec<Issue>,
    /// Issues from the last verification pass.
    pub residual_issues: Vec<Issue>,
    pub rounds: Vec<RemediationRound>,
    pub attempts: Vec<FixAttempt>,
    /// Stage outcomes of the last verification pass.
    pub final_outcomes: Vec<StageOutcome>,
    /// Attempted issues gone from the last pass. Never more than
    /// `initial_issues.len() - remaining_count`.
    pub fixed_count: usize,
    pub remaining_count: usize,
    pub all_fixed: bool,
    /// Every state visited, starting with `Idle`.
    pub transitions: Vec<LoopState>,
}

struct StateTrace {
    visited: Vec<LoopState>,
}

impl StateTrace {
    fn new() -> Self {
        Self {
            visited: vec![LoopState::Idle],
        }
    }

    fn advance(&mut self, next: LoopState) {
        let current = self.visited.last().copied().unwrap_or(LoopState::Idle);
        debug_assert!(
            current.can_transition_to(next),
            "illegal loop transition {:?} -> {:?}",
            current,
            next
        );
        tracing::trace!(from = ?current, to = ?next, "loop transition");
        self.visited.push(next);
    }
}

/// Drives verification and remediation for one invocation.
pub struct RemediationLoop {
    verifier: Verifier,
    registry: Arc<StrategyRegistry>,
    audit: Arc<dyn AuditSink>,
    ctx: StrategyContext,
    profile: StrategyProfile,
    max_rounds: u32,
}

impl RemediationLoop {
    pub fn new(
        verifier: Verifier,
        registry: Arc<StrategyRegistry>,
        audit: Arc<dyn AuditSink>,
        ctx: StrategyContext,
        profile: StrategyProfile,
        max_rounds: u32,
    ) -> Self {
        Self {
            verifier,
            registry,
            audit,
            ctx,
            profile,
            max_rounds,
        }
    }

    /// Run until clean or out of rounds.
    ///
    /// Stage, classification and strategy failures never surface here; an
    /// error means the stage set is unusable, a runner crashed, or the audit
    /// sink failed.
    pub async fn run(&self, stages: &[Stage]) -> Result<RemediationResult> {
        let mut trace = StateTrace::new();

        trace.advance(LoopState::Verifying);
        let first = self.verifier.run(stages).await?;
        if first.is_clean() {
            trace.advance(LoopState::Clean);
            trace.advance(LoopState::Done);
            return Ok(RemediationResult {
                status: RemediationStatus::Verified,
                initial_issues: Vec::new(),
                residual_issues: Vec::new(),
                rounds: Vec::new(),
                attempts: Vec::new(),
                final_outcomes: first.outcomes,
                fixed_count: 0,
                remaining_count: 0,
                all_fixed: true,
                transitions: trace.visited,
            });
        }

        trace.advance(LoopState::HasIssues);
        let initial_issues = first.issues.clone();
        let mut current = first;
        // Fingerprint -> (rounds it was attempted in, last such round).
        let mut rounds_attempted: HashMap<IssueFingerprint, (usize, u32)> = HashMap::new();
        // Fingerprint -> most instances attempted in a single round.
        let mut peak_attempted: HashMap<IssueFingerprint, usize> = HashMap::new();
        let mut rounds = Vec::new();
        let mut all_attempts = Vec::new();
        let mut round = 1u32;

        let status = loop {
            trace.advance(LoopState::Remediating);
            let mut pending = Vec::new();
            let mut attempted_this_round: HashMap<IssueFingerprint, usize> = HashMap::new();

            for issue in current.issues.iter().filter(|issue| issue.fixable) {
                let strategies = self.registry.strategies_for(self.profile, issue.kind);
                if strategies.is_empty() {
                    continue;
                }

                // Later rounds move down the ordered list for the same issue.
                let fingerprint = issue.fingerprint();
                let (tried, last_round) = rounds_attempted.entry(fingerprint.clone()).or_insert((0, 0));
                if *last_round != round {
                    *tried += 1;
                    *last_round = round;
                }
                let strategy = &strategies[(*tried - 1).min(strategies.len() - 1)];
                *attempted_this_round.entry(fingerprint).or_insert(0) += 1;

                METRICS.inc_fix_attempts();
                let claimed = dispatch(strategy.as_ref(), issue, &self.ctx).await;
                tracing::debug!(
                    round,
                    strategy = strategy.name(),
                    kind = %issue.kind,
                    claimed,
                    "strategy dispatched"
                );
                pending.push((issue.clone(), strategy.name().to_string(), claimed));
            }

            trace.advance(LoopState::Reverifying);
            let next = self.verifier.run(stages).await?;
            for (fingerprint, count) in attempted_this_round {
                let peak = peak_attempted.entry(fingerprint).or_insert(0);
                *peak = (*peak).max(count);
            }

            let mut still_present = count_fingerprints(&next.issues);
            let mut attempts = Vec::with_capacity(pending.len());
            for (issue, strategy_name, claimed) in pending {
                let outcome = match still_present.get_mut(&issue.fingerprint()) {
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        FixOutcome::Failed
                    }
                    _ => FixOutcome::Fixed,
                };
                let attempt = FixAttempt {
                    issue,
                    strategy_name,
                    outcome,
                    claimed,
                    round,
                    timestamp: Utc::now(),
                };
                self.audit.record_attempt(&attempt).await?;
                attempts.push(attempt);
            }

            obs::emit_round_finished(round, current.issues.len(), attempts.len(), next.issues.len());
            all_attempts.extend(attempts.iter().cloned());
            rounds.push(RemediationRound {
                round_number: round,
                issues_before: current.issues.clone(),
                attempts,
                issues_after: next.issues.clone(),
            });
            current = next;

            if current.is_clean() {
                trace.advance(LoopState::Clean);
                break RemediationStatus::AllFixed;
            }
            if round < self.max_rounds {
                round += 1;
                continue;
            }
            trace.advance(LoopState::ResidualIssues);
            trace.advance(LoopState::Reporting);
            break RemediationStatus::PartiallyFixed;
        };
        trace.advance(LoopState::Done);

        let remaining = count_fingerprints(&current.issues);
        let fixed_count = peak_attempted
            .iter()
            .map(|(fp, peak)| peak.saturating_sub(remaining.get(fp).copied().unwrap_or(0)))
            .sum::<usize>()
            .min(initial_issues.len().saturating_sub(current.issues.len()));
        METRICS.add_fixes_verified(fixed_count as u64);

        Ok(RemediationResult {
            status,
            initial_issues,
            remaining_count: current.issues.len(),
            all_fixed: current.issues.is_empty(),
            residual_issues: current.issues,
            rounds,
            attempts: all_attempts,
            final_outcomes: current.outcomes,
            fixed_count,
            transitions: trace.visited,
        })
    }
}

fn count_fingerprints(issues: &[Issue]) -> HashMap<IssueFingerprint, usize> {
    let mut counts = HashMap::new();
    for issue in issues {
        *counts.entry(issue.fingerprint()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FailureClassifier;
    use crate::domain::{IssueKind, StageKind};
    use crate::fakes::{MemoryAuditSink, ScriptedExecutor};
    use crate::runner::StageRunner;
    use std::time::Duration;

    fn build(exec: Arc<ScriptedExecutor>, audit: Arc<MemoryAuditSink>, max_rounds: u32) -> RemediationLoop {
        let registry = Arc::new(StrategyRegistry::defaults());
        let profile = StrategyProfile::Javascript;
        let classifier = FailureClassifier::new(10, registry.fixable_kinds(profile));
        let verifier = Verifier::new(StageRunner::new(exec.clone()), classifier, Duration::from_secs(5));
        let ctx = StrategyContext::new("/proj", exec, Duration::from_secs(5));
        RemediationLoop::new(verifier, registry, audit, ctx, profile, max_rounds)
    }

    #[tokio::test]
    async fn test_clean_first_pass_is_verified() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_exit("npm test", 0, "all good");
        let audit = Arc::new(MemoryAuditSink::new());

        let result = build(exec, audit.clone(), 3)
            .run(&[Stage::from_command("npm test", StageKind::Test)])
            .await
            .expect("run");

        assert_eq!(result.status, RemediationStatus::Verified);
        assert!(result.all_fixed);
        assert!(result.rounds.is_empty());
        assert!(audit.attempts().is_empty());
        assert_eq!(
            result.transitions,
            vec![LoopState::Idle, LoopState::Verifying, LoopState::Clean, LoopState::Done]
        );
    }

    #[tokio::test]
    async fn test_lint_fix_verified_in_one_round() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_exit("npm run lint", 1, "app.js:12:3 missing semicolon\n");
        exec.push_exit("npm run lint", 0, "");
        exec.push_exit("npm run lint -- --fix", 0, "fixed");
        let audit = Arc::new(MemoryAuditSink::new());

        let result = build(exec, audit.clone(), 3)
            .run(&[Stage::from_command("npm run lint", StageKind::Lint)])
            .await
            .expect("run");

        assert_eq!(result.status, RemediationStatus::AllFixed);
        assert!(result.all_fixed);
        assert_eq!(result.rounds.len(), 1);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].outcome, FixOutcome::Fixed);
        assert_eq!(result.attempts[0].strategy_name, "eslint-fix");
        assert_eq!(result.fixed_count, 1);
        assert_eq!(result.remaining_count, 0);
        assert_eq!(audit.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_claimed_fix_that_reappears_is_failed() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_exit("npm run lint", 1, "app.js:12:3 missing semicolon\n");
        exec.push_exit("npm run lint -- --fix", 0, "claimed");
        let audit = Arc::new(MemoryAuditSink::new());

        let result = build(exec, audit, 1)
            .run(&[Stage::from_command("npm run lint", StageKind::Lint)])
            .await
            .expect("run");

        assert_eq!(result.status, RemediationStatus::PartiallyFixed);
        let attempt = &result.attempts[0];
        assert!(attempt.claimed);
        assert_eq!(attempt.outcome, FixOutcome::Failed);
        assert_eq!(result.residual_issues.len(), 1);
        assert_eq!(result.fixed_count, 0);
    }

    #[tokio::test]
    async fn test_shifted_line_is_still_the_same_issue() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_exit(
            "npm run lint",
            1,
            "app.js:4:1 'React' is not defined\napp.js:10:1 Unexpected console statement\n",
        );
        exec.push_exit("npm run lint", 1, "app.js:11:1 Unexpected console statement\n");
        exec.push_exit("npm run lint -- --fix", 0, "");
        let audit = Arc::new(MemoryAuditSink::new());

        let result = build(exec, audit, 1)
            .run(&[Stage::from_command("npm run lint", StageKind::Lint)])
            .await
            .expect("run");

        let console = result
            .attempts
            .iter()
            .find(|a| a.issue.message.contains("console"))
            .expect("console attempt");
        assert_eq!(console.issue.line, Some(10));
        assert_eq!(console.outcome, FixOutcome::Failed);
        let react = result
            .attempts
            .iter()
            .find(|a| a.issue.message.contains("React"))
            .expect("react attempt");
        assert_eq!(react.outcome, FixOutcome::Fixed);

        assert_eq!(result.fixed_count, 1);
        assert_eq!(result.remaining_count, 1);
        assert!(result.fixed_count + result.remaining_count <= result.initial_issues.len());
    }

    #[tokio::test]
    async fn test_repeated_message_counts_each_instance() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_exit(
            "npm run lint",
            1,
            "app.js:3:1 missing semicolon\napp.js:8:1 missing semicolon\n",
        );
        exec.push_exit("npm run lint", 1, "app.js:9:1 missing semicolon\n");
        exec.push_exit("npm run lint -- --fix", 0, "");
        let audit = Arc::new(MemoryAuditSink::new());

        let result = build(exec, audit, 1)
            .run(&[Stage::from_command("npm run lint", StageKind::Lint)])
            .await
            .expect("run");

        assert_eq!(result.attempts.len(), 2);
        let outcomes: Vec<FixOutcome> = result.attempts.iter().map(|a| a.outcome).collect();
        assert_eq!(outcomes.iter().filter(|o| **o == FixOutcome::Fixed).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == FixOutcome::Failed).count(), 1);
        // Both instances used the first strategy in the list.
        assert!(result.attempts.iter().all(|a| a.strategy_name == "eslint-fix"));
        assert_eq!(result.fixed_count, 1);
        assert_eq!(result.remaining_count, 1);
    }

    #[tokio::test]
    async fn test_unfixable_issue_runs_every_round() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_exit("npm run build", 2, "something odd happened\n");
        let audit = Arc::new(MemoryAuditSink::new());

        let result = build(exec.clone(), audit, 3)
            .run(&[Stage::from_command("npm run build", StageKind::Build)])
            .await
            .expect("run");

        assert_eq!(result.rounds.len(), 3);
        assert!(!result.all_fixed);
        assert!(result.attempts.is_empty());
        assert!(!result.initial_issues[0].fixable);
        // One initial pass plus one re-verification per round.
        assert_eq!(exec.calls_for("npm run build"), 4);
        assert_eq!(result.transitions.last(), Some(&LoopState::Done));
        assert!(result.transitions.contains(&LoopState::Reporting));
    }

    #[tokio::test]
    async fn test_stage_set_error_surfaces() {
        let exec = Arc::new(ScriptedExecutor::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let err = build(exec, audit, 3).run(&[]).await.unwrap_err();
        assert!(err.to_string().contains("no stages"));
    }

    #[tokio::test]
    async fn test_audit_failure_surfaces() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_exit("npm run lint", 1, "app.js:12:3 missing semicolon\n");
        let audit = Arc::new(MemoryAuditSink::failing());

        let err = build(exec, audit, 3)
            .run(&[Stage::from_command("npm run lint", StageKind::Lint)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("audit"));
    }

    #[tokio::test]
    async fn test_issue_kind_without_strategy_is_not_dispatched() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_exit("npx tsc", 1, "src/a.ts(1,1): error TS2304: Cannot find name 'x'.\n");
        let audit = Arc::new(MemoryAuditSink::new());

        let result = build(exec, audit, 2)
            .run(&[Stage::from_command("npx tsc", StageKind::TypeCheck)])
            .await
            .expect("run");
        assert_eq!(result.initial_issues[0].kind, IssueKind::TypeError);
        assert!(result.attempts.is_empty());
        assert_eq!(result.rounds.len(), 2);
    }
}
