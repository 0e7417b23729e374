//! Engine facade: wires config, profile detection, the remediation loop, the
//! completion gate, audit and notifications for one invocation.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tracing::Instrument;

use crate::audit::{AuditSink, FsAuditSink, StoredReport};
use crate::classifier::FailureClassifier;
use crate::config::EngineConfig;
use crate::domain::{EngineError, GateDecision, Result, Stage};
use crate::gate::{self, CompletionGate};
use crate::metrics::METRICS;
use crate::notify::{notify_best_effort, NoopSink, Notification, NotificationSink, NtfySink};
use crate::obs;
use crate::profile::{MarkerFileResolver, ProfileResolver};
use crate::remediation::RemediationLoop;
use crate::report::RemediationReport;
use crate::runner::{CommandExecutor, ShellExecutor, StageRunner};
use crate::session::{changed_files, InvocationPayload};
use crate::strategy::{StrategyContext, StrategyProfile, StrategyRegistry};
use crate::verify::Verifier;

/// Name of the lock file inside the audit directory.
pub const LOCK_FILE: &str = ".vigil.lock";

/// Exclusive advisory lock held for the length of one invocation.
///
/// Released when dropped.
#[derive(Debug)]
pub struct InvocationLock {
    file: File,
    path: PathBuf,
}

impl InvocationLock {
    /// Take the lock in `audit_dir` without waiting.
    pub fn acquire(audit_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(audit_dir)?;
        let path = audit_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(EngineError::Busy(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InvocationLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release invocation lock");
        }
    }
}

/// A finished remediation and where its report was stored.
#[derive(Debug, Clone)]
pub struct RemediationOutcome {
    pub report: RemediationReport,
    pub stored: StoredReport,
}

/// The verification and remediation engine.
pub struct Engine {
    config: EngineConfig,
    executor: Option<Arc<dyn CommandExecutor>>,
    registry: Arc<StrategyRegistry>,
    resolver: Arc<dyn ProfileResolver>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
}

impl Engine {
    /// Build an engine with the default collaborators: shell execution in the
    /// project root, the built-in strategy table, marker-file profile
    /// detection, a filesystem audit sink and ntfy when configured.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let notifier: Arc<dyn NotificationSink> = match &config.ntfy {
            Some(ntfy) => Arc::new(
                NtfySink::new(ntfy.clone(), config.notification_timeout())
                    .map_err(|e| EngineError::InvalidConfig(format!("ntfy client: {}", e)))?,
            ),
            None => Arc::new(NoopSink),
        };

        Ok(Self {
            audit: Arc::new(FsAuditSink::new(config.audit_dir.clone())),
            executor: None,
            registry: Arc::new(StrategyRegistry::defaults()),
            resolver: Arc::new(MarkerFileResolver),
            notifier,
            config,
        })
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ProfileResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Verify, remediate for up to `max_fix_attempts` rounds, write the report
    /// and notify.
    pub async fn remediate(&self, payload: &InvocationPayload) -> Result<RemediationOutcome> {
        let invocation_id = uuid::Uuid::new_v4().to_string();
        let span = obs::invocation_span(&invocation_id, "remediate");
        self.run_remediation(payload, invocation_id).instrument(span).await
    }

    async fn run_remediation(&self, payload: &InvocationPayload, invocation_id: String) -> Result<RemediationOutcome> {
        let project_root = self.project_root(payload);
        let _lock = InvocationLock::acquire(&self.config.audit_dir)?;

        let (profile, stages) = self.plan(&project_root, payload);
        let executor = self.executor_for(&project_root);
        let verifier = self.verifier(profile, executor.clone());
        let ctx = StrategyContext::new(&project_root, executor, self.config.stage_timeout());
        let remediation = RemediationLoop::new(
            verifier,
            Arc::clone(&self.registry),
            Arc::clone(&self.audit),
            ctx,
            profile,
            self.config.max_fix_attempts,
        );

        obs::emit_remediation_started(
            &project_root.display().to_string(),
            profile.as_str(),
            stages.len(),
            self.config.max_fix_attempts,
        );
        let result = remediation.run(&stages).await?;

        let report = RemediationReport::new(
            invocation_id,
            project_root.display().to_string(),
            profile,
            &result,
            changed_files(&payload.tools_used),
        );
        let stored = self.audit.write_report(&report).await?;

        obs::emit_remediation_finished(
            result.status.as_str(),
            result.rounds.len() as u32,
            result.fixed_count,
            result.remaining_count,
        );

        if let Some(notification) = Notification::for_report(&report) {
            notify_best_effort(self.notifier.as_ref(), &notification, self.config.notification_timeout()).await;
        }
        METRICS.flush();

        Ok(RemediationOutcome { report, stored })
    }

    /// Decide whether a completion may proceed. Never fails: anything that
    /// goes wrong while evaluating allows the completion.
    pub async fn gate(&self, payload: &InvocationPayload) -> GateDecision {
        let invocation_id = uuid::Uuid::new_v4().to_string();
        let span = obs::invocation_span(&invocation_id, "gate");
        self.run_gate(payload).instrument(span).await
    }

    async fn run_gate(&self, payload: &InvocationPayload) -> GateDecision {
        let trigger = payload.trigger.as_deref();
        if let Some(trigger) = trigger {
            if !gate::is_completion_signal(trigger) {
                tracing::debug!(trigger = %trigger, "not a completion signal");
                return GateDecision::allow();
            }
        }

        let _lock = match InvocationLock::acquire(&self.config.audit_dir) {
            Ok(lock) => lock,
            Err(e) => return gate::fail_open(&e),
        };

        let project_root = self.project_root(payload);
        let (profile, stages) = self.plan(&project_root, payload);
        let executor = self.executor_for(&project_root);
        let completion_gate = CompletionGate::new(self.verifier(profile, executor), Arc::clone(&self.audit));

        let decision = completion_gate.evaluate(&stages, trigger).await;
        METRICS.flush();
        decision
    }

    fn project_root(&self, payload: &InvocationPayload) -> PathBuf {
        payload
            .project_root
            .clone()
            .unwrap_or_else(|| self.config.project_root.clone())
    }

    /// Profile and stage set for this invocation. The payload's profile and
    /// stages win over detection.
    fn plan(&self, project_root: &Path, payload: &InvocationPayload) -> (StrategyProfile, Vec<Stage>) {
        let detected = self.resolver.resolve(project_root);
        let profile = payload.profile.unwrap_or(detected.profile);
        let stages = if payload.stage_config.is_empty() {
            if payload.profile.is_some_and(|p| p != detected.profile) {
                crate::profile::default_stages(profile)
            } else {
                detected.stages
            }
        } else {
            payload.stage_config.clone()
        };
        tracing::debug!(profile = %profile, stages = stages.len(), "invocation planned");
        (profile, stages)
    }

    fn executor_for(&self, project_root: &Path) -> Arc<dyn CommandExecutor> {
        match &self.executor {
            Some(executor) => Arc::clone(executor),
            None => Arc::new(ShellExecutor::new(project_root)),
        }
    }

    fn verifier(&self, profile: StrategyProfile, executor: Arc<dyn CommandExecutor>) -> Verifier {
        let classifier = FailureClassifier::new(
            self.config.max_issues_per_stage,
            self.registry.fixable_kinds(profile),
        );
        Verifier::new(StageRunner::new(executor), classifier, self.config.stage_timeout())
            .with_parallel(self.config.parallel_stages)
    }
}
