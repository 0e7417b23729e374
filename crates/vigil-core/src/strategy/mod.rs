//! Remediation strategies and the registry that selects them.
//!
//! A [`Strategy`] makes one attempt at fixing one [`Issue`]. Its `true` only
//! means "something was changed"; the remediation loop re-verifies before it
//! counts anything as fixed. The [`StrategyRegistry`] is a static table keyed
//! by `(StrategyProfile, IssueKind)` plus a generic fallback.

pub mod command;
pub mod edit;

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::domain::{Issue, IssueKind};
use crate::runner::CommandExecutor;

pub use command::CommandStrategy;
pub use edit::{JsLineRepair, PrependImport, PyBlockIndent};

/// Language/tooling profile a registry entry applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StrategyProfile {
    Javascript,
    Python,
    Docker,
}

impl StrategyProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyProfile::Javascript => "javascript",
            StrategyProfile::Python => "python",
            StrategyProfile::Docker => "docker",
        }
    }
}

impl std::fmt::Display for StrategyProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a strategy may touch while attempting a fix.
#[derive(Clone)]
pub struct StrategyContext {
    pub project_root: PathBuf,
    pub executor: Arc<dyn CommandExecutor>,
    /// Timeout for each command a strategy runs.
    pub timeout: Duration,
}

impl StrategyContext {
    pub fn new(project_root: impl Into<PathBuf>, executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self {
            project_root: project_root.into(),
            executor,
            timeout,
        }
    }

    /// Resolve an issue's file against the project root.
    pub fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// One way of fixing an issue.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable name recorded in fix attempts.
    fn name(&self) -> &str;

    /// Try to fix `issue`. `Ok(true)` means a change was applied.
    async fn attempt(&self, issue: &Issue, ctx: &StrategyContext) -> anyhow::Result<bool>;
}

/// Run a strategy, turning errors and panics into `false`.
pub async fn dispatch(strategy: &dyn Strategy, issue: &Issue, ctx: &StrategyContext) -> bool {
    match AssertUnwindSafe(strategy.attempt(issue, ctx)).catch_unwind().await {
        Ok(Ok(applied)) => applied,
        Ok(Err(e)) => {
            tracing::warn!(strategy = strategy.name(), error = %e, "strategy failed");
            false
        }
        Err(_) => {
            tracing::error!(strategy = strategy.name(), "strategy panicked");
            false
        }
    }
}

/// Maps `(profile, kind)` to an ordered list of strategies.
pub struct StrategyRegistry {
    entries: HashMap<(StrategyProfile, IssueKind), Vec<Arc<dyn Strategy>>>,
    fallback: Option<Arc<dyn Strategy>>,
    fallback_kinds: HashSet<IssueKind>,
}

impl StrategyRegistry {
    /// A registry with no strategies at all.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            fallback: None,
            fallback_kinds: HashSet::new(),
        }
    }

    /// The built-in strategy table.
    pub fn defaults() -> Self {
        use IssueKind::*;
        use StrategyProfile::*;

        Self::empty()
            .register(
                Javascript,
                LintError,
                Arc::new(CommandStrategy::new("eslint-fix", ["npm run lint -- --fix"])),
            )
            .register(Javascript, MissingImport, Arc::new(PrependImport::react()))
            .register(Javascript, SyntaxError, Arc::new(JsLineRepair))
            .register(
                Python,
                ImportError,
                Arc::new(CommandStrategy::new("pip-install", ["pip install {module}"])),
            )
            .register(Python, SyntaxError, Arc::new(PyBlockIndent))
            .register(
                Python,
                IndentationError,
                Arc::new(CommandStrategy::new(
                    "python-reformat",
                    ["autopep8 --in-place {file}", "black {file}"],
                )),
            )
            .register(
                Docker,
                YamlError,
                Arc::new(CommandStrategy::new(
                    "yamllint-relaxed",
                    ["yamllint -d relaxed docker-compose.yml"],
                )),
            )
            .with_fallback(Arc::new(CommandStrategy::generic_fallback()), [LintError])
    }

    /// Append a strategy for `(profile, kind)`.
    pub fn register(mut self, profile: StrategyProfile, kind: IssueKind, strategy: Arc<dyn Strategy>) -> Self {
        self.entries.entry((profile, kind)).or_default().push(strategy);
        self
    }

    /// Strategy used when no kind-specific entry exists, for the given kinds.
    pub fn with_fallback(
        mut self,
        strategy: Arc<dyn Strategy>,
        kinds: impl IntoIterator<Item = IssueKind>,
    ) -> Self {
        self.fallback = Some(strategy);
        self.fallback_kinds = kinds.into_iter().collect();
        self
    }

    /// Ordered strategies for `(profile, kind)`; empty when none apply.
    pub fn strategies_for(&self, profile: StrategyProfile, kind: IssueKind) -> Vec<Arc<dyn Strategy>> {
        if let Some(list) = self.entries.get(&(profile, kind)) {
            if !list.is_empty() {
                return list.clone();
            }
        }
        match &self.fallback {
            Some(fallback) if self.fallback_kinds.contains(&kind) => vec![Arc::clone(fallback)],
            _ => Vec::new(),
        }
    }

    pub fn has_strategy(&self, profile: StrategyProfile, kind: IssueKind) -> bool {
        !self.strategies_for(profile, kind).is_empty()
    }

    /// Every kind with at least one strategy under `profile`.
    pub fn fixable_kinds(&self, profile: StrategyProfile) -> Vec<IssueKind> {
        IssueKind::ALL
            .into_iter()
            .filter(|kind| self.has_strategy(profile, *kind))
            .collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}
