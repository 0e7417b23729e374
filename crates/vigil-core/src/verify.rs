//! A single verification pass: run every stage, classify, dedupe.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;

use crate::classifier::FailureClassifier;
use crate::domain::{EngineError, Issue, Result, Stage, StageOutcome};
use crate::runner::StageRunner;

/// Everything one pass produced, in stage order.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationPass {
    pub outcomes: Vec<StageOutcome>,
    pub issues: Vec<Issue>,
}

impl VerificationPass {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Runs stages and classifies their outcomes.
#[derive(Clone)]
pub struct Verifier {
    runner: StageRunner,
    classifier: FailureClassifier,
    timeout: Duration,
    parallel: bool,
}

impl Verifier {
    pub fn new(runner: StageRunner, classifier: FailureClassifier, timeout: Duration) -> Self {
        Self {
            runner,
            classifier,
            timeout,
            parallel: false,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run one pass over `stages`.
    ///
    /// Stage failures are outcomes, not errors. An error here means the stage
    /// set is unusable or a runner task crashed.
    pub async fn run(&self, stages: &[Stage]) -> Result<VerificationPass> {
        if stages.is_empty() {
            return Err(EngineError::InvalidStage("no stages configured".to_string()));
        }
        for stage in stages {
            stage.validate()?;
        }

        let outcomes = if self.parallel {
            join_all(stages.iter().map(|stage| self.run_guarded(stage)))
                .await
                .into_iter()
                .collect::<Result<Vec<_>>>()?
        } else {
            let mut outcomes = Vec::with_capacity(stages.len());
            for stage in stages {
                outcomes.push(self.run_guarded(stage).await?);
            }
            outcomes
        };

        let issues = dedupe(
            outcomes
                .iter()
                .flat_map(|outcome| self.classifier.classify(outcome))
                .collect(),
        );

        Ok(VerificationPass { outcomes, issues })
    }

    async fn run_guarded(&self, stage: &Stage) -> Result<StageOutcome> {
        AssertUnwindSafe(self.runner.run(stage, self.timeout))
            .catch_unwind()
            .await
            .map_err(|_| EngineError::StageTask(format!("runner panicked on stage '{}'", stage.name)))
    }
}

/// Drop repeated `(stage, file, line, message)` keys, keeping the first.
pub fn dedupe(issues: Vec<Issue>) -> Vec<Issue> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(issues.len());
    for issue in &issues {
        if seen.insert(issue.dedup_key()) {
            unique.push(issue.clone());
        }
    }
    unique
}
