//! Process-wide atomic counters for engine observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] at the end of an invocation to emit them as a single
//! `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters. No allocations, no locking.
pub struct Metrics {
    stages_run: AtomicU64,
    stage_timeouts: AtomicU64,
    fix_attempts: AtomicU64,
    fixes_verified: AtomicU64,
    gate_blocks: AtomicU64,
    gate_fail_opens: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            stages_run: AtomicU64::new(0),
            stage_timeouts: AtomicU64::new(0),
            fix_attempts: AtomicU64::new(0),
            fixes_verified: AtomicU64::new(0),
            gate_blocks: AtomicU64::new(0),
            gate_fail_opens: AtomicU64::new(0),
        }
    }

    pub fn inc_stages_run(&self) {
        self.stages_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stages_run", "counter incremented");
    }

    pub fn inc_stage_timeouts(&self) {
        self.stage_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stage_timeouts", "counter incremented");
    }

    pub fn inc_fix_attempts(&self) {
        self.fix_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fix_attempts", "counter incremented");
    }

    /// Add `n` fixes confirmed by re-verification.
    pub fn add_fixes_verified(&self, n: u64) {
        self.fixes_verified.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "fixes_verified", n, "counter incremented");
    }

    pub fn inc_gate_blocks(&self) {
        self.gate_blocks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_blocks", "counter incremented");
    }

    pub fn inc_gate_fail_opens(&self) {
        self.gate_fail_opens.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_fail_opens", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            stages_run = self.stages_run(),
            stage_timeouts = self.stage_timeouts(),
            fix_attempts = self.fix_attempts(),
            fixes_verified = self.fixes_verified(),
            gate_blocks = self.gate_blocks(),
            gate_fail_opens = self.gate_fail_opens(),
        );
    }

    pub fn stages_run(&self) -> u64 {
        self.stages_run.load(Ordering::Relaxed)
    }

    pub fn stage_timeouts(&self) -> u64 {
        self.stage_timeouts.load(Ordering::Relaxed)
    }

    pub fn fix_attempts(&self) -> u64 {
        self.fix_attempts.load(Ordering::Relaxed)
    }

    pub fn fixes_verified(&self) -> u64 {
        self.fixes_verified.load(Ordering::Relaxed)
    }

    pub fn gate_blocks(&self) -> u64 {
        self.gate_blocks.load(Ordering::Relaxed)
    }

    pub fn gate_fail_opens(&self) -> u64 {
        self.gate_fail_opens.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.stages_run.store(0, Ordering::Relaxed);
        self.stage_timeouts.store(0, Ordering::Relaxed);
        self.fix_attempts.store(0, Ordering::Relaxed);
        self.fixes_verified.store(0, Ordering::Relaxed);
        self.gate_blocks.store(0, Ordering::Relaxed);
        self.gate_fail_opens.store(0, Ordering::Relaxed);
    }
}
