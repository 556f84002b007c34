//! Global atomic counters for skill executions.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    evaluations_run: AtomicU64,
    async_queries_submitted: AtomicU64,
    results_stored: AtomicU64,
    transactions: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations_run: AtomicU64::new(0),
            async_queries_submitted: AtomicU64::new(0),
            results_stored: AtomicU64::new(0),
            transactions: AtomicU64::new(0),
        }
    }

    pub fn inc_evaluations(&self) {
        self.evaluations_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_run", "counter incremented");
    }

    pub fn inc_async_queries_submitted(&self) {
        self.async_queries_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "async_queries_submitted", "counter incremented");
    }

    pub fn inc_results_stored(&self) {
        self.results_stored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "results_stored", "counter incremented");
    }

    pub fn inc_transactions(&self) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transactions", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations_run = self.evaluations_run(),
            async_queries_submitted = self.async_queries_submitted(),
            results_stored = self.results_stored(),
            transactions = self.transactions(),
        );
    }

    pub fn evaluations_run(&self) -> u64 {
        self.evaluations_run.load(Ordering::Relaxed)
    }

    pub fn async_queries_submitted(&self) -> u64 {
        self.async_queries_submitted.load(Ordering::Relaxed)
    }

    pub fn results_stored(&self) -> u64 {
        self.results_stored.load(Ordering::Relaxed)
    }

    pub fn transactions(&self) -> u64 {
        self.transactions.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.evaluations_run.store(0, Ordering::Relaxed);
        self.async_queries_submitted.store(0, Ordering::Relaxed);
        self.results_stored.store(0, Ordering::Relaxed);
        self.transactions.store(0, Ordering::Relaxed);
    }
}
