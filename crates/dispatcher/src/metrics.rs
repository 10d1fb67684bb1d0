//! Dispatch counters for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one engine, shared across concurrent deliveries
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Send attempts, any outcome
    attempts: AtomicU64,
    /// Deliveries that ended in a success
    delivered: AtomicU64,
    /// Deliveries that ran out of identities
    exhausted: AtomicU64,
    /// Rate-limit signals observed
    rate_limited: AtomicU64,
    /// Identities disabled by this engine
    disabled: AtomicU64,
    /// Unknown send errors
    unknown_errors: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn inc_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }

    pub fn inc_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disabled(&self) -> u64 {
        self.disabled.load(Ordering::Relaxed)
    }

    pub fn inc_disabled(&self) {
        self.disabled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_errors(&self) -> u64 {
        self.unknown_errors.load(Ordering::Relaxed)
    }

    pub fn inc_unknown_errors(&self) {
        self.unknown_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts(),
            delivered: self.delivered(),
            exhausted: self.exhausted(),
            rate_limited: self.rate_limited(),
            disabled: self.disabled(),
            unknown_errors: self.unknown_errors(),
        }
    }
}

/// Snapshot of dispatch counters (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub delivered: u64,
    pub exhausted: u64,
    pub rate_limited: u64,
    pub disabled: u64,
    pub unknown_errors: u64,
}
