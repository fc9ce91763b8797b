//! Counters for one dispatcher.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::task::Outcome;

#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Messages pulled from the inbound queue.
    pub received: AtomicU64,
    /// Messages failing the envelope or payload format.
    pub malformed: AtomicU64,
    /// Completed or unknown-kind events.
    pub discarded: AtomicU64,
    /// Tasks spawned for started/finalized events.
    pub dispatched: AtomicU64,
    pub updated: AtomicU64,
    pub stale: AtomicU64,
    /// Events that touched no flow (untracked, unknown or unmatched).
    pub skipped: AtomicU64,
    /// Tasks that ended with an error.
    pub failed: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_receive(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Updated => &self.updated,
            Outcome::Stale => &self.stale,
            Outcome::Untracked
            | Outcome::UnknownFlow
            | Outcome::NoJobs
            | Outcome::NoMatchingJob => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub malformed: u64,
    pub discarded: u64,
    pub dispatched: u64,
    pub updated: u64,
    pub stale: u64,
    pub skipped: u64,
    pub failed: u64,
}
