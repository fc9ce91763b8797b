//! Metrics for the NATS message source.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Total messages received.
    pub messages_received: AtomicU64,
    /// Total bytes received.
    pub bytes_received: AtomicU64,
    /// Messages dropped because the payload was not UTF-8.
    pub decode_failures: AtomicU64,
    /// Current connection state (0 = disconnected, 1 = connected).
    pub connected: AtomicU64,
}

impl SourceMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_receive(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            connected: self.connected.load(Ordering::Relaxed) == 1,
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub bytes_received: u64,
    pub decode_failures: u64,
    pub connected: bool,
}
