//! Health check for the NATS message source.

use crate::metrics::SourceMetrics;
use serde::Serialize;
use std::sync::Arc;

/// Health status of the NATS subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Connected, but some messages could not be decoded.
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded { .. })
    }
}

/// Health check result with details.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub connected: bool,
    pub messages_received: u64,
    pub decode_failures: u64,
}

impl HealthCheck {
    pub fn from_metrics(metrics: &Arc<SourceMetrics>, connected: bool) -> Self {
        let snapshot = metrics.snapshot();

        let status = if !connected {
            HealthStatus::Unhealthy {
                reason: "Not connected to NATS".to_string(),
            }
        } else if snapshot.decode_failures > 0 {
            HealthStatus::Degraded {
                reason: format!("{} undecodable messages dropped", snapshot.decode_failures),
            }
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            connected,
            messages_received: snapshot.messages_received,
            decode_failures: snapshot.decode_failures,
        }
    }
}
