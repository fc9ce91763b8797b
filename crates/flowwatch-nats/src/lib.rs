//! NATS event transport for Flowwatch.
//!
//! The CI server publishes `<topic> <json>` text messages; this crate
//! subscribes to them and exposes them as a
//! [`MessageSource`](flowwatch_core::ports::MessageSource).

pub mod config;
pub mod health;
pub mod metrics;
mod source;

pub use config::NatsSourceConfig;
pub use health::{HealthCheck, HealthStatus};
pub use metrics::{MetricsSnapshot, SourceMetrics};
pub use source::NatsMessageSource;
