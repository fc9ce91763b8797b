//! Configuration for the NATS message source.

use std::time::Duration;

/// Configuration for one NATS subscription.
#[derive(Debug, Clone)]
pub struct NatsSourceConfig {
    /// NATS server URLs (several for a cluster).
    pub urls: Vec<String>,
    /// Subject to subscribe to; `>` receives every subject.
    pub subject: String,
    /// Maximum reconnection attempts, unlimited when `None`.
    pub max_reconnect_attempts: Option<usize>,
    /// Connection timeout.
    pub connection_timeout: Duration,
}

impl Default for NatsSourceConfig {
    fn default() -> Self {
        Self {
            urls: vec!["nats://localhost:4222".to_string()],
            subject: ">".to_string(),
            max_reconnect_attempts: None,
            connection_timeout: Duration::from_secs(10),
        }
    }
}

impl NatsSourceConfig {
    /// Create a config for a URL. A comma separated list is split into
    /// cluster members.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            urls: url
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_max_reconnects(mut self, max: usize) -> Self {
        self.max_reconnect_attempts = Some(max);
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Server list in the form the client expects.
    pub fn server_list(&self) -> String {
        self.urls.join(",")
    }
}
