//! NATS subscription delivering CI lifecycle messages.

use async_trait::async_trait;
use flowwatch_core::ports::{MessageSource, MessageStream};
use flowwatch_core::{Error, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::NatsSourceConfig;
use crate::health::HealthCheck;
use crate::metrics::SourceMetrics;

/// Core NATS subscriber. The connection is opened on subscribe, so a
/// connect failure surfaces to whoever runs the listener.
pub struct NatsMessageSource {
    config: NatsSourceConfig,
    client: RwLock<Option<async_nats::Client>>,
    metrics: Arc<SourceMetrics>,
    shutdown: AtomicBool,
}

impl NatsMessageSource {
    pub fn new(config: NatsSourceConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
            metrics: SourceMetrics::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &NatsSourceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }

    pub async fn is_connected(&self) -> bool {
        match self.client.read().await.as_ref() {
            Some(client) => {
                client.connection_state() == async_nats::connection::State::Connected
            }
            None => false,
        }
    }

    pub async fn health_check(&self) -> HealthCheck {
        HealthCheck::from_metrics(&self.metrics, self.is_connected().await)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<async_nats::Client> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let servers = self.config.server_list();
        info!("Connecting to NATS at {}", servers);

        let mut options = async_nats::ConnectOptions::new()
            .connection_timeout(self.config.connection_timeout);
        if let Some(max) = self.config.max_reconnect_attempts {
            options = options.max_reconnects(max);
        }

        let client = options
            .connect(&servers)
            .await
            .map_err(|e| Error::Transport(format!("Failed to connect to NATS: {}", e)))?;

        self.metrics.set_connected(true);
        *self.client.write().await = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl MessageSource for NatsMessageSource {
    fn endpoint(&self) -> String {
        format!("{} [{}]", self.config.server_list(), self.config.subject)
    }

    async fn subscribe(&self) -> Result<MessageStream> {
        if self.is_shutdown() {
            return Err(Error::Transport(
                "Cannot subscribe: source is closed".to_string(),
            ));
        }

        let client = self.connect().await?;
        debug!("Subscribing to subject: {}", self.config.subject);

        let subscriber = client
            .subscribe(self.config.subject.clone())
            .await
            .map_err(|e| Error::Transport(format!("Failed to subscribe: {}", e)))?;

        let metrics = Arc::clone(&self.metrics);
        let stream = subscriber.map(move |message| {
            metrics.record_receive(message.payload.len() as u64);
            decode(&message.payload).inspect_err(|e| {
                warn!(subject = %message.subject, error = %e, "Dropping undecodable message");
                metrics.record_decode_failure();
            })
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing NATS subscription");
        self.shutdown.store(true, Ordering::SeqCst);

        let client = self.client.write().await.take();
        if let Some(client) = client {
            if let Err(e) = client.drain().await {
                error!("Error draining NATS connection: {}", e);
            }
        }

        self.metrics.set_connected(false);
        Ok(())
    }
}

/// Messages are UTF-8 text.
fn decode(payload: &[u8]) -> Result<String> {
    std::str::from_utf8(payload)
        .map(str::to_string)
        .map_err(|e| Error::Transport(format!("Message is not UTF-8: {}", e)))
}
