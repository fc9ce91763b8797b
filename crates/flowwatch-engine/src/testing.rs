//! In-memory collaborators.
//!
//! [`FakeCi`] answers CI queries from a fixed table and [`ChannelSource`]
//! delivers messages pushed through a channel. Both are used by the engine
//! scenarios and by the API tests.

use async_trait::async_trait;
use flowwatch_core::ports::{BuildCause, CiClient, MessageSource, MessageStream};
use flowwatch_core::{Error, Result};
use futures::StreamExt;
use futures::channel::mpsc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// CI server answering from a fixed table.
///
/// Names not registered with [`FakeCi::flow`] are plain jobs. Builds with no
/// registered cause report none.
#[derive(Debug, Default)]
pub struct FakeCi {
    flows: BTreeSet<String>,
    causes: BTreeMap<(String, u64), Vec<BuildCause>>,
    failing: BTreeSet<String>,
    flow_type_queries: AtomicUsize,
}

impl FakeCi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flow(mut self, name: impl Into<String>) -> Self {
        self.flows.insert(name.into());
        self
    }

    /// Add one cause to a build. Repeated calls add more causes.
    pub fn cause(mut self, job: impl Into<String>, build: u64, cause: BuildCause) -> Self {
        self.causes.entry((job.into(), build)).or_default().push(cause);
        self
    }

    /// Every query about `name` fails.
    pub fn failing(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Number of flow-type queries answered so far.
    pub fn flow_type_queries(&self) -> usize {
        self.flow_type_queries.load(Ordering::Relaxed)
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.failing.contains(name) {
            return Err(Error::CiClient(format!("{name} is unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl CiClient for FakeCi {
    async fn is_job_type(&self, name: &str) -> Result<bool> {
        self.check(name)?;
        Ok(!self.flows.contains(name))
    }

    async fn is_flow_type(&self, name: &str) -> Result<bool> {
        self.flow_type_queries.fetch_add(1, Ordering::Relaxed);
        self.check(name)?;
        Ok(self.flows.contains(name))
    }

    async fn immediate_causes(&self, job: &str, build: u64) -> Result<Vec<BuildCause>> {
        self.check(job)?;
        Ok(self
            .causes
            .get(&(job.to_string(), build))
            .cloned()
            .unwrap_or_default())
    }
}

/// Message source fed through a channel.
///
/// The stream ends when every sender is dropped.
pub struct ChannelSource {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    closed: AtomicBool,
}

impl ChannelSource {
    pub fn new() -> (Self, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded();
        let source = Self {
            receiver: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
        };
        (source, tx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    fn endpoint(&self) -> String {
        "memory://channel".to_string()
    }

    async fn subscribe(&self) -> Result<MessageStream> {
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Transport("channel already subscribed".to_string()))?;
        Ok(receiver.map(Ok).boxed())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
