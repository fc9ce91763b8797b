//! One watched CI server: listener, dispatcher and status store.

use crate::causality::CausalityResolver;
use crate::config::ServerInfo;
use crate::dispatcher::Dispatcher;
use crate::listener::Listener;
use crate::metrics::DispatchMetrics;
use crate::store::FlowStore;
use flowwatch_core::Result;
use flowwatch_core::ports::{CiClient, MessageSource};
use flowwatch_topology::Topology;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{error, info};

pub struct Watcher {
    info: ServerInfo,
    store: Arc<FlowStore>,
    resolver: Arc<CausalityResolver>,
    source: Arc<dyn MessageSource>,
    metrics: Arc<DispatchMetrics>,
    max_concurrent_events: usize,
    listening: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Watcher {
    pub fn new(
        info: ServerInfo,
        topology: Topology,
        client: Arc<dyn CiClient>,
        source: Arc<dyn MessageSource>,
        max_concurrent_events: usize,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            info,
            store: Arc::new(FlowStore::new(topology)),
            resolver: Arc::new(CausalityResolver::new(client)),
            source,
            metrics: DispatchMetrics::new(),
            max_concurrent_events,
            listening: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn store(&self) -> &Arc<FlowStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Whether the transport subscription is currently live.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Run until [`Watcher::stop`] or the end of the event stream.
    ///
    /// Queued events are drained before returning. A transport failure is
    /// returned after the dispatcher has been stopped.
    pub async fn run(&self) -> Result<()> {
        info!(server = %self.info.name, url = %self.info.url, "Starting watcher");

        let (dispatcher, handle) = Dispatcher::new(
            self.info.name.clone(),
            Arc::clone(&self.resolver),
            Arc::clone(&self.store),
            self.max_concurrent_events,
        );
        let worker = tokio::spawn(dispatcher.with_metrics(Arc::clone(&self.metrics)).run());

        let listener = Listener::new(Arc::clone(&self.source), handle.clone())
            .with_status(Arc::clone(&self.listening));
        let result = listener.run(self.shutdown_rx.clone()).await;
        if let Err(e) = &result {
            error!(server = %self.info.name, error = %e, "Listener failed");
        }

        handle.stop();
        if let Err(e) = worker.await {
            error!(server = %self.info.name, error = %e, "Dispatcher aborted");
        }
        info!(server = %self.info.name, "Watcher stopped");
        result
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ChannelSource, FakeCi};
    use flowwatch_core::BuildStatus;
    use flowwatch_core::ports::BuildCause;
    use flowwatch_topology::Loader;

    fn info() -> ServerInfo {
        ServerInfo {
            name: "main".to_string(),
            url: "http://ci.local".to_string(),
            description: "Main".to_string(),
        }
    }

    #[tokio::test]
    async fn test_events_reach_the_store() {
        let topology = Loader::from_yaml(
            r#"
flows:
  - name: release
    jobs:
      - serial:
          - name: build
"#,
        )
        .unwrap()
        .load();
        let ci = FakeCi::new()
            .flow("release")
            .cause("build", 3, BuildCause::upstream("release", 1));
        let (source, feed) = ChannelSource::new();
        let watcher = Watcher::new(info(), topology, Arc::new(ci), Arc::new(source), 4);

        feed.unbounded_send(r#"onStarted {"name":"release","build":{"number":1}}"#.to_string())
            .unwrap();
        feed.unbounded_send(
            r#"onFinalized {"name":"build","build":{"number":3,"status":"FAILURE"}}"#.to_string(),
        )
        .unwrap();
        drop(feed);

        assert!(!watcher.is_listening());
        watcher.run().await.unwrap();
        assert!(!watcher.is_listening());

        let rendered = watcher.store().render("release").await.unwrap();
        let build = rendered.jobs["build#0"].state.as_ref().unwrap();
        assert_eq!(build.status, BuildStatus::Failure);
        assert_eq!(watcher.metrics().snapshot().updated, 2);
    }

    #[tokio::test]
    async fn test_stop_ends_run() {
        let (source, _feed) = ChannelSource::new();
        let watcher = Arc::new(Watcher::new(
            info(),
            Topology::default(),
            Arc::new(FakeCi::new()),
            Arc::new(source),
            4,
        ));

        let running = tokio::spawn({
            let watcher = Arc::clone(&watcher);
            async move { watcher.run().await }
        });
        watcher.stop();
        running.await.unwrap().unwrap();
    }
}
