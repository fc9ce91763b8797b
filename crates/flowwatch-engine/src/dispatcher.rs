//! Event dispatcher.
//!
//! A single consumer pulls raw messages in arrival order, decodes them and
//! hands each started/finalized event to its own task. A started event
//! for a root flow is applied before the next message is pulled, so the
//! flow's reset always precedes its descendants' events.

use crate::causality::CausalityResolver;
use crate::metrics::DispatchMetrics;
use crate::store::FlowStore;
use crate::task::{EventTask, Outcome, StatusRule};
use flowwatch_core::events::Envelope;
use flowwatch_core::{Error, EventKind, RawEvent, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Default bound on concurrently running event tasks.
pub const DEFAULT_MAX_CONCURRENT_EVENTS: usize = 64;

#[derive(Debug)]
enum Inbound {
    Message(String),
    Stop,
}

/// Producer side of a dispatcher's inbound queue.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    name: String,
    tx: mpsc::UnboundedSender<Inbound>,
    stopped: Arc<AtomicBool>,
}

impl DispatcherHandle {
    /// Enqueue a raw message.
    pub fn submit(&self, message: String) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::Stopped(self.name.clone()));
        }
        self.tx
            .send(Inbound::Message(message))
            .map_err(|_| Error::Stopped(self.name.clone()))
    }

    /// Ask the dispatcher to exit once the messages queued so far are
    /// handled. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Inbound::Stop);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

type TaskResult = std::result::Result<Result<Outcome>, JoinError>;

/// Consumer side: classifies messages and runs event tasks.
pub struct Dispatcher {
    name: String,
    resolver: Arc<CausalityResolver>,
    store: Arc<FlowStore>,
    permits: Arc<Semaphore>,
    metrics: Arc<DispatchMetrics>,
    rx: mpsc::UnboundedReceiver<Inbound>,
}

impl Dispatcher {
    pub fn new(
        name: impl Into<String>,
        resolver: Arc<CausalityResolver>,
        store: Arc<FlowStore>,
        max_concurrent: usize,
    ) -> (Self, DispatcherHandle) {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = DispatcherHandle {
            name: name.clone(),
            tx,
            stopped: Arc::new(AtomicBool::new(false)),
        };
        let dispatcher = Self {
            name,
            resolver,
            store,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            metrics: DispatchMetrics::new(),
            rx,
        };
        (dispatcher, handle)
    }

    /// Report into shared counters instead of private ones.
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Consume until stopped or until every handle is dropped, then wait
    /// for in-flight tasks.
    pub async fn run(mut self) {
        info!(server = %self.name, "Event dispatcher started");
        let mut tasks: JoinSet<Result<Outcome>> = JoinSet::new();

        while let Some(inbound) = self.rx.recv().await {
            let message = match inbound {
                Inbound::Message(message) => message,
                Inbound::Stop => break,
            };
            self.metrics.record_receive();
            self.dispatch(message, &mut tasks).await;

            while let Some(done) = tasks.try_join_next() {
                self.reap(done);
            }
        }

        debug!(server = %self.name, pending = tasks.len(), "Draining event tasks");
        while let Some(done) = tasks.join_next().await {
            self.reap(done);
        }
        info!(server = %self.name, "Event dispatcher stopped");
    }

    async fn dispatch(&self, message: String, tasks: &mut JoinSet<Result<Outcome>>) {
        let event = match decode(&message) {
            Ok(Some(event)) => event,
            Ok(None) => {
                self.metrics.record_discard();
                return;
            }
            Err(e) => {
                error!(server = %self.name, error = %e, "Dropping malformed message");
                self.metrics.record_malformed();
                return;
            }
        };

        let task = match EventTask::from_event(event) {
            Ok(Some(task)) => task,
            Ok(None) => {
                self.metrics.record_discard();
                return;
            }
            Err(e) => {
                error!(server = %self.name, error = %e, "Failed to create event task");
                self.metrics.record_failure();
                return;
            }
        };

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!(server = %self.name, "Event task semaphore closed");
                return;
            }
        };
        self.metrics.record_dispatch();

        let resolver = Arc::clone(&self.resolver);
        let store = Arc::clone(&self.store);

        if task.rule() == StatusRule::Finalized {
            tasks.spawn(async move {
                let _permit = permit;
                task.run(&resolver, &store).await
            });
            return;
        }

        let classification = match task.classify(&resolver).await {
            Ok(classification) => classification,
            Err(e) => {
                error!(server = %self.name, name = %task.name(), error = %e, "Failed to resolve causes");
                self.metrics.record_failure();
                return;
            }
        };

        if classification.is_root_flow() {
            debug!(flow = %task.name(), "Waiting for root flow reset");
            let reset = tokio::spawn(async move {
                let _permit = permit;
                Ok::<_, Error>(task.apply(&classification, &store).await)
            });
            self.reap(reset.await);
        } else {
            tasks.spawn(async move {
                let _permit = permit;
                Ok(task.apply(&classification, &store).await)
            });
        }
    }

    fn reap(&self, done: TaskResult) {
        match done {
            Ok(Ok(outcome)) => self.metrics.record_outcome(outcome),
            Ok(Err(e)) => {
                error!(server = %self.name, error = %e, "Event task failed");
                self.metrics.record_failure();
            }
            Err(e) => {
                error!(server = %self.name, error = %e, "Event task aborted");
                self.metrics.record_failure();
            }
        }
    }
}

/// Decode a transport message. `None` for events that carry no update.
fn decode(message: &str) -> Result<Option<RawEvent>> {
    let envelope = Envelope::parse(message)?;
    match EventKind::from_topic(envelope.topic) {
        Some(EventKind::Completed) => {
            debug!("Discarding completed event");
            Ok(None)
        }
        Some(kind) => RawEvent::from_payload(kind, envelope.payload).map(Some),
        None => {
            warn!(topic = %envelope.topic, "Ignoring unknown event kind");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCi;
    use flowwatch_topology::Loader;

    const FLOWS: &str = r#"
flows:
  - name: release
    jobs:
      - serial:
          - name: build
"#;

    fn dispatcher() -> (Dispatcher, DispatcherHandle, Arc<FlowStore>) {
        let store = Arc::new(FlowStore::new(Loader::from_yaml(FLOWS).unwrap().load()));
        let resolver = Arc::new(CausalityResolver::new(Arc::new(FakeCi::new().flow("release"))));
        let (dispatcher, handle) = Dispatcher::new("test", resolver, Arc::clone(&store), 4);
        (dispatcher, handle, store)
    }

    #[test]
    fn test_decode() {
        assert!(decode("garbage").is_err());
        assert!(decode("onStarted {not json}").is_err());
        assert_eq!(decode(r#"onCompleted {"name":"x","build":{"number":1}}"#).unwrap(), None);
        assert_eq!(decode(r#"onDeleted {"name":"x","build":{"number":1}}"#).unwrap(), None);

        let event = decode(r#"onStarted {"name":"x","build":{"number":1}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventKind::Started);
        assert_eq!(event.name, "x");
    }

    #[tokio::test]
    async fn test_bad_messages_do_not_stop_the_loop() {
        let (dispatcher, handle, store) = dispatcher();
        let metrics = dispatcher.metrics();

        handle.submit("not an event".to_string()).unwrap();
        handle
            .submit(r#"onFinalized {"name":"release","build":{"number":1,"status":"BOGUS"}}"#.to_string())
            .unwrap();
        handle
            .submit(r#"onCompleted {"name":"release","build":{"number":1}}"#.to_string())
            .unwrap();
        handle
            .submit(r#"onStarted {"name":"release","build":{"number":2}}"#.to_string())
            .unwrap();
        handle.stop();
        dispatcher.run().await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.received, 4);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.discarded, 1);
        assert_eq!(snapshot.updated, 1);

        let flow = store.snapshot("release").await.unwrap();
        assert_eq!(flow.build_number(), Some(2));
    }

    #[tokio::test]
    async fn test_submit_after_stop_fails() {
        let (_dispatcher, handle, _store) = dispatcher();
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(matches!(
            handle.submit("onStarted {}".to_string()),
            Err(Error::Stopped(_))
        ));
    }

    #[tokio::test]
    async fn test_exits_when_handles_are_dropped() {
        let (dispatcher, handle, _store) = dispatcher();
        drop(handle);
        dispatcher.run().await;
    }
}
