//! Event transport listener.

use crate::dispatcher::DispatcherHandle;
use flowwatch_core::Result;
use flowwatch_core::ports::MessageSource;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Forwards transport messages, in arrival order, to a dispatcher.
pub struct Listener {
    source: Arc<dyn MessageSource>,
    dispatcher: DispatcherHandle,
    listening: Arc<AtomicBool>,
}

impl Listener {
    pub fn new(source: Arc<dyn MessageSource>, dispatcher: DispatcherHandle) -> Self {
        Self {
            source,
            dispatcher,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report subscription state through a shared flag.
    pub fn with_status(mut self, listening: Arc<AtomicBool>) -> Self {
        self.listening = listening;
        self
    }

    /// Whether the transport subscription is live.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Receive until shutdown, end of stream, or the dispatcher stopping.
    ///
    /// A subscribe failure is returned to the caller. The transport is
    /// closed on every other exit path.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let endpoint = self.source.endpoint();
        let mut messages = self.source.subscribe().await?;
        self.listening.store(true, Ordering::SeqCst);
        info!(endpoint = %endpoint, "Listening for CI events");

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!(endpoint = %endpoint, "Listener shutting down");
                            break;
                        }
                    }
                    next = messages.next() => match next {
                        Some(Ok(message)) => {
                            debug!(endpoint = %endpoint, bytes = message.len(), "Received message");
                            if let Err(e) = self.dispatcher.submit(message) {
                                warn!(endpoint = %endpoint, error = %e, "Dispatcher is gone");
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(endpoint = %endpoint, error = %e, "Failed to receive message");
                        }
                        None => {
                            info!(endpoint = %endpoint, "Event stream ended");
                            break;
                        }
                    }
                }
            }
        }

        self.listening.store(false, Ordering::SeqCst);
        if let Err(e) = self.source.close().await {
            warn!(endpoint = %endpoint, error = %e, "Failed to close transport");
        }
        Ok(())
    }
}
