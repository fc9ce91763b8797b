//! Event ingestion and flow/job status engine for Flowwatch.
//!
//! Each watched CI server gets a [`Watcher`]: a [`Listener`] forwarding
//! transport messages to a [`Dispatcher`], which runs one [`EventTask`] per
//! started or finalized event against the server's [`FlowStore`].

pub mod causality;
pub mod config;
pub mod dispatcher;
pub mod listener;
pub mod metrics;
pub mod store;
pub mod task;
pub mod testing;
pub mod watcher;

pub use causality::{CausalityResolver, Classification, MAX_ANCESTRY_DEPTH};
pub use config::{ServerConfig, ServerInfo, WatchConfig};
pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use listener::Listener;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use store::{FlowStore, RenderedFlow, RenderedJob};
pub use task::{EventTask, Outcome, StatusRule};
pub use watcher::Watcher;
