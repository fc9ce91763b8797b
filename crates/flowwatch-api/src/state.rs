//! Application state shared across handlers.

use flowwatch_engine::Watcher;
use std::sync::Arc;

/// The watched servers, in configuration order.
#[derive(Clone)]
pub struct AppState {
    pub watchers: Vec<Arc<Watcher>>,
}

impl AppState {
    pub fn new(watchers: Vec<Arc<Watcher>>) -> Self {
        Self { watchers }
    }

    pub fn watcher(&self, server: &str) -> Option<&Arc<Watcher>> {
        self.watchers.iter().find(|w| w.info().name == server)
    }
}
