//! Guarded flow/job status store.
//!
//! The topology shape is fixed at load time. Each flow sits behind its own
//! read-write lock: writers hold it across the staleness check and the
//! mutation, readers take copies.

use flowwatch_core::{Flow, RunState};
use flowwatch_topology::{RenderMap, Topology};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::{RwLock, RwLockWriteGuard};

/// Status store for the flows of one CI server.
#[derive(Debug, Default)]
pub struct FlowStore {
    flows: BTreeMap<String, RwLock<Flow>>,
    maps: BTreeMap<String, RenderMap>,
    unresolved: BTreeMap<String, String>,
}

impl FlowStore {
    pub fn new(topology: Topology) -> Self {
        Self {
            flows: topology
                .flows
                .into_iter()
                .map(|(name, flow)| (name, RwLock::new(flow)))
                .collect(),
            maps: topology.maps,
            unresolved: topology.unresolved,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flows.contains_key(name)
    }

    pub fn flow_names(&self) -> Vec<String> {
        self.flows.keys().cloned().collect()
    }

    /// Take the mutation guard of one flow.
    pub async fn write(&self, name: &str) -> Option<RwLockWriteGuard<'_, Flow>> {
        match self.flows.get(name) {
            Some(lock) => Some(lock.write().await),
            None => None,
        }
    }

    /// Copy of a flow's current tree and status.
    pub async fn snapshot(&self, name: &str) -> Option<Flow> {
        match self.flows.get(name) {
            Some(lock) => Some(lock.read().await.clone()),
            None => None,
        }
    }

    /// Flows left without a job tree, with the reason.
    pub fn unresolved(&self) -> &BTreeMap<String, String> {
        &self.unresolved
    }

    pub fn render_map(&self, name: &str) -> Option<&RenderMap> {
        self.maps.get(name)
    }

    /// Render map joined with live status, for presentation. A flow
    /// without a render map renders with no jobs.
    pub async fn render(&self, name: &str) -> Option<RenderedFlow> {
        let flow = self.snapshot(name).await?;
        let Some(map) = self.maps.get(name) else {
            return Some(RenderedFlow {
                name: flow.name,
                state: flow.state,
                jobs: BTreeMap::new(),
            });
        };

        let states: BTreeMap<String, Option<RunState>> = flow
            .jobs
            .as_ref()
            .map(|root| {
                root.jobs()
                    .into_iter()
                    .map(|job| (job.key.clone(), job.state.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let jobs = map
            .nodes()
            .map(|node| RenderedJob {
                key: node.key.clone(),
                name: node.name.clone(),
                description: node.description.clone(),
                labeled_by: node.labeled_by.clone(),
                previous: node.previous.clone(),
                state: states.get(&node.key).cloned().flatten(),
            })
            .map(|job| (job.key.clone(), job))
            .collect();

        Some(RenderedFlow {
            name: flow.name,
            state: flow.state,
            jobs,
        })
    }
}

/// A flow as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedFlow {
    pub name: String,
    pub state: Option<RunState>,
    pub jobs: BTreeMap<String, RenderedJob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedJob {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub labeled_by: Option<String>,
    pub previous: BTreeSet<String>,
    pub state: Option<RunState>,
}
