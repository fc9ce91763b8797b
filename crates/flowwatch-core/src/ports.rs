//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the status engine and the
//! collaborators it does not own: the CI server and the event transport.

use crate::Result;
use crate::build::UpstreamCause;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Stream of raw transport messages, decoded as UTF-8 text.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A publish/subscribe endpoint delivering CI lifecycle messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Human readable endpoint description for logs.
    fn endpoint(&self) -> String;

    /// Subscribe to every topic. Messages are yielded in arrival order.
    async fn subscribe(&self) -> Result<MessageStream>;

    /// Close the underlying transport.
    async fn close(&self) -> Result<()>;
}

/// One trigger cause of a build, as reported by the CI server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCause {
    #[serde(default)]
    pub upstream_project: Option<String>,
    #[serde(default)]
    pub upstream_build: Option<u64>,
}

impl BuildCause {
    /// A cause without upstream information (manual, timer, SCM...).
    pub fn external() -> Self {
        Self::default()
    }

    pub fn upstream(project: impl Into<String>, build: u64) -> Self {
        Self {
            upstream_project: Some(project.into()),
            upstream_build: Some(build),
        }
    }

    /// The triggering build, when this cause came from another job.
    pub fn as_upstream(&self) -> Option<UpstreamCause> {
        match (&self.upstream_project, self.upstream_build) {
            (Some(project), Some(build)) => Some(UpstreamCause::new(project.clone(), build)),
            _ => None,
        }
    }
}

/// Read-only queries against the CI server.
#[async_trait]
pub trait CiClient: Send + Sync {
    /// Whether `name` is a plain job.
    async fn is_job_type(&self, name: &str) -> Result<bool>;

    /// Whether `name` is a flow (a job orchestrating other jobs).
    async fn is_flow_type(&self, name: &str) -> Result<bool>;

    /// Trigger causes recorded on one build.
    async fn immediate_causes(&self, job: &str, build: u64) -> Result<Vec<BuildCause>>;
}
