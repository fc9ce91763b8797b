//! Causal ancestry of builds.
//!
//! A build's ancestry is the chain of builds that triggered it, from the
//! topmost flow down to the immediate parent. Only the CI server is
//! consulted; no local state is touched apart from the flow-type cache.

use dashmap::DashMap;
use flowwatch_core::ports::CiClient;
use flowwatch_core::{Result, UpstreamCause};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Upper bound on the number of upstream hops followed.
pub const MAX_ANCESTRY_DEPTH: usize = 64;

/// How an event's subject relates to the tracked flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A flow with no upstream trigger: the top of a pipeline run.
    RootFlow,
    /// A flow triggered by another flow.
    Subflow(Vec<UpstreamCause>),
    /// A plain job triggered by a flow.
    Job(Vec<UpstreamCause>),
    /// A plain job without upstream; nothing tracks it.
    Untracked,
}

impl Classification {
    pub fn is_root_flow(&self) -> bool {
        matches!(self, Classification::RootFlow)
    }

    /// Ancestry, topmost first. Empty for root flows and untracked jobs.
    pub fn causes(&self) -> &[UpstreamCause] {
        match self {
            Classification::Subflow(causes) | Classification::Job(causes) => causes,
            Classification::RootFlow | Classification::Untracked => &[],
        }
    }

    /// The outermost build of the run this one belongs to.
    pub fn topmost_upstream(&self) -> Option<&UpstreamCause> {
        self.causes().first()
    }
}

/// Resolves ancestry and flow types through the CI client.
pub struct CausalityResolver {
    client: Arc<dyn CiClient>,
    flow_types: DashMap<String, bool>,
}

impl CausalityResolver {
    pub fn new(client: Arc<dyn CiClient>) -> Self {
        Self {
            client,
            flow_types: DashMap::new(),
        }
    }

    pub fn client(&self) -> &Arc<dyn CiClient> {
        &self.client
    }

    /// Whether `name` is a flow. Cached per name after the first lookup.
    pub async fn is_flow(&self, name: &str) -> Result<bool> {
        if let Some(cached) = self.flow_types.get(name) {
            return Ok(*cached);
        }
        let is_flow = self.client.is_flow_type(name).await?;
        self.flow_types.insert(name.to_string(), is_flow);
        Ok(is_flow)
    }

    /// Ancestry of `job`/`build`, topmost flow first.
    ///
    /// Returns `None` when the build has no upstream, or when its immediate
    /// trigger is ambiguous (several causes). Ambiguity further up truncates
    /// the chain at that point.
    pub async fn root_causes(&self, job: &str, build: u64) -> Result<Option<Vec<UpstreamCause>>> {
        info!(job = %job, build, "Resolving root causes");

        let mut chain: Vec<UpstreamCause> = Vec::new();
        let mut current = (job.to_string(), build);

        while chain.len() < MAX_ANCESTRY_DEPTH {
            let causes = self.client.immediate_causes(&current.0, current.1).await?;

            if causes.len() > 1 {
                error!(
                    job = %current.0,
                    build = current.1,
                    causes = causes.len(),
                    "Multiple causes for build"
                );
                if chain.is_empty() {
                    return Ok(None);
                }
                break;
            }

            match causes.first().and_then(|cause| cause.as_upstream()) {
                Some(upstream) => {
                    debug!(job = %current.0, build = current.1, upstream = %upstream, "Found upstream build");
                    current = (upstream.project.clone(), upstream.build);
                    chain.push(upstream);
                }
                None => break,
            }
        }

        if chain.len() >= MAX_ANCESTRY_DEPTH {
            warn!(job = %job, build, "Ancestry truncated at maximum depth");
        }

        if chain.is_empty() {
            return Ok(None);
        }
        chain.reverse();
        Ok(Some(chain))
    }

    /// Classify the subject of an event.
    pub async fn classify(&self, name: &str, build: u64) -> Result<Classification> {
        let causes = self.root_causes(name, build).await?;
        let is_flow = self.is_flow(name).await?;

        Ok(match (causes, is_flow) {
            (Some(causes), true) => Classification::Subflow(causes),
            (Some(causes), false) => Classification::Job(causes),
            (None, true) => Classification::RootFlow,
            (None, false) => Classification::Untracked,
        })
    }
}
