//! Resolved flow topology.
//!
//! A [`Flow`] owns a tree of [`JobNode`]s. Serial nodes are ordered, parallel
//! nodes are unordered, and leaves are [`Job`]s. The tree shape is fixed once
//! the topology is loaded; only the [`RunState`] of flows and jobs changes.

use crate::build::RunState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A leaf work unit inside a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique rendering key within the owning flow.
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Parameters a triggered build must carry to be this job instance.
    #[serde(default)]
    pub identifier: Option<BTreeMap<String, String>>,
    /// Label flow this job was inlined from.
    #[serde(default)]
    pub labeled_by: Option<String>,
    /// Rendering keys of the jobs drawn before this one.
    #[serde(default)]
    pub previous: BTreeSet<String>,
    #[serde(default)]
    pub state: Option<RunState>,
}

impl Job {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: None,
            identifier: None,
            labeled_by: None,
            previous: BTreeSet::new(),
            state: None,
        }
    }

    /// Whether a build triggered with `parameters` is this job instance.
    ///
    /// A job without an identifier accepts any build. Otherwise every
    /// identifier entry must be present in the parameters with the same value.
    pub fn accepts(&self, parameters: Option<&BTreeMap<String, String>>) -> bool {
        let Some(identifier) = &self.identifier else {
            return true;
        };
        let Some(parameters) = parameters else {
            return identifier.is_empty();
        };
        identifier
            .iter()
            .all(|(key, value)| parameters.get(key) == Some(value))
    }
}

/// A node of a flow's job tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobNode {
    Serial(Vec<JobNode>),
    Parallel(Vec<JobNode>),
    Job(Job),
}

impl JobNode {
    pub fn is_serial(&self) -> bool {
        matches!(self, JobNode::Serial(_))
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, JobNode::Parallel(_))
    }

    /// All jobs in depth-first topology order.
    pub fn jobs(&self) -> Vec<&Job> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Job>) {
        match self {
            JobNode::Job(job) => out.push(job),
            JobNode::Serial(children) | JobNode::Parallel(children) => {
                for child in children {
                    child.collect(out);
                }
            }
        }
    }

    /// All jobs in depth-first topology order, mutably.
    pub fn jobs_mut(&mut self) -> Vec<&mut Job> {
        let mut out = Vec::new();
        self.collect_mut(&mut out);
        out
    }

    fn collect_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Job>) {
        match self {
            JobNode::Job(job) => out.push(job),
            JobNode::Serial(children) | JobNode::Parallel(children) => {
                for child in children {
                    child.collect_mut(out);
                }
            }
        }
    }
}

/// A named pipeline tracked as a unit of status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    /// Resolved job tree; `None` when label substitution failed for this flow.
    pub jobs: Option<JobNode>,
    #[serde(default)]
    pub state: Option<RunState>,
}

impl Flow {
    pub fn new(name: impl Into<String>, jobs: Option<JobNode>) -> Self {
        Self {
            name: name.into(),
            jobs,
            state: None,
        }
    }

    /// Build number currently recorded for the flow, if any.
    pub fn build_number(&self) -> Option<u64> {
        self.state.as_ref().map(RunState::number)
    }

    /// Jobs named `name`, in topology order.
    pub fn find_jobs_mut(&mut self, name: &str) -> Vec<&mut Job> {
        match self.jobs.as_mut() {
            Some(root) => root
                .jobs_mut()
                .into_iter()
                .filter(|job| job.name == name)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Clear the flow's own state and that of every job in its tree.
    pub fn reset(&mut self) {
        self.state = None;
        if let Some(root) = self.jobs.as_mut() {
            for job in root.jobs_mut() {
                job.state = None;
            }
        }
    }
}
