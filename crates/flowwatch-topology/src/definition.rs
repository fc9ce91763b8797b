//! Flow definition file types.
//!
//! ```yaml
//! flows:
//!   - name: checks
//!     label: true
//!     jobs:
//!       - parallel:
//!           - name: unit
//!           - name: lint
//!   - name: release
//!     jobs:
//!       - serial:
//!           - name: build
//!             description: Compile everything
//!           - name: checks
//!             label: true
//!       - serial:
//!           - name: deploy
//!             identifier:
//!               ENV: prod
//! ```

use crate::error::TopologyError;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowsFile {
    #[serde(default)]
    pub flows: Vec<FlowSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowSpec {
    pub name: String,
    #[serde(default)]
    pub label: bool,
    #[serde(default)]
    pub jobs: Vec<GroupSpec>,
}

/// One entry of a flow's job list: a serial or a parallel group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub serial: Option<Vec<JobSpec>>,
    #[serde(default)]
    pub parallel: Option<Vec<JobSpec>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Serial,
    Parallel,
}

impl GroupSpec {
    pub fn serial(jobs: Vec<JobSpec>) -> Self {
        Self {
            serial: Some(jobs),
            parallel: None,
        }
    }

    pub fn parallel(jobs: Vec<JobSpec>) -> Self {
        Self {
            serial: None,
            parallel: Some(jobs),
        }
    }

    /// The group's kind and members.
    pub fn members(&self, flow: &str) -> Result<(GroupKind, &[JobSpec]), TopologyError> {
        match (&self.serial, &self.parallel) {
            (Some(jobs), None) => Ok((GroupKind::Serial, jobs)),
            (None, Some(jobs)) => Ok((GroupKind::Parallel, jobs)),
            _ => Err(TopologyError::InvalidGroup {
                flow: flow.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// When set, `name` refers to a label flow to inline here.
    #[serde(default)]
    pub label: bool,
    #[serde(default)]
    pub identifier: Option<BTreeMap<String, String>>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            label: false,
            identifier: None,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self {
            label: true,
            ..Self::new(name)
        }
    }
}
