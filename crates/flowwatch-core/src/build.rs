//! Build references, statuses and upstream causes.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A build as reported by the CI server in an event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    pub number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
}

impl BuildRef {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            status: None,
            parameters: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Tracked status of a flow or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Running,
    Success,
    Failure,
    Aborted,
}

impl BuildStatus {
    /// Map a raw CI result (`SUCCESS`, `FAILURE`, `ABORTED`) to a status.
    pub fn from_raw(raw: &str) -> Result<Self> {
        match raw {
            "SUCCESS" => Ok(BuildStatus::Success),
            "FAILURE" => Ok(BuildStatus::Failure),
            "ABORTED" => Ok(BuildStatus::Aborted),
            other => Err(Error::UnknownBuildStatus(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
            BuildStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The build/status pair recorded for a flow or job.
///
/// Both halves always come from the same event: the pair is replaced as a
/// whole, never field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub build: BuildRef,
    pub status: BuildStatus,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(build: BuildRef, status: BuildStatus) -> Self {
        Self {
            build,
            status,
            updated_at: Utc::now(),
        }
    }

    pub fn number(&self) -> u64 {
        self.build.number
    }
}

/// The build that triggered another build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpstreamCause {
    pub project: String,
    pub build: u64,
}

impl UpstreamCause {
    pub fn new(project: impl Into<String>, build: u64) -> Self {
        Self {
            project: project.into(),
            build,
        }
    }
}

impl fmt::Display for UpstreamCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.build)
    }
}
