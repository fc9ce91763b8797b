use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Failed to read flow definitions: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse flow definitions: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Job group must be exactly one of `serial` or `parallel` (flow {flow})")]
    InvalidGroup { flow: String },

    #[error("Unknown label flow: {0}")]
    UnknownLabel(String),

    #[error("Label flow {0} includes itself")]
    LabelCycle(String),

    #[error("Label flow {label} has {groups} job groups, exactly one is supported")]
    UnsupportedLabel { label: String, groups: usize },

    #[error("Cycle detected in render map")]
    CycleDetected,
}

impl From<TopologyError> for flowwatch_core::Error {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::Io(e) => flowwatch_core::Error::Io(e),
            other => flowwatch_core::Error::InvalidTopology(other.to_string()),
        }
    }
}
