//! Error types for Flowwatch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Event errors
    #[error("Malformed event envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown build status: {0}")]
    UnknownBuildStatus(String),

    #[error("Build {0} carries no status")]
    MissingBuildStatus(u64),

    // Topology errors
    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    #[error("Invalid flow definition: {0}")]
    InvalidTopology(String),

    // Collaborator errors
    #[error("CI client error: {0}")]
    CiClient(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dispatcher stopped: {0}")]
    Stopped(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
