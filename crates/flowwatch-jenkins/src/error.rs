//! Jenkins client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JenkinsError {
    #[error("Invalid Jenkins URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Unauthorized for {0}")]
    Unauthorized(String),

    #[error("Server returned {status} for {url}")]
    Status { status: u16, url: String },
}

impl From<JenkinsError> for flowwatch_core::Error {
    fn from(err: JenkinsError) -> Self {
        flowwatch_core::Error::CiClient(err.to_string())
    }
}
