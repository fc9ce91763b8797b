//! Jenkins CI client for Flowwatch.
//!
//! Read-only queries against the Jenkins JSON API: the type of a job
//! (plain job or build flow) and the trigger causes of a build.

mod client;
pub mod error;

pub use client::{FLOW_CLASS, JOB_CLASS, JenkinsClient, JenkinsConfig};
pub use error::JenkinsError;
