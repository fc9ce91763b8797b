//! Flowwatch Core
//!
//! Domain types, traits, and error handling shared by every Flowwatch crate:
//! the flow/job topology model, build references, the raw event envelope
//! and the ports to the CI server and the event transport.

pub mod build;
pub mod error;
pub mod events;
pub mod flow;
pub mod ports;

pub use build::{BuildRef, BuildStatus, RunState, UpstreamCause};
pub use error::{Error, Result};
pub use events::{EventKind, RawEvent};
pub use flow::{Flow, Job, JobNode};
