//! Flow definition loading for Flowwatch.
//!
//! A definition file lists named flows made of serial and parallel job
//! groups. Flows marked `label: true` are templates: they are inlined
//! wherever another flow references them and do not appear in the resolved
//! topology themselves.

pub mod definition;
pub mod error;
pub mod loader;
pub mod render;

pub use definition::{FlowSpec, FlowsFile, GroupKind, GroupSpec, JobSpec};
pub use error::TopologyError;
pub use loader::{Loader, Topology};
pub use render::{RenderMap, RenderNode};
