//! Trellis Workflow
//!
//! This crate provides the normalized workflow representation for Trellis.
//! A normalized workflow is a validated form of a workflow definition that
//! the layout engine and the status service can share read-only.
//!
//! Key differences from `trellis-config`:
//! - Both `prevNodes` and `nextNodes` contribute edges, deduplicated
//! - Graph structure is validated (unique ids, valid edges, no cycles)
//! - Roots and join points are identified
//! - Upstream/downstream lookups are indexed

mod error;
mod graph;
mod node;
mod workflow;

pub use error::WorkflowError;
pub use graph::{EdgeSet, Graph};
pub use node::Node;
pub use workflow::Workflow;
