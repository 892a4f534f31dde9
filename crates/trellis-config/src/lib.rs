//! Trellis Config
//!
//! This crate contains the serializable workflow definition types for Trellis.
//! These types represent workflow definitions as they are stored by the
//! project-tracking backend, before they are normalized into a
//! `trellis_workflow::Workflow` graph.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `trellis layout workflow.json`)
//! - Database storage (as JSON blobs)
//!
//! The node list may be encoded either as an array of nodes or as an object
//! keyed by node id. Both encodings are accepted by [`NodeDefs`].

mod node;
mod workflow;

pub use node::{NodeDef, SpecialMark};
pub use workflow::{NodeDefs, WorkflowDef};
