//! Trellis Layout
//!
//! Turns a workflow node list into a drawable layered diagram.
//!
//! # Pipeline
//!
//! ```text
//! nodes ──► layers ──► routing ──► positions ──► curvature ──► Layout
//!           (longest   (virtual    (column x,    (per-edge
//!            path)      nodes)      centered y)   bezier hint)
//! ```
//!
//! - [`layers`] assigns each node a column and an order within the column.
//! - [`routing`] inserts virtual pass-through nodes so every edge spans one column.
//! - [`curvature`] spreads parallel edges apart with a precomputed lookup table.
//!
//! Layout never fails. Input it cannot draw (edges to unknown nodes, edges
//! closing a cycle) is dropped and reported in [`Layout::diagnostics`].
//!
//! # Usage
//!
//! ```ignore
//! use trellis_layout::{LayoutConfig, LayoutEngine};
//!
//! let engine = LayoutEngine::new(LayoutConfig::default());
//! let layout = engine.layout(workflow.nodes());
//! println!("{}", serde_json::to_string_pretty(&layout)?);
//! ```

mod config;
pub mod curvature;
mod engine;
pub mod layers;
pub mod routing;
mod types;

pub use config::LayoutConfig;
pub use curvature::{Curvature, CurvatureTable};
pub use engine::LayoutEngine;
pub use types::{Diagnostic, Direction, Layout, LayoutEdge, NodeKind, PositionedNode};
