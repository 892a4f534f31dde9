//! Layout engine.
//!
//! The `LayoutEngine` runs the whole pipeline for one node list. It holds the
//! geometry and a shared, read-only curvature table, so one engine can serve
//! any number of layouts, concurrently or repeatedly.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use trellis_workflow::{Graph, Node};

use crate::config::LayoutConfig;
use crate::curvature::CurvatureTable;
use crate::layers::Layering;
use crate::routing::RoutedGraph;
use crate::types::{Diagnostic, Layout, LayoutEdge, NodeKind, PositionedNode};

/// Computes layered layouts for workflow node lists.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
  config: LayoutConfig,
  curvature: Arc<CurvatureTable>,
}

impl LayoutEngine {
  /// Create an engine with its own curvature table.
  pub fn new(config: LayoutConfig) -> Self {
    Self::with_curvature(config, Arc::new(CurvatureTable::new()))
  }

  /// Create an engine sharing an existing curvature table.
  pub fn with_curvature(config: LayoutConfig, curvature: Arc<CurvatureTable>) -> Self {
    Self { config, curvature }
  }

  pub fn config(&self) -> &LayoutConfig {
    &self.config
  }

  pub fn curvature(&self) -> &CurvatureTable {
    &self.curvature
  }

  /// Lay out `nodes`.
  ///
  /// Never fails: dangling references, duplicate ids and edges closing a
  /// cycle are dropped and listed in [`Layout::diagnostics`].
  pub fn layout(&self, nodes: &[Node]) -> Layout {
    let mut diagnostics = Vec::new();

    let mut by_id: HashMap<&str, &Node> = HashMap::with_capacity(nodes.len());
    let mut unique: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
      if by_id.contains_key(node.id.as_str()) {
        warn!(node_id = %node.id, "ignoring duplicate node id in layout input");
        diagnostics.push(Diagnostic::DuplicateNode {
          id: node.id.clone(),
        });
        continue;
      }
      by_id.insert(node.id.as_str(), node);
      unique.push(node.clone());
    }

    let (graph, edge_set) = Graph::from_nodes(&unique);
    for (from, to) in edge_set.dangling {
      warn!(from = %from, to = %to, "dropping edge to unknown node");
      diagnostics.push(Diagnostic::DanglingEdge { from, to });
    }

    let layering = Layering::assign(&graph);
    for (from, to) in layering.back_edges() {
      warn!(from = %from, to = %to, "dropping edge that closes a cycle");
      diagnostics.push(Diagnostic::BackEdge {
        from: from.clone(),
        to: to.clone(),
      });
    }

    let routed = RoutedGraph::route(&graph, layering, &self.config);
    debug!(
      nodes = unique.len(),
      virtual_nodes = routed.virtual_count(),
      layers = routed.layering.layers().len(),
      "layout computed"
    );

    Layout {
      nodes: self.position_nodes(&routed, &by_id),
      edges: self.build_edges(&routed),
      diagnostics,
    }
  }

  fn position_nodes(&self, routed: &RoutedGraph, by_id: &HashMap<&str, &Node>) -> Vec<PositionedNode> {
    let mut positioned = Vec::new();

    for (layer, ids) in routed.layering.layers().iter().enumerate() {
      for (order, id) in ids.iter().enumerate() {
        let (visible, kind) = if let Some(v) = routed.virtual_node(id) {
          (
            false,
            NodeKind::Virtual {
              direction: v.direction,
              targets: v.targets.clone(),
            },
          )
        } else if let Some(node) = by_id.get(id.as_str()) {
          (
            node.visible,
            NodeKind::Workflow {
              name: node.name.clone(),
              special_mark: node.special_mark.clone(),
            },
          )
        } else {
          continue;
        };

        positioned.push(PositionedNode {
          id: id.clone(),
          layer,
          order,
          x: self.config.x(layer),
          y: self.config.y(order, ids.len()),
          visible,
          kind,
        });
      }
    }

    positioned
  }

  /// One edge per adjacency entry, with curvature from each end's fan.
  fn build_edges(&self, routed: &RoutedGraph) -> Vec<LayoutEdge> {
    let layering = &routed.layering;
    let position = |id: &str| layering.position(id).unwrap_or(usize::MAX);

    let mut edges = Vec::new();
    for ids in layering.layers() {
      for source in ids {
        let mut outgoing: Vec<&String> = routed.downstream(source).iter().collect();
        outgoing.sort_by_key(|t| position(t.as_str()));

        for (left_index, target) in outgoing.iter().enumerate() {
          let mut incoming: Vec<&String> = routed.upstream(target).iter().collect();
          incoming.sort_by_key(|s| position(s.as_str()));
          let right_index = incoming
            .iter()
            .position(|s| *s == source)
            .unwrap_or_default();

          let curvature =
            self
              .curvature
              .lookup(left_index, outgoing.len(), right_index, incoming.len());
          edges.push(LayoutEdge::new(source, target, curvature));
        }
      }
    }

    edges
  }
}

impl Default for LayoutEngine {
  fn default() -> Self {
    Self::new(LayoutConfig::default())
  }
}
