use serde::{Deserialize, Serialize};
use trellis_config::SpecialMark;

use crate::curvature::Curvature;

/// Which way a virtual node bends relative to the edge's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  /// Targets sit above the source on average; the virtual node is placed at
  /// the start of its layer.
  Up,
  /// Targets sit level with or below the source; the virtual node is placed
  /// at the end of its layer.
  Down,
}

impl Direction {
  pub fn as_str(&self) -> &'static str {
    match self {
      Direction::Up => "up",
      Direction::Down => "down",
    }
  }
}

/// What a positioned node stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
  /// A node of the workflow definition.
  Workflow {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    special_mark: Option<SpecialMark>,
  },
  /// A synthetic pass-through node created while routing long edges.
  Virtual {
    direction: Direction,
    /// Sorted ids of the workflow nodes this virtual node eventually leads to.
    targets: Vec<String>,
  },
}

/// A node with its layer and screen position.
///
/// Serialized output also carries the derived `is_virtual` flag next to the
/// `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PositionedNodeRepr")]
pub struct PositionedNode {
  pub id: String,
  pub layer: usize,
  /// Index within the layer's ordering.
  pub order: usize,
  pub x: f64,
  pub y: f64,
  pub visible: bool,
  #[serde(flatten)]
  pub kind: NodeKind,
}

impl PositionedNode {
  pub fn is_virtual(&self) -> bool {
    matches!(self.kind, NodeKind::Virtual { .. })
  }
}

#[derive(Serialize)]
struct PositionedNodeRepr {
  id: String,
  layer: usize,
  order: usize,
  x: f64,
  y: f64,
  visible: bool,
  is_virtual: bool,
  #[serde(flatten)]
  kind: NodeKind,
}

impl From<PositionedNode> for PositionedNodeRepr {
  fn from(node: PositionedNode) -> Self {
    Self {
      is_virtual: node.is_virtual(),
      id: node.id,
      layer: node.layer,
      order: node.order,
      x: node.x,
      y: node.y,
      visible: node.visible,
      kind: node.kind,
    }
  }
}

/// A rendered edge between nodes of adjacent layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEdge {
  pub id: String,
  pub source: String,
  pub target: String,
  pub distances: [f64; 2],
  pub weights: [f64; 2],
}

impl LayoutEdge {
  pub(crate) fn new(source: &str, target: &str, curvature: Curvature) -> Self {
    Self {
      id: format!("{}->{}", source, target),
      source: source.to_string(),
      target: target.to_string(),
      distances: curvature.distances,
      weights: curvature.weights,
    }
  }

  pub fn curvature(&self) -> Curvature {
    Curvature {
      distances: self.distances,
      weights: self.weights,
    }
  }
}

/// Input the layout could not draw. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
  /// An adjacency entry names a node that is not in the input.
  DanglingEdge { from: String, to: String },
  /// The edge closes a cycle and was left out of the layering.
  BackEdge { from: String, to: String },
  /// A second node with an already used id was ignored.
  DuplicateNode { id: String },
}

/// Result of a layout computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
  /// Nodes ordered by layer, then by order within the layer.
  pub nodes: Vec<PositionedNode>,
  pub edges: Vec<LayoutEdge>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub diagnostics: Vec<Diagnostic>,
}

impl Layout {
  pub fn node(&self, id: &str) -> Option<&PositionedNode> {
    self.nodes.iter().find(|n| n.id == id)
  }

  pub fn layer_of(&self, id: &str) -> Option<usize> {
    self.node(id).map(|n| n.layer)
  }

  pub fn layer_count(&self) -> usize {
    self.nodes.iter().map(|n| n.layer + 1).max().unwrap_or(0)
  }

  pub fn virtual_nodes(&self) -> impl Iterator<Item = &PositionedNode> {
    self.nodes.iter().filter(|n| n.is_virtual())
  }

  pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a LayoutEdge> + 'a {
    self.edges.iter().filter(move |e| e.source == id)
  }

  pub fn is_malformed(&self) -> bool {
    !self.diagnostics.is_empty()
  }
}
