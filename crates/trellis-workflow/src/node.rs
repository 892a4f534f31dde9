use serde::{Deserialize, Serialize};
use trellis_config::{NodeDef, SpecialMark};

/// A workflow node.
///
/// Adjacency is a reference relation by id. Ids that do not resolve to a node
/// of the same workflow are tolerated here and handled by whoever builds the
/// graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub id: String,
  pub name: String,
  pub prev_nodes: Vec<String>,
  pub next_nodes: Vec<String>,
  pub can_delete: bool,
  pub can_undo: bool,
  pub special_mark: Option<SpecialMark>,
  pub visible: bool,
}

impl Node {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      prev_nodes: Vec::new(),
      next_nodes: Vec::new(),
      can_delete: false,
      can_undo: false,
      special_mark: None,
      visible: true,
    }
  }

  /// Set the downstream ids.
  pub fn with_next<I, S>(mut self, next: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.next_nodes = next.into_iter().map(Into::into).collect();
    self
  }

  /// Set the upstream ids.
  pub fn with_prev<I, S>(mut self, prev: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.prev_nodes = prev.into_iter().map(Into::into).collect();
    self
  }

  pub fn hidden(mut self) -> Self {
    self.visible = false;
    self
  }

  pub fn start(mut self) -> Self {
    self.special_mark = Some(SpecialMark::StartNode);
    self
  }

  /// The start node is the one tagged `startNode`, or the node with id `start`.
  pub fn is_start(&self) -> bool {
    self.id == "start" || matches!(self.special_mark, Some(SpecialMark::StartNode))
  }
}

impl From<NodeDef> for Node {
  fn from(def: NodeDef) -> Self {
    Self {
      id: def.id,
      name: def.name,
      prev_nodes: def.prev_nodes,
      next_nodes: def.next_nodes,
      can_delete: def.can_delete,
      can_undo: def.can_undo,
      special_mark: def.special_mark,
      visible: def.visible,
    }
  }
}
