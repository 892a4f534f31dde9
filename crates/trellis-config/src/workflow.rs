use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::NodeDef;

/// The node list of a workflow definition, in either accepted encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeDefs {
  /// `[{ "id": "start", ... }, ...]`
  List(Vec<NodeDef>),
  /// `{ "start": { ... }, ... }`
  Keyed(BTreeMap<String, NodeDef>),
}

impl NodeDefs {
  /// Flatten into a list, filling missing ids from map keys.
  ///
  /// The keyed encoding is ordered by key, so both encodings produce a
  /// deterministic order.
  pub fn into_list(self) -> Vec<NodeDef> {
    match self {
      NodeDefs::List(nodes) => nodes,
      NodeDefs::Keyed(map) => map
        .into_iter()
        .map(|(key, mut node)| {
          node.id = key;
          node
        })
        .collect(),
    }
  }

  pub fn len(&self) -> usize {
    match self {
      NodeDefs::List(nodes) => nodes.len(),
      NodeDefs::Keyed(map) => map.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for NodeDefs {
  fn default() -> Self {
    NodeDefs::List(Vec::new())
  }
}

impl From<Vec<NodeDef>> for NodeDefs {
  fn from(nodes: Vec<NodeDef>) -> Self {
    NodeDefs::List(nodes)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDef {
  /// Workflow type id shared by every task using this workflow.
  pub workflow_id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub nodes: NodeDefs,
}
