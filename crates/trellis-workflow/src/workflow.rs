use std::collections::HashMap;

use serde::Serialize;
use trellis_config::WorkflowDef;

use crate::error::WorkflowError;
use crate::graph::{EdgeSet, Graph};
use crate::node::Node;

/// A validated workflow shared read-only by every task of its type.
#[derive(Debug, Clone, Serialize)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  nodes: Vec<Node>,
  #[serde(skip)]
  index: HashMap<String, usize>,
  #[serde(skip)]
  graph: Graph,
}

impl Workflow {
  /// Normalize and validate a definition.
  ///
  /// Unlike the layout engine, which drops what it cannot draw, this rejects
  /// duplicate ids, dangling edges and cycles.
  pub fn from_def(def: WorkflowDef) -> Result<Self, WorkflowError> {
    let nodes: Vec<Node> = def.nodes.into_list().into_iter().map(Node::from).collect();
    Self::new(def.workflow_id, def.name, nodes)
  }

  /// Build a workflow from already converted nodes.
  pub fn new(
    workflow_id: impl Into<String>,
    name: impl Into<String>,
    mut nodes: Vec<Node>,
  ) -> Result<Self, WorkflowError> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
      if index.insert(node.id.clone(), i).is_some() {
        return Err(WorkflowError::DuplicateNode(node.id.clone()));
      }
    }

    let set = EdgeSet::collect(&nodes);
    if let Some((from, to)) = set.dangling.into_iter().next() {
      return Err(WorkflowError::InvalidEdge { from, to });
    }

    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let graph = Graph::new(&ids, &set.edges);
    if let Some(path) = graph.find_cycle() {
      return Err(WorkflowError::CycleDetected { path });
    }

    // Rewrite adjacency so both directions agree with the graph.
    for node in &mut nodes {
      node.next_nodes = graph.downstream(&node.id).to_vec();
      node.prev_nodes = graph.upstream(&node.id).to_vec();
    }

    Ok(Self {
      workflow_id: workflow_id.into(),
      name: name.into(),
      nodes,
      index,
      graph,
    })
  }

  /// Nodes in declaration order.
  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.index.get(node_id).map(|&i| &self.nodes[i])
  }

  /// Get a node by ID or fail with [`WorkflowError::NodeNotFound`].
  pub fn node(&self, node_id: &str) -> Result<&Node, WorkflowError> {
    self
      .get_node(node_id)
      .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))
  }

  /// The graph structure for traversal.
  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// The start node, if the workflow declares one.
  pub fn start_node(&self) -> Option<&Node> {
    self.nodes.iter().find(|n| n.is_start())
  }
}
