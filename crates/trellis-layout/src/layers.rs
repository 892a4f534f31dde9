//! Layer assignment.
//!
//! Every node gets the length of the longest path from a root as its layer.
//! The walk is depth-first from each root in declaration order; a node reached
//! again through a longer path is moved to the end of its new layer, so each
//! layer lists its nodes in the order they were (last) placed.

use std::collections::{HashMap, HashSet};

use trellis_workflow::Graph;

/// Layer indices and per-layer ordering for a set of nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layering {
  layers: Vec<Vec<String>>,
  layer_of: HashMap<String, usize>,
  back_edges: Vec<(String, String)>,
}

impl Layering {
  /// Assign layers to every node of `graph`.
  ///
  /// Roots are the nodes without upstream edges; if there are none, every
  /// node is a root. Nodes still unplaced afterwards are walked from
  /// themselves at layer 0. Edges that would re-enter a node on the current
  /// walk path close a cycle; they are skipped and reported in
  /// [`Layering::back_edges`].
  pub fn assign(graph: &Graph) -> Self {
    let mut layering = Layering::default();
    let mut on_path: HashSet<String> = HashSet::new();

    let roots: &[String] = if graph.roots().is_empty() {
      graph.node_ids()
    } else {
      graph.roots()
    };

    for root in roots {
      layering.visit(graph, root, 0, &mut on_path);
    }

    for node_id in graph.node_ids() {
      if !layering.layer_of.contains_key(node_id) {
        layering.visit(graph, node_id, 0, &mut on_path);
      }
    }

    layering
  }

  fn visit(&mut self, graph: &Graph, node_id: &str, layer: usize, on_path: &mut HashSet<String>) {
    match self.layer_of.get(node_id) {
      Some(&current) if current >= layer => return,
      Some(&current) => self.layers[current].retain(|id| id != node_id),
      None => {}
    }
    self.place(node_id, layer);

    on_path.insert(node_id.to_string());
    for next in graph.downstream(node_id) {
      let edge = (node_id.to_string(), next.clone());
      if self.back_edges.contains(&edge) {
        continue;
      }
      if on_path.contains(next) {
        self.back_edges.push(edge);
        continue;
      }
      self.visit(graph, next, layer + 1, on_path);
    }
    on_path.remove(node_id);
  }

  /// Append `node_id` to the end of `layer`, growing the layer list as needed.
  pub(crate) fn place(&mut self, node_id: &str, layer: usize) {
    if self.layers.len() <= layer {
      self.layers.resize_with(layer + 1, Vec::new);
    }
    self.layers[layer].push(node_id.to_string());
    self.layer_of.insert(node_id.to_string(), layer);
  }

  /// Insert `node_id` at the start of `layer`.
  pub(crate) fn place_first(&mut self, node_id: &str, layer: usize) {
    if self.layers.len() <= layer {
      self.layers.resize_with(layer + 1, Vec::new);
    }
    self.layers[layer].insert(0, node_id.to_string());
    self.layer_of.insert(node_id.to_string(), layer);
  }

  pub fn layer(&self, node_id: &str) -> Option<usize> {
    self.layer_of.get(node_id).copied()
  }

  /// Ordered node ids per layer.
  pub fn layers(&self) -> &[Vec<String>] {
    &self.layers
  }

  /// Index of `node_id` within its layer.
  pub fn position(&self, node_id: &str) -> Option<usize> {
    let layer = self.layer(node_id)?;
    self.layers[layer].iter().position(|id| id == node_id)
  }

  /// Edges skipped because they close a cycle.
  pub fn back_edges(&self) -> &[(String, String)] {
    &self.back_edges
  }

  pub fn is_back_edge(&self, from: &str, to: &str) -> bool {
    self.back_edges.iter().any(|(f, t)| f == from && t == to)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use trellis_workflow::Node;

  fn layering(nodes: &[Node]) -> Layering {
    let (graph, _) = Graph::from_nodes(nodes);
    Layering::assign(&graph)
  }

  #[test]
  fn test_chain_layers() {
    let l = layering(&[
      Node::new("a", "A").with_next(["b"]),
      Node::new("b", "B").with_next(["c"]),
      Node::new("c", "C"),
    ]);
    assert_eq!(l.layer("a"), Some(0));
    assert_eq!(l.layer("b"), Some(1));
    assert_eq!(l.layer("c"), Some(2));
  }

  #[test]
  fn test_longest_path_moves_node() {
    // a -> c directly and a -> b -> c; c must land on layer 2.
    let l = layering(&[
      Node::new("a", "A").with_next(["c", "b"]),
      Node::new("b", "B").with_next(["c"]),
      Node::new("c", "C"),
    ]);
    assert_eq!(l.layer("c"), Some(2));
    assert_eq!(l.layers()[1], vec!["b".to_string()]);
    assert_eq!(l.layers()[2], vec!["c".to_string()]);
  }

  #[test]
  fn test_layer_order_follows_visitation() {
    let l = layering(&[
      Node::new("start", "Start").with_next(["x", "y", "z"]),
      Node::new("x", "X"),
      Node::new("y", "Y"),
      Node::new("z", "Z"),
    ]);
    assert_eq!(l.layers()[1], vec!["x", "y", "z"]);
    assert_eq!(l.position("z"), Some(2));
  }

  #[test]
  fn test_disconnected_nodes_start_at_zero() {
    let l = layering(&[
      Node::new("a", "A").with_next(["b"]),
      Node::new("b", "B"),
      Node::new("lonely", "Lonely"),
    ]);
    assert_eq!(l.layer("lonely"), Some(0));
    assert_eq!(l.layers()[0], vec!["a", "lonely"]);
  }

  #[test]
  fn test_cycle_terminates_and_reports_back_edge() {
    let l = layering(&[
      Node::new("a", "A").with_next(["b"]),
      Node::new("b", "B").with_next(["c"]),
      Node::new("c", "C").with_next(["a"]),
    ]);
    // No roots: every node is walked as a root, starting with `a`.
    assert_eq!(l.layer("a"), Some(0));
    assert_eq!(l.layer("b"), Some(1));
    assert_eq!(l.layer("c"), Some(2));
    assert!(l.is_back_edge("c", "a"));
    assert_eq!(l.back_edges().len(), 1);
  }

  #[test]
  fn test_every_retained_edge_increases_layer() {
    let nodes = [
      Node::new("s", "S").with_next(["a", "d"]),
      Node::new("a", "A").with_next(["b"]),
      Node::new("b", "B").with_next(["c", "d"]),
      Node::new("c", "C").with_next(["d"]),
      Node::new("d", "D"),
      Node::new("e", "E").with_next(["c"]),
    ];
    let (graph, set) = Graph::from_nodes(&nodes);
    let l = Layering::assign(&graph);
    for (from, to) in &set.edges {
      assert!(l.layer(from).unwrap() < l.layer(to).unwrap(), "{from} -> {to}");
    }
    assert_eq!(l.layer("d"), Some(4));
  }
}
