//! Virtual routing.
//!
//! A rendered edge must connect adjacent layers. Every edge spanning more
//! than one layer is replaced by a chain of virtual nodes, one per
//! intermediate layer. Virtual nodes are keyed by
//! `(layer, direction, sorted onward targets)`: the long edges of one source
//! bundle into a single chain for as long as they travel together, and
//! chains of different sources heading to the same targets merge.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;
use trellis_workflow::Graph;

use crate::config::LayoutConfig;
use crate::layers::Layering;
use crate::types::Direction;

/// A synthetic node created by routing.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualNode {
  pub id: String,
  pub layer: usize,
  pub direction: Direction,
  pub targets: Vec<String>,
}

impl VirtualNode {
  /// Stable id derived from the routing key.
  pub fn key(layer: usize, direction: Direction, targets: &[String]) -> String {
    format!("virtual:{}:{}:{}", layer, direction.as_str(), targets.join(","))
  }
}

/// A layered graph in which every edge spans exactly one layer.
#[derive(Debug, Clone, Default)]
pub struct RoutedGraph {
  pub layering: Layering,
  downstream: HashMap<String, Vec<String>>,
  upstream: HashMap<String, Vec<String>>,
  virtuals: HashMap<String, VirtualNode>,
}

impl RoutedGraph {
  /// Route every retained edge of `graph` through `layering`.
  ///
  /// Back edges recorded by the layering are left out.
  pub fn route(graph: &Graph, layering: Layering, config: &LayoutConfig) -> Self {
    let mut routed = RoutedGraph {
      layering,
      ..Default::default()
    };

    for node_id in graph.node_ids() {
      for next in graph.downstream(node_id) {
        if !routed.layering.is_back_edge(node_id, next) {
          routed.connect(node_id, next);
        }
      }
    }

    // Vertical positions before any virtual node exists.
    let y_of: HashMap<String, f64> = routed
      .layering
      .layers()
      .iter()
      .flat_map(|layer| {
        layer
          .iter()
          .enumerate()
          .map(|(i, id)| (id.clone(), config.y(i, layer.len())))
      })
      .collect();

    let sources: Vec<String> = routed.layering.layers().iter().flatten().cloned().collect();
    for source in sources {
      routed.route_source(&source, &y_of);
    }

    routed
  }

  fn route_source(&mut self, source: &str, y_of: &HashMap<String, f64>) {
    let Some(source_layer) = self.layering.layer(source) else {
      return;
    };

    let long_targets: Vec<(String, usize)> = self
      .downstream(source)
      .iter()
      .filter_map(|t| self.layering.layer(t).map(|l| (t.clone(), l)))
      .filter(|(_, l)| *l > source_layer + 1)
      .collect();
    let Some(last_layer) = long_targets.iter().map(|(_, l)| *l).max() else {
      return;
    };

    for (target, _) in &long_targets {
      self.disconnect(source, target);
    }

    let source_y = y_of.get(source).copied().unwrap_or(0.0);
    let mut parent = source.to_string();

    for layer in source_layer + 1..last_layer {
      let onward: Vec<String> = long_targets
        .iter()
        .filter(|(_, l)| *l > layer)
        .map(|(t, _)| t.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

      let average_y =
        onward.iter().map(|t| y_of.get(t).copied().unwrap_or(0.0)).sum::<f64>() / onward.len() as f64;
      let direction = if average_y < source_y {
        Direction::Up
      } else {
        Direction::Down
      };

      let id = self.ensure_virtual(layer, direction, onward);
      self.connect(&parent, &id);

      for (target, _) in long_targets.iter().filter(|(_, l)| *l == layer + 1) {
        self.connect(&id, target);
      }

      parent = id;
    }
  }

  fn ensure_virtual(&mut self, layer: usize, direction: Direction, targets: Vec<String>) -> String {
    let id = VirtualNode::key(layer, direction, &targets);
    if self.virtuals.contains_key(&id) {
      return id;
    }

    match direction {
      Direction::Up => self.layering.place_first(&id, layer),
      Direction::Down => self.layering.place(&id, layer),
    }
    debug!(virtual_node = %id, layer, "inserted virtual node");

    self.virtuals.insert(
      id.clone(),
      VirtualNode {
        id: id.clone(),
        layer,
        direction,
        targets,
      },
    );
    id
  }

  fn connect(&mut self, from: &str, to: &str) {
    let outgoing = self.downstream.entry(from.to_string()).or_default();
    if outgoing.iter().any(|t| t == to) {
      return;
    }
    outgoing.push(to.to_string());
    self
      .upstream
      .entry(to.to_string())
      .or_default()
      .push(from.to_string());
  }

  fn disconnect(&mut self, from: &str, to: &str) {
    if let Some(outgoing) = self.downstream.get_mut(from) {
      outgoing.retain(|t| t != to);
    }
    if let Some(incoming) = self.upstream.get_mut(to) {
      incoming.retain(|f| f != from);
    }
  }

  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .downstream
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .upstream
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn virtual_node(&self, node_id: &str) -> Option<&VirtualNode> {
    self.virtuals.get(node_id)
  }

  pub fn virtual_count(&self) -> usize {
    self.virtuals.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use trellis_workflow::Node;

  fn route(nodes: &[Node]) -> RoutedGraph {
    let (graph, _) = Graph::from_nodes(nodes);
    let layering = Layering::assign(&graph);
    RoutedGraph::route(&graph, layering, &LayoutConfig::default())
  }

  fn assert_single_span(routed: &RoutedGraph) {
    for layer in routed.layering.layers() {
      for id in layer {
        let from = routed.layering.layer(id).unwrap();
        for next in routed.downstream(id) {
          assert_eq!(routed.layering.layer(next).unwrap(), from + 1, "{id} -> {next}");
        }
      }
    }
  }

  #[test]
  fn test_long_edge_gets_virtual_chain() {
    // a -> d spans three layers next to a -> b -> c -> d.
    let routed = route(&[
      Node::new("a", "A").with_next(["b", "d"]),
      Node::new("b", "B").with_next(["c"]),
      Node::new("c", "C").with_next(["d"]),
      Node::new("d", "D"),
    ]);

    assert_eq!(routed.virtual_count(), 2);
    assert!(!routed.downstream("a").contains(&"d".to_string()));
    assert_single_span(&routed);

    let first = &routed.downstream("a")[1];
    let second = &routed.downstream(first)[0];
    assert_eq!(routed.downstream(second), &["d".to_string()]);
    assert_eq!(routed.virtual_node(first).unwrap().layer, 1);
    assert_eq!(routed.virtual_node(second).unwrap().layer, 2);
  }

  #[test]
  fn test_bundled_targets_share_virtual_node() {
    // s reaches t1 (layer 3) and t2 (layer 4) through the same column 1 and 2.
    let routed = route(&[
      Node::new("s", "S").with_next(["m1", "t1", "t2"]),
      Node::new("m1", "M1").with_next(["m2"]),
      Node::new("m2", "M2").with_next(["t1"]),
      Node::new("t1", "T1").with_next(["t2"]),
      Node::new("t2", "T2"),
    ]);

    assert_single_span(&routed);
    let virtual_children: Vec<&String> = routed
      .downstream("s")
      .iter()
      .filter(|id| routed.virtual_node(id).is_some())
      .collect();
    assert_eq!(virtual_children.len(), 1);

    let shared = routed.virtual_node(virtual_children[0]).unwrap();
    assert_eq!(shared.targets, vec!["t1".to_string(), "t2".to_string()]);

    // Layer 3 only carries t2 onward.
    let at_layer_3: Vec<&VirtualNode> = routed.layering.layers()[3]
      .iter()
      .filter_map(|id| routed.virtual_node(id))
      .collect();
    assert_eq!(at_layer_3.len(), 1);
    assert_eq!(at_layer_3[0].targets, vec!["t2".to_string()]);
  }

  #[test]
  fn test_virtual_ids_are_stable() {
    let nodes = [
      Node::new("a", "A").with_next(["b", "c"]),
      Node::new("b", "B").with_next(["c"]),
      Node::new("c", "C"),
    ];
    let first = route(&nodes);
    let second = route(&nodes);
    assert_eq!(first.layering.layers(), second.layering.layers());
    assert_eq!(first.layering.layers()[1][1], "virtual:1:down:c");
  }

  #[test]
  fn test_up_direction_prepends() {
    // `far` sits at the bottom of layer 0 while its target `end` is
    // centered, so the virtual node bends up and goes first in layer 1.
    let routed = route(&[
      Node::new("start", "Start").with_next(["mid"]),
      Node::new("far", "Far").with_next(["end"]),
      Node::new("mid", "Mid").with_next(["end"]),
      Node::new("end", "End"),
    ]);
    let layer_1 = &routed.layering.layers()[1];
    assert_eq!(layer_1[0], "virtual:1:up:end");
    assert_eq!(layer_1[1], "mid");
  }
}
