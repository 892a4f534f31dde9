use std::collections::{HashMap, HashSet, VecDeque};

use crate::Node;

/// Edges collected from a node list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSet {
  /// Deduplicated edges between known nodes, in discovery order.
  pub edges: Vec<(String, String)>,
  /// Edges naming an id that is not part of the node list.
  pub dangling: Vec<(String, String)>,
}

impl EdgeSet {
  /// Collect edges from both adjacency directions of every node.
  ///
  /// `next_nodes` are read first so that downstream order follows each
  /// node's own declaration; `prev_nodes` only add edges not already seen.
  pub fn collect(nodes: &[Node]) -> Self {
    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut set = EdgeSet::default();

    let forward = nodes
      .iter()
      .flat_map(|n| n.next_nodes.iter().map(move |to| (n.id.as_str(), to.as_str())));
    let backward = nodes
      .iter()
      .flat_map(|n| n.prev_nodes.iter().map(move |from| (from.as_str(), n.id.as_str())));

    for (from, to) in forward.chain(backward) {
      let edge = (from.to_string(), to.to_string());
      if !known.contains(from) || !known.contains(to) {
        if !set.dangling.contains(&edge) {
          set.dangling.push(edge);
        }
        continue;
      }
      if seen.insert(edge.clone()) {
        set.edges.push(edge);
      }
    }

    set
  }
}

/// Graph structure for traversal and analysis.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  /// Node ids in declaration order.
  order: Vec<String>,
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no incoming edges.
  roots: Vec<String>,
  /// Nodes with multiple incoming edges (join points).
  join_points: HashSet<String>,
}

impl Graph {
  /// Build a graph from node ids and edges.
  ///
  /// Edges are expected to reference known ids; see [`EdgeSet::collect`].
  pub fn new(node_ids: &[String], edges: &[(String, String)]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all nodes
    for node_id in node_ids {
      adjacency.entry(node_id.clone()).or_default();
      reverse_adjacency.entry(node_id.clone()).or_default();
    }

    for (from, to) in edges {
      adjacency.entry(from.clone()).or_default().push(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .push(from.clone());
    }

    let roots: Vec<String> = node_ids
      .iter()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    let join_points: HashSet<String> = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      order: node_ids.to_vec(),
      adjacency,
      reverse_adjacency,
      roots,
      join_points,
    }
  }

  /// Build a graph directly from nodes, dropping dangling references.
  pub fn from_nodes(nodes: &[Node]) -> (Self, EdgeSet) {
    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let set = EdgeSet::collect(nodes);
    (Self::new(&ids, &set.edges), set)
  }

  /// Node ids in declaration order.
  pub fn node_ids(&self) -> &[String] {
    &self.order
  }

  pub fn contains(&self, node_id: &str) -> bool {
    self.adjacency.contains_key(node_id)
  }

  /// Nodes with no incoming edges.
  pub fn roots(&self) -> &[String] {
    &self.roots
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Check if a node is a join point (has multiple incoming edges).
  pub fn is_join_point(&self, node_id: &str) -> bool {
    self.join_points.contains(node_id)
  }

  /// All nodes reachable from `node_id`, breadth-first, excluding the node
  /// itself. Each node appears once even if the graph has cycles.
  pub fn descendants(&self, node_id: &str) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::from([node_id]);
    let mut queue: VecDeque<&str> = VecDeque::from([node_id]);
    let mut found = Vec::new();

    while let Some(current) = queue.pop_front() {
      for next in self.downstream(current) {
        if visited.insert(next.as_str()) {
          found.push(next.clone());
          queue.push_back(next.as_str());
        }
      }
    }

    found
  }

  /// Find a cycle using DFS coloring. Returns the node ids along the cycle,
  /// starting and ending with the same id.
  pub fn find_cycle(&self) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
      White,
      Gray,
      Black,
    }

    fn dfs<'a>(
      node: &'a str,
      graph: &'a Graph,
      color: &mut HashMap<&'a str, Color>,
      stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
      color.insert(node, Color::Gray);
      stack.push(node);

      for next in graph.downstream(node) {
        match color.get(next.as_str()).copied() {
          Some(Color::Gray) => {
            // Back edge: the cycle is the stack suffix starting at `next`.
            let start = stack.iter().position(|id| *id == next.as_str())?;
            let mut path: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
            path.push(next.clone());
            return Some(path);
          }
          Some(Color::White) => {
            if let Some(path) = dfs(next.as_str(), graph, color, stack) {
              return Some(path);
            }
          }
          _ => {}
        }
      }

      stack.pop();
      color.insert(node, Color::Black);
      None
    }

    let mut color: HashMap<&str, Color> =
      self.order.iter().map(|id| (id.as_str(), Color::White)).collect();
    let mut stack = Vec::new();

    for node_id in &self.order {
      if color.get(node_id.as_str()) == Some(&Color::White)
        && let Some(path) = dfs(node_id, self, &mut color, &mut stack)
      {
        return Some(path);
      }
    }

    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn diamond() -> Vec<Node> {
    vec![
      Node::new("start", "Start").with_next(["a", "b"]),
      Node::new("a", "A").with_next(["end"]),
      Node::new("b", "B").with_next(["end"]),
      Node::new("end", "End"),
    ]
  }

  #[test]
  fn test_edges_from_both_directions_are_merged() {
    let nodes = vec![
      Node::new("a", "A").with_next(["b"]),
      Node::new("b", "B").with_prev(["a"]),
      Node::new("c", "C").with_prev(["b"]),
    ];
    let set = EdgeSet::collect(&nodes);
    assert_eq!(
      set.edges,
      vec![
        ("a".to_string(), "b".to_string()),
        ("b".to_string(), "c".to_string())
      ]
    );
    assert!(set.dangling.is_empty());
  }

  #[test]
  fn test_dangling_edges_are_separated() {
    let nodes = vec![Node::new("a", "A").with_next(["ghost"]).with_prev(["phantom"])];
    let set = EdgeSet::collect(&nodes);
    assert!(set.edges.is_empty());
    assert_eq!(set.dangling.len(), 2);
  }

  #[test]
  fn test_roots_and_join_points() {
    let (graph, _) = Graph::from_nodes(&diamond());
    assert_eq!(graph.roots(), &["start".to_string()]);
    assert!(graph.is_join_point("end"));
    assert!(!graph.is_join_point("a"));
    assert_eq!(graph.upstream("end"), &["a".to_string(), "b".to_string()]);
  }

  #[test]
  fn test_descendants_breadth_first() {
    let (graph, _) = Graph::from_nodes(&diamond());
    assert_eq!(graph.descendants("start"), vec!["a", "b", "end"]);
    assert!(graph.descendants("end").is_empty());
  }

  #[test]
  fn test_find_cycle() {
    let (graph, _) = Graph::from_nodes(&diamond());
    assert_eq!(graph.find_cycle(), None);

    let cyclic = vec![
      Node::new("a", "A").with_next(["b"]),
      Node::new("b", "B").with_next(["c"]),
      Node::new("c", "C").with_next(["a"]),
    ];
    let (graph, _) = Graph::from_nodes(&cyclic);
    assert_eq!(graph.find_cycle(), Some(vec!["a".into(), "b".into(), "c".into(), "a".into()]));
  }
}
