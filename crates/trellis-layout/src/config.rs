use serde::{Deserialize, Serialize};

/// Geometry used to turn layer/order indices into screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
  /// Horizontal distance between adjacent layers.
  pub layer_width: f64,
  /// Vertical distance between adjacent nodes of one layer.
  pub node_height: f64,
}

impl Default for LayoutConfig {
  fn default() -> Self {
    Self {
      layer_width: 240.0,
      node_height: 96.0,
    }
  }
}

impl LayoutConfig {
  pub fn x(&self, layer: usize) -> f64 {
    layer as f64 * self.layer_width
  }

  /// Vertical position of the node at `index` in a layer of `count` nodes,
  /// centered around zero.
  pub fn y(&self, index: usize, count: usize) -> f64 {
    index as f64 * self.node_height - (count.saturating_sub(1)) as f64 * self.node_height / 2.0
  }
}
