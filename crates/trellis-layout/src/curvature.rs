//! Curvature assignment.
//!
//! Edges between two adjacent layers are described by their position in the
//! source's fan-out (`left_index` of `left_total`) and in the target's fan-in
//! (`right_index` of `right_total`). Centering both positions gives a skew:
//! zero means the edge runs straight across, otherwise it bends by an amount
//! that grows with the skew so parallel edges separate.
//!
//! When both totals have the same parity the skew is a whole number of steps
//! ("aligned"); otherwise it falls on half steps ("unaligned"). Each case has
//! its own table. Skews past the end of a table render straight.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Largest fan-out/fan-in tabulated per side. Larger fans are scaled down.
pub const MAX_FAN: usize = 8;

/// `(distance, weight)` per whole skew step, starting at one step.
const ALIGNED_STEPS: [(f64, f64); 4] = [(18.0, 0.40), (30.0, 0.34), (40.0, 0.30), (48.0, 0.26)];

/// `(distance, weight)` per half skew step, starting at half a step.
const UNALIGNED_STEPS: [(f64, f64); 4] = [(10.0, 0.45), (24.0, 0.37), (35.0, 0.32), (44.0, 0.28)];

/// Bezier control point description for one edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Curvature {
  /// Control point distances from the straight line: `[d, -d]`.
  pub distances: [f64; 2],
  /// Control point positions along the edge: `[w, 1 - w]`.
  pub weights: [f64; 2],
}

impl Curvature {
  pub const STRAIGHT: Curvature = Curvature {
    distances: [0.0, 0.0],
    weights: [0.5, 0.5],
  };

  fn bend(distance: f64, weight: f64) -> Self {
    Self {
      distances: [distance, -distance],
      weights: [weight, 1.0 - weight],
    }
  }

  pub fn is_straight(&self) -> bool {
    *self == Self::STRAIGHT
  }

  /// Unsigned bend amount.
  pub fn magnitude(&self) -> f64 {
    self.distances[0].abs()
  }
}

/// Key order: `(left_total, left_index, right_total, right_index)`.
type FanKey = (usize, usize, usize, usize);

/// Precomputed curvature for every fan position up to [`MAX_FAN`] per side.
///
/// Build once and share; lookups are read-only.
#[derive(Debug, Clone)]
pub struct CurvatureTable {
  entries: HashMap<FanKey, Curvature>,
}

impl CurvatureTable {
  pub fn new() -> Self {
    let mut entries = HashMap::new();
    for left_total in 1..=MAX_FAN {
      for left_index in 0..left_total {
        for right_total in 1..=MAX_FAN {
          for right_index in 0..right_total {
            entries.insert(
              (left_total, left_index, right_total, right_index),
              compute(left_index, left_total, right_index, right_total),
            );
          }
        }
      }
    }
    Self { entries }
  }

  /// Curvature of an edge at `left_index` of `left_total` outgoing edges and
  /// `right_index` of `right_total` incoming edges.
  ///
  /// Out-of-range positions render straight.
  pub fn lookup(
    &self,
    left_index: usize,
    left_total: usize,
    right_index: usize,
    right_total: usize,
  ) -> Curvature {
    if left_index >= left_total || right_index >= right_total {
      return Curvature::STRAIGHT;
    }
    let (left_index, left_total) = clamp(left_index, left_total);
    let (right_index, right_total) = clamp(right_index, right_total);
    self
      .entries
      .get(&(left_total, left_index, right_total, right_index))
      .copied()
      .unwrap_or(Curvature::STRAIGHT)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl Default for CurvatureTable {
  fn default() -> Self {
    Self::new()
  }
}

/// Scale a position in a fan wider than [`MAX_FAN`] into the tabulated range,
/// keeping its relative place.
fn clamp(index: usize, total: usize) -> (usize, usize) {
  if total <= MAX_FAN {
    return (index, total);
  }
  let scaled = (index * (MAX_FAN - 1) + (total - 1) / 2) / (total - 1);
  (scaled.min(MAX_FAN - 1), MAX_FAN)
}

/// Twice the centered skew between the two sides, so half steps stay integral.
fn double_skew(left_index: usize, left_total: usize, right_index: usize, right_total: usize) -> i64 {
  let left = 2 * left_index as i64 - (left_total as i64 - 1);
  let right = 2 * right_index as i64 - (right_total as i64 - 1);
  right - left
}

fn compute(left_index: usize, left_total: usize, right_index: usize, right_total: usize) -> Curvature {
  let skew2 = double_skew(left_index, left_total, right_index, right_total);
  if skew2 == 0 {
    return Curvature::STRAIGHT;
  }

  let steps = skew2.unsigned_abs() as usize;
  let entry = if left_total % 2 == right_total % 2 {
    ALIGNED_STEPS.get(steps / 2 - 1)
  } else {
    UNALIGNED_STEPS.get(steps.div_ceil(2) - 1)
  };

  match entry {
    Some(&(distance, weight)) => Curvature::bend(distance * skew2.signum() as f64, weight),
    None => Curvature::STRAIGHT,
  }
}
