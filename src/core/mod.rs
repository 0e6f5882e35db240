pub mod errors;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from metric name to numeric value for one node.
///
/// Ordered so that derived column lists and serialized output are
/// deterministic. Metric names beginning with `_` are private: they stay in
/// the map but are excluded from user-facing metric columns.
pub type MetricMap = BTreeMap<String, f64>;

/// Mapping from categorical attribute name to value, disjoint from metrics.
pub type AttributeMap = BTreeMap<String, serde_json::Value>;

/// Running min/max accumulator for one metric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    /// An empty accumulator: widens on the first `include`.
    pub fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Widen the interval to cover `value`. Never narrows.
    pub fn include(&mut self, value: f64) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    /// True until at least one value has been included.
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn merge(&mut self, other: &MinMax) {
        if !other.is_empty() {
            self.include(other.min);
            self.include(other.max);
        }
    }
}

impl Default for MinMax {
    fn default() -> Self {
        Self::new()
    }
}

/// Which visualization channel a metric selection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricTarget {
    /// The metric mapped to node color.
    Primary,
    /// The metric mapped to node size.
    Secondary,
}
