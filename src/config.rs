//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Session defaults and host-bridge wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// IQR multiplier used when mass pruning is first enabled.
    pub default_strictness: f64,
    /// Bridge variable holding the serialized forest definition.
    pub input_variable: String,
    /// Bridge variable receiving selection and snapshot queries.
    pub output_variable: String,
    /// Reset the working trees to the raw copies instead of the zero-filter
    /// baseline.
    pub raw_baseline: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_strictness: 1.5,
            input_variable: "hatchet_tree_def".to_string(),
            output_variable: "jsNodeSelected".to_string(),
            raw_baseline: false,
        }
    }
}
