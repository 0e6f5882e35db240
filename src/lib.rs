// Export modules for library usage
pub mod bridge;
pub mod config;
pub mod core;
pub mod forest;
pub mod input;
pub mod model;
pub mod stats;

// Re-export commonly used types
pub use crate::bridge::{MemoryBridge, VariableBridge};
pub use crate::config::EngineConfig;
pub use crate::core::errors::{Error, Result};
pub use crate::core::{AttributeMap, MetricMap, MetricTarget, MinMax};
pub use crate::forest::filters::ShowFilter;
pub use crate::forest::tree::{
    AggregateData, FrameData, Node, NodeId, NodeKind, SubtreeDescription, Tree,
};
pub use crate::forest::{Forest, NodeRef};
pub use crate::input::{parse_forest, FrameDef, TreeDef};
pub use crate::model::{
    ActiveTree, ColorScheme, Legend, Model, ModelState, PruneRequest, SelectionQuery,
};
