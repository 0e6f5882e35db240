//! Serde model of the forest-definition input.
//!
//! The data source serializes one object per call-tree root, each carrying a
//! frame label, a metric table, a categorical attribute table, and nested
//! children of the same shape. Both the nested `frame: {name}` spelling and
//! a flat `name` field are accepted.

use crate::core::errors::Result;
use crate::core::{AttributeMap, MetricMap};
use serde::Deserialize;

/// Call-site frame label. Extra frame keys from the data source are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameDef {
    pub name: String,
}

/// One node of a call-tree definition.
///
/// `metrics` and `attributes` are optional so a first tree genuinely missing
/// them can be rejected at forest construction; deeper nodes default both to
/// empty tables.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeDef {
    #[serde(default)]
    pub frame: Option<FrameDef>,
    #[serde(default)]
    pub name: Option<String>,
    pub metrics: Option<MetricMap>,
    pub attributes: Option<AttributeMap>,
    #[serde(default)]
    pub children: Vec<TreeDef>,
}

impl TreeDef {
    /// Display label for this call site.
    pub fn display_name(&self) -> &str {
        self.frame
            .as_ref()
            .map(|f| f.name.as_str())
            .or(self.name.as_deref())
            .unwrap_or("<unknown>")
    }
}

/// Parse a serialized forest definition: a JSON array of root objects.
pub fn parse_forest(json: &str) -> Result<Vec<TreeDef>> {
    Ok(serde_json::from_str(json)?)
}
