//! Session state wrapper around the forest.
//!
//! The model owns user-driven state (metric selection, prune range,
//! selection, display toggles), delegates structural operations to the
//! forest, and notifies registered observers synchronously after every
//! mutation. It renders nothing itself; views read the working trees
//! through `model.forest()` and consume the dirty flags.

pub mod query;
pub mod table;

use crate::bridge::VariableBridge;
use crate::config::EngineConfig;
use crate::core::errors::{Error, Result};
use crate::core::MetricTarget;
use crate::forest::filters::ShowFilter;
use crate::forest::{Forest, NodeRef};
use crate::input::{parse_forest, TreeDef};
use serde::Serialize;

pub use query::SelectionQuery;

const DEFAULT_TIP_TEXT: &str = r#"<p>Click a node or "Select nodes" to see more info</p>"#;

/// Legend layout toggled by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Legend {
    #[default]
    Unified,
    Individual,
}

impl Legend {
    pub fn next(self) -> Self {
        match self {
            Legend::Unified => Legend::Individual,
            Legend::Individual => Legend::Unified,
        }
    }
}

/// Color mapping direction toggled by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ColorScheme {
    #[default]
    Standard,
    Inverted,
}

impl ColorScheme {
    pub fn next(self) -> Self {
        match self {
            ColorScheme::Standard => ColorScheme::Inverted,
            ColorScheme::Inverted => ColorScheme::Standard,
        }
    }
}

/// Which tree the display focuses on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum ActiveTree {
    #[default]
    All,
    Tree(String),
}

/// A user request to re-prune the working trees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PruneRequest {
    /// Outlier pruning at the given IQR strictness multiplier.
    Strictness(f64),
    /// Range pruning to the inclusive metric window.
    Range { low: f64, high: f64 },
}

/// User-facing session state. Views read this; only the model writes it.
#[derive(Debug, Clone, Serialize)]
pub struct ModelState {
    pub primary_metric: String,
    pub secondary_metric: String,
    pub selected: Vec<NodeRef>,
    pub last_clicked: Option<NodeRef>,
    pub active_tree: ActiveTree,
    pub legend: Legend,
    pub color_scheme: ColorScheme,
    pub brush_on: bool,
    pub prune_enabled: bool,
    pub current_strictness: f64,
    pub prune_range: (f64, f64),
    pub hierarchy_updated: bool,
    pub metric_updated: bool,
    pub reset_view: bool,
    pub tip_text: String,
    pub stored_query: String,
    /// Nodes composed away from the display, pending decomposition.
    pub composed: Vec<NodeRef>,
}

type Observer = Box<dyn FnMut() -> anyhow::Result<()>>;

pub struct Model {
    forest: Forest,
    state: ModelState,
    config: EngineConfig,
    observers: Vec<Observer>,
    bridge: Option<Box<dyn VariableBridge>>,
}

impl Model {
    /// Build a session from parsed tree definitions: construct the forest,
    /// pick default metrics, and install the zero-filter baseline.
    pub fn new(forest_def: &[TreeDef], config: EngineConfig) -> Result<Self> {
        let mut forest = Forest::new(forest_def)?;
        forest.set_raw_baseline(config.raw_baseline);

        let primary_metric = forest.metric_columns()[0].clone();
        let secondary_metric = forest
            .metric_columns()
            .get(1)
            .unwrap_or(&primary_metric)
            .clone();
        forest.initialize_pruned_trees(&primary_metric)?;

        let prune_range = default_prune_range(&forest, &primary_metric);
        let last_clicked = forest
            .current_tree(0)
            .map(|tree| forest.node_ref(0, tree.root()));

        Ok(Model {
            state: ModelState {
                primary_metric,
                secondary_metric,
                selected: Vec::new(),
                last_clicked,
                active_tree: ActiveTree::All,
                legend: Legend::default(),
                color_scheme: ColorScheme::default(),
                brush_on: false,
                prune_enabled: false,
                current_strictness: config.default_strictness,
                prune_range,
                hierarchy_updated: true,
                metric_updated: true,
                reset_view: false,
                tip_text: DEFAULT_TIP_TEXT.to_string(),
                stored_query: SelectionQuery::All.to_query_string(),
                composed: Vec::new(),
            },
            config,
            observers: Vec::new(),
            bridge: None,
            forest,
        })
    }

    /// Build a session from a serialized forest definition.
    pub fn from_json(json: &str, config: EngineConfig) -> Result<Self> {
        let defs = parse_forest(json)?;
        Self::new(&defs, config)
    }

    /// Build a session by reading the forest definition from the host
    /// bridge's input variable; queries are written back through the same
    /// bridge.
    pub fn from_bridge(bridge: Box<dyn VariableBridge>, config: EngineConfig) -> Result<Self> {
        let json = bridge
            .fetch(&config.input_variable)
            .ok_or_else(|| Error::MissingVariable(config.input_variable.clone()))?;
        let mut model = Self::from_json(&json, config)?;
        model.bridge = Some(bridge);
        Ok(model)
    }

    /// Attach (or replace) the host bridge after construction.
    pub fn set_bridge(&mut self, bridge: Box<dyn VariableBridge>) {
        self.bridge = Some(bridge);
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mint a node reference against the current tree generation.
    pub fn node_ref(&self, tree: usize, node: crate::forest::tree::NodeId) -> NodeRef {
        self.forest.node_ref(tree, node)
    }

    /// Subscribe a callback invoked synchronously after every mutation.
    /// A failing subscriber is logged and does not stop the fan-out.
    pub fn register<F>(&mut self, callback: F)
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        self.observers.push(Box::new(callback));
    }

    fn notify(&mut self) {
        for (index, observer) in self.observers.iter_mut().enumerate() {
            if let Err(error) = observer() {
                log::warn!("observer {} failed: {:#}", index, error);
            }
        }
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Change the primary or secondary metric. A primary change while
    /// pruning is enabled resets the working trees and recomputes the
    /// prune-range defaults from the new metric's distribution.
    pub fn change_metric(&mut self, new_metric: &str, target: MetricTarget) -> Result<()> {
        self.forest.require_metric(new_metric)?;

        match target {
            MetricTarget::Primary => {
                let changed = self.state.primary_metric != new_metric;
                self.state.primary_metric = new_metric.to_string();
                if changed && self.state.prune_enabled {
                    self.forest.reset_mutable();
                    self.state.composed.clear();
                    self.state.prune_range = default_prune_range(&self.forest, new_metric);
                    self.state.hierarchy_updated = true;
                }
            }
            MetricTarget::Secondary => {
                self.state.secondary_metric = new_metric.to_string();
            }
        }
        self.state.metric_updated = true;
        self.notify();
        Ok(())
    }

    /// Enable mass pruning at the given strictness, or disable it and fall
    /// back to the pre-pruned baseline.
    pub fn enable_prune_tree(&mut self, enabled: bool, strictness: f64) -> Result<()> {
        if enabled {
            self.state.prune_enabled = true;
            self.state.current_strictness = strictness;
            let primary = self.state.primary_metric.clone();
            self.forest
                .aggregate_tree_data(&primary, &ShowFilter::Outlier { strictness })?;
        } else {
            self.state.prune_enabled = false;
            self.forest.reset_mutable();
        }
        self.state.composed.clear();
        self.state.hierarchy_updated = true;
        self.notify();
        Ok(())
    }

    /// Re-prune the working trees. The zero filter always runs first so the
    /// requested policy starts from a zero-free view.
    pub fn prune_tree(&mut self, request: PruneRequest) -> Result<()> {
        let primary = self.state.primary_metric.clone();
        let filter = match request {
            PruneRequest::Strictness(strictness) => {
                self.state.current_strictness = strictness;
                ShowFilter::Outlier { strictness }
            }
            PruneRequest::Range { low, high } => {
                self.state.prune_range = (low, high);
                ShowFilter::Range { low, high }
            }
        };

        self.forest.aggregate_tree_data(&primary, &ShowFilter::Zero)?;
        self.forest.aggregate_tree_data(&primary, &filter)?;

        self.state.composed.clear();
        self.state.hierarchy_updated = true;
        self.notify();
        Ok(())
    }

    /// Store a new prune range from the slider and re-prune to it.
    pub fn update_prune_range(&mut self, low: f64, high: f64) -> Result<()> {
        self.prune_tree(PruneRequest::Range { low, high })
    }

    /// Toggle single-node collapse/expand: a normal node is folded into a
    /// degenerate aggregate, an aggregate unfolds the siblings it elided.
    pub fn handle_double_click(&mut self, target: NodeRef) -> Result<()> {
        self.forest.check_ref(target)?;

        let is_aggregate = self
            .forest
            .current_tree(target.tree)
            .map(|tree| tree.node(target.node).is_aggregate())
            .unwrap_or(false);
        if is_aggregate {
            self.forest.expand_node(target.tree, target.node)?;
        } else {
            self.forest.collapse_node(target.tree, target.node)?;
        }

        self.state.last_clicked = Some(self.forest.node_ref(target.tree, target.node));
        self.state.hierarchy_updated = true;
        self.notify();
        Ok(())
    }

    /// Experimental: merge a node's subtree into its parent's visual
    /// representation.
    pub fn handle_node_composition(&mut self, target: NodeRef) -> Result<()> {
        self.forest.check_ref(target)?;
        if self.forest.compose_node(target.tree, target.node)? {
            self.state
                .composed
                .push(self.forest.node_ref(target.tree, target.node));
            self.state.hierarchy_updated = true;
        }
        self.notify();
        Ok(())
    }

    /// Experimental inverse of [`Model::handle_node_composition`].
    pub fn handle_node_decomposition(&mut self, target: NodeRef) -> Result<()> {
        self.forest.check_ref(target)?;
        if self.forest.decompose_node(target.tree, target.node)? {
            self.state
                .composed
                .retain(|r| !(r.tree == target.tree && r.node == target.node));
            self.state.hierarchy_updated = true;
        }
        self.notify();
        Ok(())
    }

    /// Store the user's selection, refresh the tooltip, and regenerate the
    /// filter query written to the host bridge.
    pub fn update_selected(&mut self, nodes: Vec<NodeRef>) -> Result<()> {
        for reference in &nodes {
            self.forest.check_ref(*reference)?;
        }

        self.state.tip_text = if nodes.is_empty() {
            DEFAULT_TIP_TEXT.to_string()
        } else {
            table::node_table_html(&self.forest, &nodes)
        };

        let query = query::selection_query(&self.forest, &nodes);
        self.state.stored_query = query.to_query_string();
        self.state.selected = nodes;

        if let Some(bridge) = self.bridge.as_mut() {
            bridge.store(&self.config.output_variable, self.state.stored_query.clone());
        }
        self.notify();
        Ok(())
    }

    /// Forward a brush result to the selection; a cleared brush empties it.
    pub fn set_brushed_points(&mut self, selection: Option<Vec<NodeRef>>) -> Result<()> {
        self.update_selected(selection.unwrap_or_default())
    }

    /// Serialize the visible-leaf set plus composed-away nodes into a
    /// filter expression and write it to the host bridge.
    pub fn store_snapshot_query(&mut self) -> String {
        let snapshot = query::snapshot_query(&self.forest, &self.state.composed);
        self.state.stored_query = snapshot.clone();
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.store(&self.config.output_variable, snapshot.clone());
        }
        self.notify();
        snapshot
    }

    pub fn toggle_brush(&mut self) {
        self.state.brush_on = !self.state.brush_on;
        self.notify();
    }

    pub fn change_color_scheme(&mut self) {
        self.state.color_scheme = self.state.color_scheme.next();
        self.notify();
    }

    pub fn update_legends(&mut self) {
        self.state.legend = self.state.legend.next();
        self.notify();
    }

    pub fn update_active_tree(&mut self, active: ActiveTree) {
        self.state.active_tree = active;
        self.notify();
    }

    /// Ask the views to restore their original layouts.
    pub fn reset_view(&mut self) {
        self.state.reset_view = true;
        self.notify();
    }

    // ------------------------------------------------------------------
    // Dirty-flag consumption for the render layer
    // ------------------------------------------------------------------

    pub fn consume_hierarchy_updated(&mut self) -> bool {
        std::mem::take(&mut self.state.hierarchy_updated)
    }

    pub fn consume_metric_updated(&mut self) -> bool {
        std::mem::take(&mut self.state.metric_updated)
    }

    pub fn consume_reset_view(&mut self) -> bool {
        std::mem::take(&mut self.state.reset_view)
    }

    /// HTML table for an arbitrary selection, as shown in tooltips.
    pub fn node_table_html(&self, nodes: &[NodeRef]) -> String {
        table::node_table_html(&self.forest, nodes)
    }
}

fn default_prune_range(forest: &Forest, metric: &str) -> (f64, f64) {
    forest
        .forest_min_max()
        .get(metric)
        .filter(|mm| !mm.is_empty())
        .map(|mm| (mm.min, mm.max))
        .unwrap_or((0.0, 0.0))
}
