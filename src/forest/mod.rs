//! The forest: canonical immutable call trees, derived metric tables, and
//! the mutable working copies handed to the rest of the system.
//!
//! The immutable trees are built once at construction and never altered.
//! Every structural operation (prune, manual collapse/expand, compose)
//! produces a new working generation from a structural copy; holders of
//! node references from an earlier generation must treat them as dead, and
//! the mutators reject them loudly.

pub mod filters;
pub mod prune;
pub mod tree;

use crate::core::errors::{Error, Result};
use crate::core::MinMax;
use crate::forest::filters::ShowFilter;
use crate::forest::tree::{NodeId, Tree};
use crate::input::TreeDef;
use serde::Serialize;
use std::collections::BTreeMap;

/// Reference to one node of one working tree, stamped with the forest
/// generation it was minted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeRef {
    pub tree: usize,
    pub node: NodeId,
    pub generation: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Forest {
    immutable_trees: Vec<Tree>,
    pre_pruned_trees: Vec<Tree>,
    mutable_trees: Vec<Tree>,

    number_of_trees: usize,
    metric_columns: Vec<String>,
    attribute_columns: Vec<String>,
    root_node_names: Vec<String>,
    max_height: u32,

    forest_min_max: BTreeMap<String, MinMax>,
    /// Per-tree min/max tables, with the forest-wide table appended as the
    /// final element for uniform indexing.
    forest_metrics: Vec<BTreeMap<String, MinMax>>,
    aggregate_min_max: BTreeMap<String, MinMax>,

    /// When set, `reset_mutable` restores the raw trees instead of the
    /// zero-filter baseline.
    raw_baseline: bool,
    generation: u64,
}

impl Forest {
    /// Build the canonical trees and metric tables from parsed definitions.
    ///
    /// Fails fast on an empty forest or a first tree without the metric and
    /// attribute tables that seed the column lists.
    pub fn new(forest_def: &[TreeDef]) -> Result<Self> {
        let first = forest_def
            .first()
            .ok_or_else(|| Error::invalid_forest("empty forest definition"))?;
        let metrics = first
            .metrics
            .as_ref()
            .ok_or_else(|| Error::invalid_forest("first tree carries no metrics table"))?;
        let attributes = first
            .attributes
            .as_ref()
            .ok_or_else(|| Error::invalid_forest("first tree carries no attributes table"))?;

        // Private (underscore-prefixed) metrics stay in the data but are
        // excluded from the user-facing column list.
        let metric_columns: Vec<String> = metrics
            .keys()
            .filter(|name| !name.starts_with('_'))
            .cloned()
            .collect();
        if metric_columns.is_empty() {
            return Err(Error::invalid_forest(
                "first tree carries no public metric columns",
            ));
        }
        let attribute_columns: Vec<String> = attributes.keys().cloned().collect();

        let mut next_id = 0;
        let mut immutable_trees: Vec<Tree> = forest_def
            .iter()
            .map(|def| Tree::from_def(def, &mut next_id))
            .collect();

        // Largest tree first; the sort is stable and part of the observable
        // ordering contract.
        immutable_trees.sort_by(|a, b| b.size().cmp(&a.size()));

        let mut forest = Forest {
            mutable_trees: immutable_trees.clone(),
            pre_pruned_trees: Vec::new(),
            number_of_trees: forest_def.len(),
            metric_columns,
            attribute_columns,
            root_node_names: Vec::new(),
            max_height: 0,
            forest_min_max: BTreeMap::new(),
            forest_metrics: Vec::new(),
            aggregate_min_max: BTreeMap::new(),
            raw_baseline: false,
            generation: 0,
            immutable_trees,
        };
        forest.organize_metrics();
        Ok(forest)
    }

    /// Compute the per-tree and forest-wide min/max tables and seed the
    /// aggregate table.
    fn organize_metrics(&mut self) {
        let empty_row = || -> BTreeMap<String, MinMax> {
            self.metric_columns
                .iter()
                .map(|m| (m.clone(), MinMax::new()))
                .collect()
        };

        let mut forest_min_max = empty_row();
        for tree in &self.immutable_trees {
            self.root_node_names
                .push(tree.node(tree.root()).name().to_string());
            self.max_height = self.max_height.max(tree.height());

            let mut tree_row = empty_row();
            for id in tree.descendants() {
                let node = tree.node(id);
                for metric in &self.metric_columns {
                    let value = node.metric(metric);
                    tree_row.get_mut(metric).expect("seeded column").include(value);
                    forest_min_max
                        .get_mut(metric)
                        .expect("seeded column")
                        .include(value);
                }
            }
            self.forest_metrics.push(tree_row);
        }

        // Global min/max doubles as the final entry of forest_metrics.
        self.forest_min_max = forest_min_max.clone();
        self.forest_metrics.push(forest_min_max);

        self.aggregate_min_max = empty_row();
    }

    /// Build the zero-filter baseline: every tree with its zero-valued
    /// subtrees collapsed, stored apart from the raw copies so disabling
    /// manual pruning can fall back to it. Invoke once after construction,
    /// before any other mutation.
    pub fn initialize_pruned_trees(&mut self, primary_metric: &str) -> Result<()> {
        self.require_metric(primary_metric)?;

        let mut baseline = self.fresh_trees();
        for tree in baseline.iter_mut() {
            prune::prune_tree(
                tree,
                &self.metric_columns,
                &mut self.aggregate_min_max,
                primary_metric,
                &ShowFilter::Zero,
            );
        }
        // Index i keeps addressing the same tree across the raw, baseline,
        // and working lists; the construction-time size order stands.
        self.pre_pruned_trees = baseline.clone();
        self.mutable_trees = baseline;
        self.generation += 1;
        Ok(())
    }

    /// Discard the working trees and rebuild each from a fresh copy of its
    /// immutable tree under the given predicate. The working list is only
    /// replaced once the whole pass has succeeded.
    pub fn aggregate_tree_data(&mut self, primary_metric: &str, filter: &ShowFilter) -> Result<()> {
        self.require_metric(primary_metric)?;
        log::debug!(
            "aggregating {} trees over {:?} with {:?}",
            self.immutable_trees.len(),
            primary_metric,
            filter
        );

        let mut fresh = self.fresh_trees();
        for tree in fresh.iter_mut() {
            prune::prune_tree(
                tree,
                &self.metric_columns,
                &mut self.aggregate_min_max,
                primary_metric,
                filter,
            );
            prune::flatten_aggregate_prototypes(tree);
        }
        for (index, tree) in fresh.into_iter().enumerate() {
            self.mutable_trees[index] = tree;
        }
        self.generation += 1;
        Ok(())
    }

    /// Structural copies of the raw immutable trees.
    pub fn fresh_trees(&self) -> Vec<Tree> {
        self.immutable_trees.clone()
    }

    /// Structural copies of the zero-filter baseline. The arena copy is
    /// total, so aggregate markers and elided links survive as-is.
    pub fn baseline_trees(&self) -> Vec<Tree> {
        self.pre_pruned_trees.clone()
    }

    /// Reset the working trees to their authoritative baseline.
    pub fn reset_mutable(&mut self) {
        self.mutable_trees = if self.raw_baseline || self.pre_pruned_trees.is_empty() {
            self.fresh_trees()
        } else {
            self.baseline_trees()
        };
        self.generation += 1;
    }

    pub fn set_raw_baseline(&mut self, raw: bool) {
        self.raw_baseline = raw;
    }

    // ------------------------------------------------------------------
    // Manual surgery, driven by user interaction on single nodes.
    // ------------------------------------------------------------------

    /// Collapse one normal node into a degenerate single-element aggregate
    /// spliced into its parent's children at the same position. Returns the
    /// holder's id, or None when the operation is a no-op (root node,
    /// already-aggregate node, or a node that is not currently visible).
    pub fn collapse_node(&mut self, tree_index: usize, node: NodeId) -> Result<Option<NodeId>> {
        let tree = self
            .mutable_trees
            .get_mut(tree_index)
            .ok_or(Error::TreeIndex(tree_index))?;
        if !tree.contains(node) {
            return Err(Error::NodeIndex(node.index()));
        }
        if tree.node(node).is_aggregate() {
            return Ok(None);
        }
        let Some(parent) = tree.node(node).parent else {
            return Ok(None);
        };
        let Some(position) = tree.node(parent).children.iter().position(|&c| c == node) else {
            return Ok(None);
        };

        let holder = prune::build_aggregate_node(
            tree,
            &self.metric_columns,
            &mut self.aggregate_min_max,
            node,
            parent,
            vec![node],
        );
        let parent_node = tree.node_mut(parent);
        parent_node.children[position] = holder;
        parent_node.hidden.push(node);

        tree.refresh_size();
        self.generation += 1;
        Ok(Some(holder))
    }

    /// Expand an aggregate node back into the siblings it elided: a single
    /// member is spliced back in place, several are re-appended
    /// individually and the holder removed. An aggregate with no elided
    /// members, or a normal node, is a no-op.
    pub fn expand_node(&mut self, tree_index: usize, node: NodeId) -> Result<bool> {
        let tree = self
            .mutable_trees
            .get_mut(tree_index)
            .ok_or(Error::TreeIndex(tree_index))?;
        if !tree.contains(node) {
            return Err(Error::NodeIndex(node.index()));
        }
        let Some(data) = tree.node(node).aggregate() else {
            return Ok(false);
        };
        let elided = data.elided.clone();
        if elided.is_empty() {
            return Ok(false);
        }
        let Some(parent) = tree.node(node).parent else {
            return Ok(false);
        };

        let parent_node = tree.node_mut(parent);
        parent_node.hidden.retain(|h| !elided.contains(h));
        if elided.len() == 1 {
            if let Some(position) = parent_node.children.iter().position(|&c| c == node) {
                parent_node.children[position] = elided[0];
            }
        } else {
            parent_node.children.retain(|&c| c != node);
            parent_node.children.extend(elided.iter().copied());
        }
        for restored in elided {
            tree.node_mut(restored).parent = Some(parent);
        }

        tree.refresh_size();
        self.generation += 1;
        Ok(true)
    }

    /// Experimental: merge a node's subtree into its parent's visual
    /// representation by relinking its visible children one level up, with
    /// `true_parent` provenance so the operation can be inverted.
    pub fn compose_node(&mut self, tree_index: usize, node: NodeId) -> Result<bool> {
        let tree = self
            .mutable_trees
            .get_mut(tree_index)
            .ok_or(Error::TreeIndex(tree_index))?;
        if !tree.contains(node) {
            return Err(Error::NodeIndex(node.index()));
        }
        let Some(parent) = tree.node(node).parent else {
            return Ok(false);
        };
        let Some(position) = tree.node(parent).children.iter().position(|&c| c == node) else {
            return Ok(false);
        };

        let lifted = tree.node(node).children.clone();
        if lifted.is_empty() {
            return Ok(false);
        }
        for &child in &lifted {
            let child_node = tree.node_mut(child);
            child_node.true_parent = Some(node);
            child_node.parent = Some(parent);
        }
        for &child in &lifted {
            tree.shift_subtree_depth(child, -1);
        }

        let parent_node = tree.node_mut(parent);
        parent_node.children.remove(position);
        for (offset, &child) in lifted.iter().enumerate() {
            parent_node.children.insert(position + offset, child);
        }

        tree.refresh_size();
        self.generation += 1;
        Ok(true)
    }

    /// Experimental inverse of [`Forest::compose_node`]: reclaim the
    /// children carrying this node's provenance mark and splice the node
    /// back in their place.
    pub fn decompose_node(&mut self, tree_index: usize, node: NodeId) -> Result<bool> {
        let tree = self
            .mutable_trees
            .get_mut(tree_index)
            .ok_or(Error::TreeIndex(tree_index))?;
        if !tree.contains(node) {
            return Err(Error::NodeIndex(node.index()));
        }
        let Some(parent) = tree.node(node).parent else {
            return Ok(false);
        };

        let reclaimed: Vec<NodeId> = tree
            .node(parent)
            .children
            .iter()
            .copied()
            .filter(|&c| tree.node(c).true_parent == Some(node))
            .collect();
        if reclaimed.is_empty() {
            return Ok(false);
        }
        let position = tree
            .node(parent)
            .children
            .iter()
            .position(|c| reclaimed.contains(c))
            .expect("reclaimed children are present");

        let parent_node = tree.node_mut(parent);
        parent_node.children.retain(|c| !reclaimed.contains(c));
        parent_node.children.insert(position, node);

        for &child in &reclaimed {
            let child_node = tree.node_mut(child);
            child_node.true_parent = None;
            child_node.parent = Some(node);
        }
        for &child in &reclaimed {
            tree.shift_subtree_depth(child, 1);
        }
        tree.node_mut(node).children = reclaimed;

        tree.refresh_size();
        self.generation += 1;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn trees(&self) -> &[Tree] {
        &self.mutable_trees
    }

    pub fn current_tree(&self, index: usize) -> Option<&Tree> {
        self.mutable_trees.get(index)
    }

    pub fn set_current_tree(&mut self, index: usize, tree: Tree) -> Result<()> {
        let slot = self
            .mutable_trees
            .get_mut(index)
            .ok_or(Error::TreeIndex(index))?;
        *slot = tree;
        self.generation += 1;
        Ok(())
    }

    pub fn immutable_tree(&self, index: usize) -> Option<&Tree> {
        self.immutable_trees.get(index)
    }

    pub fn number_of_trees(&self) -> usize {
        self.number_of_trees
    }

    pub fn metric_columns(&self) -> &[String] {
        &self.metric_columns
    }

    pub fn attribute_columns(&self) -> &[String] {
        &self.attribute_columns
    }

    pub fn root_node_names(&self) -> &[String] {
        &self.root_node_names
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    pub fn forest_min_max(&self) -> &BTreeMap<String, MinMax> {
        &self.forest_min_max
    }

    /// Min/max per tree; the final entry is the forest-wide table.
    pub fn forest_metrics(&self) -> &[BTreeMap<String, MinMax>] {
        &self.forest_metrics
    }

    pub fn aggregate_min_max(&self) -> &BTreeMap<String, MinMax> {
        &self.aggregate_min_max
    }

    /// Current working-tree generation; bumped on every structural change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mint a reference to a node of the current generation.
    pub fn node_ref(&self, tree: usize, node: NodeId) -> NodeRef {
        NodeRef {
            tree,
            node,
            generation: self.generation,
        }
    }

    /// Reject references minted against an earlier generation or pointing
    /// outside the forest.
    pub fn check_ref(&self, reference: NodeRef) -> Result<()> {
        if reference.generation != self.generation {
            return Err(Error::StaleReference {
                expected: self.generation,
                found: reference.generation,
            });
        }
        let tree = self
            .current_tree(reference.tree)
            .ok_or(Error::TreeIndex(reference.tree))?;
        if !tree.contains(reference.node) {
            return Err(Error::NodeIndex(reference.node.index()));
        }
        Ok(())
    }

    pub(crate) fn require_metric(&self, metric: &str) -> Result<()> {
        if self.metric_columns.iter().any(|m| m == metric) {
            Ok(())
        } else {
            Err(Error::unknown_metric(metric))
        }
    }
}
