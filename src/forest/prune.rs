//! Pruning and aggregation passes.
//!
//! A pass sets show flags with the active [`ShowFilter`], folds them into a
//! bottom-up show-sum, then walks top-down eliding every child subtree whose
//! sum is below threshold. Elided siblings are collapsed into exactly one
//! synthetic aggregate node appended to the surviving children, so an
//! ancestor of any shown node always stays visible.

use crate::core::{MetricMap, MinMax};
use crate::forest::filters::ShowFilter;
use crate::forest::tree::{AggregateData, Node, NodeId, NodeKind, SubtreeDescription, Tree};
use std::collections::BTreeMap;

/// Show-sum threshold below which a child subtree is elided.
const KEEP_THRESHOLD: f64 = 1.0;

/// Flag, fold, and collapse one tree in place, then refresh its node-count
/// cache.
pub(crate) fn prune_tree(
    tree: &mut Tree,
    metric_columns: &[String],
    aggregate_min_max: &mut BTreeMap<String, MinMax>,
    primary_metric: &str,
    filter: &ShowFilter,
) {
    filter.apply(tree, primary_metric);
    // The sum keeps ancestors of shown nodes from being pruned away.
    tree.sum_show();
    pruning_visitor(
        tree,
        tree.root(),
        KEEP_THRESHOLD,
        metric_columns,
        aggregate_min_max,
    );
    tree.refresh_size();
}

/// Recursive elision pass over the children of `root`.
///
/// Children whose show-sum falls below `threshold` move from the visible
/// list to the hidden list and are collected into one sibling group; the
/// group is summarized by an aggregate node appended after the surviving
/// children have been processed. A node left without children becomes a
/// leaf.
fn pruning_visitor(
    tree: &mut Tree,
    root: NodeId,
    threshold: f64,
    metric_columns: &[String],
    aggregate_min_max: &mut BTreeMap<String, MinMax>,
) {
    if tree.node(root).children.is_empty() {
        return;
    }

    let children = tree.node(root).children.clone();
    let mut kept = Vec::with_capacity(children.len());
    let mut elided = Vec::new();
    for child in children {
        if tree.node(child).value < threshold {
            elided.push(child);
        } else {
            kept.push(child);
        }
    }

    if !elided.is_empty() {
        let node = tree.node_mut(root);
        node.children = kept.clone();
        node.hidden.extend(elided.iter().copied());
    }

    for &child in &kept {
        pruning_visitor(tree, child, threshold, metric_columns, aggregate_min_max);
    }

    if !elided.is_empty() && !tree.node(root).is_aggregate() {
        let prototype = elided[0];
        let holder = build_aggregate_node(
            tree,
            metric_columns,
            aggregate_min_max,
            prototype,
            root,
            elided,
        );
        tree.node_mut(root).children.push(holder);
    }
}

/// Build a synthetic node summarizing `elided` sibling subtrees under
/// `parent`, widening `aggregate_min_max` with the group's values.
///
/// For ordinary metrics the group value is the mean of per-subtree sums; an
/// aggregate descendant contributes its already-aggregated value rather
/// than being re-walked. Metrics whose name contains `"(inc)"` are already
/// subtree-inclusive, so the group shows the representative prototype's own
/// value instead of a re-aggregation.
// TODO: confirm with the data owners whether inclusive metrics should take
// the max across the elided group rather than the representative's value,
// which undercounts when the representative is not the largest subtree.
pub(crate) fn build_aggregate_node(
    tree: &mut Tree,
    metric_columns: &[String],
    aggregate_min_max: &mut BTreeMap<String, MinMax>,
    prototype: NodeId,
    parent: NodeId,
    elided: Vec<NodeId>,
) -> NodeId {
    debug_assert!(!elided.is_empty(), "aggregate of an empty sibling group");

    let mut description = SubtreeDescription {
        size: 0,
        elided_subtrees: elided.len(),
        max_height: 0,
        min_height: u32::MAX,
    };
    for &subtree in &elided {
        let height = tree.node(subtree).height;
        description.size += tree.subtree_node_count(subtree);
        description.max_height = description.max_height.max(height);
        description.min_height = description.min_height.min(height);
    }

    let mut metrics = MetricMap::new();
    for metric in metric_columns {
        let value = if metric.contains("(inc)") {
            tree.node(prototype).metric(metric)
        } else {
            let sum: f64 = elided
                .iter()
                .map(|&subtree| tree.subtree_metric_sum(subtree, metric))
                .sum();
            sum / elided.len() as f64
        };
        metrics.insert(metric.clone(), value);
        aggregate_min_max
            .entry(metric.clone())
            .or_default()
            .include(value);
    }

    let proto = tree.node(prototype);
    let node = Node {
        id: proto.id,
        depth: proto.depth,
        height: proto.height,
        parent: Some(parent),
        children: Vec::new(),
        hidden: Vec::new(),
        show: false,
        value: 0.0,
        true_parent: None,
        kind: NodeKind::Aggregate(AggregateData {
            prototype,
            elided,
            metrics,
            description,
            nid: proto.stable_nid(),
            name: proto.name().to_string(),
        }),
    };
    tree.push_node(node)
}

/// Re-link any aggregate node whose prototype is itself an aggregate to
/// that prototype's own prototype, flattening incidental double-wrapping
/// left behind by repeated prune passes.
pub(crate) fn flatten_aggregate_prototypes(tree: &mut Tree) {
    for id in tree.descendants() {
        let Some(prototype) = tree.node(id).aggregate().map(|a| a.prototype) else {
            continue;
        };
        let Some(target) = tree.node(prototype).aggregate().map(|a| a.prototype) else {
            continue;
        };
        if let NodeKind::Aggregate(data) = &mut tree.node_mut(id).kind {
            data.prototype = target;
        }
    }
}
