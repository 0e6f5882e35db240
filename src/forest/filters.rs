//! Show-flag policies.
//!
//! Each policy visits every node of one tree and decides whether that node's
//! own metric value is worth displaying, independent of its descendants.
//! Policies are plain data so a session can serialize, log, and replay the
//! predicate that produced a given view.

use crate::core::MetricMap;
use crate::forest::tree::Tree;
use crate::stats;
use serde::{Deserialize, Serialize};

/// Display predicate applied before a pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ShowFilter {
    /// Keep any node with a nonzero value. Zeros are too numerous in
    /// measured profiles to be interesting on their own.
    Zero,
    /// Keep statistical outliers: nonzero values at or beyond
    /// `q25 - strictness * IQR` / `q75 + strictness * IQR`, computed over
    /// the tree's nonzero records.
    Outlier { strictness: f64 },
    /// Keep nonzero values inside the inclusive `[low, high]` window.
    Range { low: f64, high: f64 },
}

impl ShowFilter {
    /// Set every node's `show` flag according to this policy.
    pub fn apply(&self, tree: &mut Tree, metric: &str) {
        match *self {
            ShowFilter::Zero => {
                for id in tree.descendants() {
                    let keep = tree.node(id).metric(metric) != 0.0;
                    tree.node_mut(id).show = keep;
                }
            }
            ShowFilter::Outlier { strictness } => apply_outlier(tree, metric, strictness),
            ShowFilter::Range { low, high } => {
                for id in tree.descendants() {
                    let value = tree.node(id).metric(metric);
                    tree.node_mut(id).show = value != 0.0 && value >= low && value <= high;
                }
            }
        }
    }
}

fn apply_outlier(tree: &mut Tree, metric: &str, strictness: f64) {
    let ids = tree.descendants();

    let records: Vec<&MetricMap> = ids
        .iter()
        .filter_map(|&id| tree.node(id).frame())
        .filter(|frame| stats::metric_value(&frame.metrics, metric) != 0.0)
        .map(|frame| &frame.metrics)
        .collect();

    let iqr = stats::interquartile_range(&records, metric);
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    if !iqr.is_nan() {
        upper = stats::quantile(&records, 0.75, metric) + iqr * strictness;
        lower = stats::quantile(&records, 0.25, metric) - iqr * strictness;
    }

    // NaN IQR leaves the thresholds infinite: nothing is an outlier.
    for id in ids {
        let value = tree.node(id).metric(metric);
        tree.node_mut(id).show = value != 0.0 && (value >= upper || value <= lower);
    }
}
