//! Order statistics over metric-bearing records.
//!
//! Operates on slices of per-node metric maps rather than bare numbers so
//! that callers can hand over node records directly and name the column to
//! rank by.

use crate::core::MetricMap;
use std::cmp::Ordering;

/// Read one metric from a record, treating a missing column as zero.
pub fn metric_value(record: &MetricMap, metric: &str) -> f64 {
    record.get(metric).copied().unwrap_or(0.0)
}

fn ascending(records: &[&MetricMap], metric: &str) -> Vec<f64> {
    let mut values: Vec<f64> = records.iter().map(|r| metric_value(r, metric)).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    values
}

/// Linearly interpolated quantile at fractional rank `q` in `[0, 1]`,
/// ranking records by `metric` (R-7: `pos = (n - 1) * q`, interpolating
/// between the neighboring order statistics).
///
/// Returns NaN for an empty slice; callers that cannot tolerate the
/// degenerate case must guard first.
pub fn quantile(records: &[&MetricMap], q: f64, metric: &str) -> f64 {
    if records.is_empty() {
        return f64::NAN;
    }
    let sorted = ascending(records, metric);
    let pos = (sorted.len() - 1) as f64 * q;
    let base = pos.floor() as usize;
    let rest = pos - base as f64;
    match sorted.get(base + 1) {
        Some(next) => sorted[base] + rest * (next - sorted[base]),
        None => sorted[base],
    }
}

/// Interquartile range of `metric` across the records.
///
/// NaN on an empty slice signals that no variance data is available;
/// the outlier predicate then classifies nothing as an outlier.
pub fn interquartile_range(records: &[&MetricMap], metric: &str) -> f64 {
    if records.is_empty() {
        return f64::NAN;
    }
    quantile(records, 0.75, metric) - quantile(records, 0.25, metric)
}
