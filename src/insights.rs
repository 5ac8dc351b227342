//! Insight report shapes shared by every engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured insight object handed to presentation layers
///
/// `O` carries engine-wide aggregates, `S` the per-segment statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport<O, S = SegmentSummary> {
    pub overall: O,
    pub segments: BTreeMap<String, S>,
    pub recommendations: BTreeMap<String, Vec<String>>,
}

/// Size and value of one segment relative to the whole population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub customer_count: usize,
    pub avg_value: f64,
    pub total_value: f64,
    /// Share of the population total, in percent
    pub contribution_pct: f64,
}

/// Summarize `(segment, value)` pairs into per-segment statistics
pub fn summarize_segments<'a, I>(rows: I) -> BTreeMap<String, SegmentSummary>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut totals: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    for (segment, value) in rows {
        let entry = totals.entry(segment.to_string()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += value;
    }

    let grand_total: f64 = totals.values().map(|(_, total)| total).sum();
    totals
        .into_iter()
        .map(|(segment, (count, total))| {
            let summary = SegmentSummary {
                customer_count: count,
                avg_value: total / count as f64,
                total_value: total,
                contribution_pct: if grand_total > 0.0 {
                    total / grand_total * 100.0
                } else {
                    0.0
                },
            };
            (segment, summary)
        })
        .collect()
}

/// Turn `(segment, actions)` literals into an owned recommendation map
pub fn recommendation_map(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(segment, actions)| {
            (
                segment.to_string(),
                actions.iter().map(|action| action.to_string()).collect(),
            )
        })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
