use std::collections::BTreeMap;

use lessonload_core::{Observe, ThresholdAgg};

use crate::ingest::MetricSeries;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatSummary {
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Nearest-rank percentile over an ascending slice: `sorted[floor(N * p)]`, clamped to the last
/// element. No interpolation.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0.0;
    };
    let idx = (sorted.len() as f64 * p).floor() as usize;
    sorted[idx.min(last)]
}

/// Empty input yields an all-zero summary.
pub fn compute(values: &[f64]) -> StatSummary {
    if values.is_empty() {
        return StatSummary::default();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let sum: f64 = sorted.iter().sum();
    StatSummary {
        count: sorted.len() as u64,
        sum,
        avg: sum / sorted.len() as f64,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        p90: percentile(&sorted, 0.90),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
    }
}

pub fn compute_all(series: &MetricSeries) -> BTreeMap<String, StatSummary> {
    series
        .iter()
        .map(|(name, values)| (name.to_string(), compute(values)))
        .collect()
}

impl Observe for MetricSeries {
    fn observe(&self, metric: &str, agg: ThresholdAgg) -> Option<f64> {
        let values = self.get(metric).filter(|v| !v.is_empty())?;
        if let ThresholdAgg::P(p) = agg {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            return Some(percentile(&sorted, p / 100.0));
        }

        let s = compute(values);
        Some(match agg {
            ThresholdAgg::Avg | ThresholdAgg::Rate => s.avg,
            ThresholdAgg::Min => s.min,
            ThresholdAgg::Max => s.max,
            ThresholdAgg::Count if self.is_counter(metric) => s.sum,
            ThresholdAgg::Count => s.count as f64,
            ThresholdAgg::P(_) => return None,
        })
    }
}
