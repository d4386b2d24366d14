use lessonload_core::{ThresholdSet, evaluate_thresholds};

use crate::Result;
use crate::ingest::MetricSeries;

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdVerdict {
    /// `checkout_duration p(95)<2000`
    pub label: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Re-evaluates the declared thresholds over the ingested values with nearest-rank percentiles.
/// A metric missing from the results fails its expressions.
pub fn verdicts(series: &MetricSeries, sets: &[ThresholdSet]) -> Result<Vec<ThresholdVerdict>> {
    Ok(evaluate_thresholds(series, sets)?
        .into_iter()
        .map(|o| ThresholdVerdict {
            label: o.label(),
            observed: o.observed,
            passed: o.passed,
        })
        .collect())
}
