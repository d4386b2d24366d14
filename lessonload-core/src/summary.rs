use std::time::Duration;

use crate::checks::CheckSummary;
use crate::metrics::{MetricSummary, MetricValues};
use crate::thresholds::ThresholdOutcome;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_duration: Duration,
    /// Sorted by name.
    pub metrics: Vec<MetricSummary>,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
}

impl RunSummary {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn checks_failed(&self) -> u64 {
        self.checks.iter().map(|c| c.fails).sum()
    }

    pub fn checks_total(&self) -> u64 {
        self.checks.iter().map(CheckSummary::total).sum()
    }

    /// Value of a counter metric, 0 when it never fired.
    pub fn counter_total(&self, name: &str) -> f64 {
        match self.metric(name).map(|m| &m.values) {
            Some(MetricValues::Counter { value, .. }) => *value,
            _ => 0.0,
        }
    }
}
