use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

#[derive(Debug, Default)]
struct CheckCounters {
    /// Registration order.
    seq: u64,
    passes: AtomicU64,
    fails: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// Pass/fail counters per check name.
#[derive(Debug, Default)]
pub struct CheckTracker {
    by_name: DashMap<Arc<str>, Arc<CheckCounters>>,
    next_seq: AtomicU64,
}

impl CheckTracker {
    pub fn record(&self, name: &str, passed: bool) {
        let counters = match self.by_name.get(name) {
            Some(c) => c.clone(),
            None => self
                .by_name
                .entry(Arc::from(name))
                .or_insert_with(|| {
                    Arc::new(CheckCounters {
                        seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                        ..CheckCounters::default()
                    })
                })
                .value()
                .clone(),
        };

        if passed {
            counters.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.fails.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn failed_total(&self) -> u64 {
        self.by_name
            .iter()
            .map(|c| c.fails.load(Ordering::Relaxed))
            .sum()
    }

    /// In first-seen order, matching the order checks appear in the result log.
    pub fn summarize(&self) -> Vec<CheckSummary> {
        let mut out: Vec<(u64, CheckSummary)> = self
            .by_name
            .iter()
            .map(|e| {
                let summary = CheckSummary {
                    name: e.key().to_string(),
                    passes: e.passes.load(Ordering::Relaxed),
                    fails: e.fails.load(Ordering::Relaxed),
                };
                (e.seq, summary)
            })
            .collect();
        out.sort_by_key(|(seq, _)| *seq);
        out.into_iter().map(|(_, s)| s).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_passes_and_failures_per_name() {
        let tracker = CheckTracker::default();
        tracker.record("Lesson status 201", true);
        tracker.record("Lesson status 201", true);
        tracker.record("Lesson title correct", false);

        assert_eq!(tracker.failed_total(), 1);
        assert_eq!(
            tracker.summarize(),
            vec![
                CheckSummary {
                    name: "Lesson status 201".to_string(),
                    passes: 2,
                    fails: 0,
                },
                CheckSummary {
                    name: "Lesson title correct".to_string(),
                    passes: 0,
                    fails: 1,
                },
            ]
        );
    }

    #[test]
    fn summary_keeps_first_seen_order() {
        let tracker = CheckTracker::default();
        tracker.record("Register status 201", true);
        tracker.record("login 200", true);
        tracker.record("has token", true);
        tracker.record("Lesson status 201", false);
        tracker.record("login 200", true);

        let names: Vec<String> = tracker.summarize().into_iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            ["Register status 201", "login 200", "has token", "Lesson status 201"]
        );
    }
}
