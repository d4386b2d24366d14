use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use crate::sink::{LogLine, MetricDecl, MetricPoint, PointSink, Tags};
use crate::thresholds::{Observe, ThresholdAgg, ThresholdSet};
use crate::{Error, Result};

/// Trend samples are kept in the histogram with three decimal places.
const TREND_SCALE: f64 = 1000.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Trend,
    Counter,
    Rate,
    Gauge,
}

/// What a metric's values measure; drives formatting only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    Default,
    /// Milliseconds.
    Time,
    /// Bytes.
    Data,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    pub contains: ValueType,
    pub values: MetricValues,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValues {
    Trend {
        count: u64,
        sum: f64,
        min: Option<f64>,
        max: Option<f64>,
        avg: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
    },
    Counter {
        value: f64,
        /// Per second over the registry's lifetime.
        rate: f64,
    },
    Rate {
        total: u64,
        trues: u64,
        rate: Option<f64>,
    },
    Gauge {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
}

#[derive(Debug)]
struct TrendAgg {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    hist: Histogram<u64>,
}

impl TrendAgg {
    fn new() -> Result<Self> {
        Ok(Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            hist: Histogram::new_with_bounds(1, 3_600_000_000, 3)?,
        })
    }

    fn record(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let scaled = (value * TREND_SCALE).round().max(0.0) as u64;
        self.hist.saturating_record(scaled);
    }

    fn quantile(&self, q: f64) -> Option<f64> {
        (self.count > 0).then(|| self.hist.value_at_quantile(q) as f64 / TREND_SCALE)
    }

    fn summarize(&self) -> MetricValues {
        let seen = self.count > 0;
        MetricValues::Trend {
            count: self.count,
            sum: self.sum,
            min: seen.then_some(self.min),
            max: seen.then_some(self.max),
            avg: seen.then(|| self.sum / self.count as f64),
            p90: self.quantile(0.90),
            p95: self.quantile(0.95),
            p99: self.quantile(0.99),
        }
    }
}

#[derive(Debug)]
enum Agg {
    Trend(Box<TrendAgg>),
    Counter { sum: f64 },
    Rate { total: u64, trues: u64 },
    Gauge { last: f64, min: f64, max: f64, seen: bool },
}

#[derive(Debug)]
pub struct Metric {
    name: Arc<str>,
    kind: MetricKind,
    contains: ValueType,
    agg: Mutex<Agg>,
}

impl Metric {
    fn new(name: Arc<str>, kind: MetricKind, contains: ValueType) -> Result<Self> {
        let agg = match kind {
            MetricKind::Trend => Agg::Trend(Box::new(TrendAgg::new()?)),
            MetricKind::Counter => Agg::Counter { sum: 0.0 },
            MetricKind::Rate => Agg::Rate { total: 0, trues: 0 },
            MetricKind::Gauge => Agg::Gauge {
                last: 0.0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
                seen: false,
            },
        };
        Ok(Self {
            name,
            kind,
            contains,
            agg: Mutex::new(agg),
        })
    }

    fn record(&self, value: f64) {
        let mut agg = self.agg.lock();
        match &mut *agg {
            Agg::Trend(t) => t.record(value),
            Agg::Counter { sum } => *sum += value,
            Agg::Rate { total, trues } => {
                *total += 1;
                if value != 0.0 {
                    *trues += 1;
                }
            }
            Agg::Gauge {
                last,
                min,
                max,
                seen,
            } => {
                *last = value;
                *min = min.min(value);
                *max = max.max(value);
                *seen = true;
            }
        }
    }

    fn summarize(&self, elapsed_secs: f64) -> MetricSummary {
        let values = match &*self.agg.lock() {
            Agg::Trend(t) => t.summarize(),
            Agg::Counter { sum } => MetricValues::Counter {
                value: *sum,
                rate: if elapsed_secs > 0.0 {
                    *sum / elapsed_secs
                } else {
                    0.0
                },
            },
            Agg::Rate { total, trues } => MetricValues::Rate {
                total: *total,
                trues: *trues,
                rate: (*total > 0).then(|| *trues as f64 / *total as f64),
            },
            Agg::Gauge {
                last,
                min,
                max,
                seen,
            } => MetricValues::Gauge {
                value: *last,
                min: seen.then_some(*min),
                max: seen.then_some(*max),
            },
        };

        MetricSummary {
            name: self.name.to_string(),
            kind: self.kind,
            contains: self.contains,
            values,
        }
    }

    fn observe(&self, agg: ThresholdAgg, elapsed_secs: f64) -> Option<f64> {
        if let ThresholdAgg::P(p) = agg {
            return match &*self.agg.lock() {
                Agg::Trend(t) => t.quantile(p / 100.0),
                _ => None,
            };
        }

        match (self.summarize(elapsed_secs).values, agg) {
            (MetricValues::Trend { avg, .. }, ThresholdAgg::Avg) => avg,
            (MetricValues::Trend { min, .. }, ThresholdAgg::Min) => min,
            (MetricValues::Trend { max, .. }, ThresholdAgg::Max) => max,
            (MetricValues::Trend { count, .. }, ThresholdAgg::Count) => Some(count as f64),
            (MetricValues::Counter { value, .. }, ThresholdAgg::Count) => Some(value),
            (MetricValues::Counter { rate, .. }, ThresholdAgg::Rate) => Some(rate),
            (MetricValues::Rate { rate, .. }, ThresholdAgg::Rate) => rate,
            (MetricValues::Gauge { min, .. }, ThresholdAgg::Min) => min,
            (MetricValues::Gauge { max, .. }, ThresholdAgg::Max) => max,
            _ => None,
        }
    }
}

/// Cloneable recording handle for one registered metric.
#[derive(Debug, Clone)]
pub struct MetricHandle {
    metric: Arc<Metric>,
    sink: Option<PointSink>,
}

impl MetricHandle {
    pub fn name(&self) -> &str {
        &self.metric.name
    }

    pub fn kind(&self) -> MetricKind {
        self.metric.kind
    }

    /// Records one observation. Non-finite values are dropped without a point being written.
    pub fn add(&self, value: f64, tags: &Tags) {
        if !value.is_finite() {
            return;
        }
        self.metric.record(value);

        if let Some(sink) = &self.sink {
            sink.emit(LogLine::Point {
                metric: self.metric.name.clone(),
                data: MetricPoint {
                    time: Utc::now(),
                    value,
                    tags: tags.clone(),
                },
            });
        }
    }

    pub fn add_bool(&self, value: bool, tags: &Tags) {
        self.add(if value { 1.0 } else { 0.0 }, tags);
    }
}

/// Named metrics for one run. Owned by the run context; there is no global registry.
#[derive(Debug)]
pub struct MetricsRegistry {
    metrics: DashMap<Arc<str>, Arc<Metric>>,
    thresholds: HashMap<String, Vec<String>>,
    sink: Option<PointSink>,
    started: Instant,
}

impl MetricsRegistry {
    pub fn new(sink: Option<PointSink>, thresholds: &[ThresholdSet]) -> Self {
        let mut by_metric: HashMap<String, Vec<String>> = HashMap::new();
        for set in thresholds {
            by_metric
                .entry(set.metric.clone())
                .or_default()
                .extend(set.expressions.iter().cloned());
        }

        Self {
            metrics: DashMap::new(),
            thresholds: by_metric,
            sink,
            started: Instant::now(),
        }
    }

    pub fn trend(&self, name: &str, contains: ValueType) -> Result<MetricHandle> {
        self.handle(name, MetricKind::Trend, contains)
    }

    pub fn counter(&self, name: &str, contains: ValueType) -> Result<MetricHandle> {
        self.handle(name, MetricKind::Counter, contains)
    }

    pub fn rate(&self, name: &str) -> Result<MetricHandle> {
        self.handle(name, MetricKind::Rate, ValueType::Default)
    }

    pub fn gauge(&self, name: &str) -> Result<MetricHandle> {
        self.handle(name, MetricKind::Gauge, ValueType::Default)
    }

    /// Returns the existing metric when `name` is already registered with the same kind.
    pub fn handle(&self, name: &str, kind: MetricKind, contains: ValueType) -> Result<MetricHandle> {
        let metric = match self.metrics.entry(Arc::from(name)) {
            Entry::Occupied(e) => {
                let existing = e.get();
                if existing.kind != kind {
                    return Err(Error::MetricKindConflict {
                        name: name.to_string(),
                        existing: existing.kind,
                    });
                }
                existing.clone()
            }
            Entry::Vacant(e) => {
                let metric = Arc::new(Metric::new(e.key().clone(), kind, contains)?);
                self.declare(&metric);
                e.insert(metric.clone());
                metric
            }
        };

        Ok(MetricHandle {
            metric,
            sink: self.sink.clone(),
        })
    }

    fn declare(&self, metric: &Metric) {
        let Some(sink) = &self.sink else {
            return;
        };
        sink.emit(LogLine::Metric {
            metric: metric.name.clone(),
            data: MetricDecl {
                name: metric.name.clone(),
                kind: metric.kind,
                contains: metric.contains,
                thresholds: self
                    .thresholds
                    .get(metric.name.as_ref())
                    .cloned()
                    .unwrap_or_default(),
            },
        });
    }

    pub fn get(&self, name: &str) -> Option<MetricSummary> {
        let elapsed = self.started.elapsed().as_secs_f64();
        self.metrics.get(name).map(|m| m.summarize(elapsed))
    }

    /// All metrics, sorted by name.
    pub fn summarize(&self) -> Vec<MetricSummary> {
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut out: Vec<MetricSummary> = self
            .metrics
            .iter()
            .map(|m| m.value().summarize(elapsed))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl Observe for MetricsRegistry {
    fn observe(&self, metric: &str, agg: ThresholdAgg) -> Option<f64> {
        let elapsed = self.started.elapsed().as_secs_f64();
        self.metrics.get(metric)?.observe(agg, elapsed)
    }
}
