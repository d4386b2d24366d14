use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use lessonload_core::{MetricValues, ProgressUpdate, RunSummary};
use serde::Serialize;

use super::OutputFormatter;
use crate::options::LoadOptions;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _base_url: &str, _options: &LoadOptions) {}

    fn progress(&self) -> Option<lessonload_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, summary: &RunSummary, results: &Path) -> anyhow::Result<()> {
        let line = build_summary_line(summary, results);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub total_secs: f64,
    /// 1-based.
    pub stage: Option<usize>,
    pub target_vus: Option<u64>,
    pub active_vus: u64,
    pub max_vus: u64,

    pub requests_total: u64,
    pub requests_per_sec: f64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub checks_failed_total: u64,
    pub latency_p95_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub run_duration_secs: f64,
    pub results: String,

    pub iterations_total: f64,
    pub requests_total: f64,
    pub checks_total: u64,
    pub checks_failed: u64,
    pub checks_failed_by_name: BTreeMap<String, u64>,

    pub thresholds_passed: bool,
    pub thresholds: Vec<JsonThreshold>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_secs: u.total_duration.as_secs_f64(),
        stage: u.stage.as_ref().map(|s| s.index + 1),
        target_vus: u.stage.as_ref().map(|s| s.current_target),
        active_vus: u.metrics.active_vus,
        max_vus: u.metrics.max_vus,
        requests_total: u.metrics.requests_total,
        requests_per_sec: u.metrics.rps_now,
        failed_requests_total: u.metrics.failed_requests_total,
        iterations_total: u.metrics.iterations_total,
        checks_failed_total: u.metrics.checks_failed_total,
        latency_p95_ms: u.metrics.latency_p95_ms,
    }
}

fn metric_value(values: &MetricValues) -> serde_json::Value {
    match values {
        MetricValues::Trend {
            count,
            sum,
            min,
            max,
            avg,
            p90,
            p95,
            p99,
        } => serde_json::json!({
            "count": count, "sum": sum, "min": min, "max": max, "avg": avg,
            "p(90)": p90, "p(95)": p95, "p(99)": p99,
        }),
        MetricValues::Counter { value, rate } => serde_json::json!({ "count": value, "rate": rate }),
        MetricValues::Rate { total, trues, rate } => {
            serde_json::json!({ "rate": rate, "passes": trues, "fails": total - trues })
        }
        MetricValues::Gauge { value, min, max } => {
            serde_json::json!({ "value": value, "min": min, "max": max })
        }
    }
}

fn build_summary_line(summary: &RunSummary, results: &Path) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        run_duration_secs: summary.run_duration.as_secs_f64(),
        results: results.display().to_string(),
        iterations_total: summary.counter_total("iterations"),
        requests_total: summary.counter_total("http_reqs"),
        checks_total: summary.checks_total(),
        checks_failed: summary.checks_failed(),
        checks_failed_by_name: summary
            .checks
            .iter()
            .filter(|c| c.fails > 0)
            .map(|c| (c.name.clone(), c.fails))
            .collect(),
        thresholds_passed: summary.thresholds_passed(),
        thresholds: summary
            .thresholds
            .iter()
            .map(|t| JsonThreshold {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                observed: t.observed,
                passed: t.passed,
            })
            .collect(),
        metrics: summary
            .metrics
            .iter()
            .map(|m| (m.name.clone(), metric_value(&m.values)))
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lessonload_core::{
        CheckSummary, LiveMetrics, MetricKind, MetricSummary, ThresholdOutcome, ValueType,
    };
    use serde_json::Value;

    use super::*;

    #[test]
    fn progress_line_has_kind() {
        let update = ProgressUpdate {
            tick: 3,
            elapsed: Duration::from_secs(3),
            total_duration: Duration::from_secs(20),
            stage: None,
            metrics: LiveMetrics {
                active_vus: 4,
                max_vus: 10,
                requests_total: 12,
                rps_now: 4.0,
                failed_requests_total: 0,
                iterations_total: 12,
                checks_failed_total: 1,
                latency_p95_ms: Some(8.5),
            },
        };

        let v: Value = match serde_json::to_value(build_progress_line(&update)) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("progress"));
        assert_eq!(v.get("active_vus").and_then(Value::as_u64), Some(4));
        assert_eq!(v.get("stage"), Some(&Value::Null));
    }

    #[test]
    fn summary_line_has_totals() {
        let summary = RunSummary {
            run_duration: Duration::from_secs(20),
            metrics: vec![MetricSummary {
                name: "http_reqs".to_string(),
                kind: MetricKind::Counter,
                contains: ValueType::Default,
                values: MetricValues::Counter {
                    value: 40.0,
                    rate: 2.0,
                },
            }],
            checks: vec![CheckSummary {
                name: "Lesson status 201".to_string(),
                passes: 38,
                fails: 2,
            }],
            thresholds: vec![ThresholdOutcome {
                metric: "http_req_duration".to_string(),
                expression: "p(95)<2000".to_string(),
                observed: None,
                passed: false,
            }],
        };

        let line = build_summary_line(&summary, Path::new("results.json"));
        let v: Value = match serde_json::to_value(&line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.get("requests_total").and_then(Value::as_f64), Some(40.0));
        assert_eq!(v.get("checks_failed").and_then(Value::as_u64), Some(2));
        assert_eq!(v.get("thresholds_passed").and_then(Value::as_bool), Some(false));
        assert_eq!(v["checks_failed_by_name"]["Lesson status 201"], 2);
        assert_eq!(v["metrics"]["http_reqs"]["rate"], 2.0);
    }
}
