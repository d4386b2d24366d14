use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use lessonload_core::{Stage, ThresholdSet};
use serde::Deserialize;

use crate::{Error, Result};

/// Observed values per metric name, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    values: BTreeMap<String, Vec<f64>>,
    /// Metrics declared as counters; their `count` is the sum of their points.
    counters: BTreeSet<String>,
}

impl MetricSeries {
    pub fn push(&mut self, metric: &str, value: f64) {
        match self.values.get_mut(metric) {
            Some(v) => v.push(value),
            None => {
                self.values.insert(metric.to_string(), vec![value]);
            }
        }
    }

    pub fn mark_counter(&mut self, metric: &str) {
        self.counters.insert(metric.to_string());
    }

    pub fn is_counter(&self, metric: &str) -> bool {
        self.counters.contains(metric)
    }

    pub fn get(&self, metric: &str) -> Option<&[f64]> {
        self.values.get(metric).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTally {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// A `{"type":"Metric"}` declaration line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricDeclaration {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub thresholds: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub series: MetricSeries,
    /// In first-seen order.
    pub checks: Vec<CheckTally>,
    pub declared: BTreeMap<String, MetricDeclaration>,
    /// Schedule the run recorded, if any. The last `Stages` line wins.
    pub stages: Option<Vec<Stage>>,
    pub points: u64,
    /// Lines that were not valid JSON.
    pub skipped_lines: u64,
    /// Valid JSON that is neither a numeric point nor a declaration.
    pub ignored_lines: u64,
}

impl Ingested {
    /// Threshold expressions the producer of the log declared, in metric-name order.
    pub fn declared_thresholds(&self) -> Vec<ThresholdSet> {
        self.declared
            .iter()
            .filter(|(_, d)| !d.thresholds.is_empty())
            .map(|(name, d)| ThresholdSet::new(name, d.thresholds.iter().cloned()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Line {
    #[serde(rename = "type")]
    kind: Option<String>,
    metric: Option<String>,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StageLine {
    duration: String,
    target: u64,
}

fn parse_stages(data: serde_json::Value) -> Option<Vec<Stage>> {
    let stages: Vec<StageLine> = serde_json::from_value(data).ok()?;
    stages
        .into_iter()
        .map(|s| {
            humantime::parse_duration(&s.duration)
                .ok()
                .map(|d| Stage::new(d, s.target))
        })
        .collect()
}

#[derive(Debug, Default)]
struct CheckCounter {
    order: Vec<CheckTally>,
    index: HashMap<String, usize>,
}

impl CheckCounter {
    fn record(&mut self, name: &str, passed: bool) {
        let i = match self.index.get(name) {
            Some(i) => *i,
            None => {
                self.order.push(CheckTally {
                    name: name.to_string(),
                    passes: 0,
                    fails: 0,
                });
                self.index.insert(name.to_string(), self.order.len() - 1);
                self.order.len() - 1
            }
        };
        if passed {
            self.order[i].passes += 1;
        } else {
            self.order[i].fails += 1;
        }
    }
}

/// Reads the whole file, then ingests it. A missing or unreadable file is an error; bad lines
/// are not.
pub fn ingest_file(path: &Path) -> Result<Ingested> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let ingested = ingest_str(&text);

    tracing::info!(
        path = %path.display(),
        metrics = ingested.series.len(),
        points = ingested.points,
        skipped = ingested.skipped_lines,
        "results ingested"
    );
    Ok(ingested)
}

pub fn ingest_str(text: &str) -> Ingested {
    let mut out = Ingested::default();
    let mut checks = CheckCounter::default();

    for (n, raw) in text.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let line: Line = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(line = n + 1, error = %err, "skipping malformed result line");
                out.skipped_lines += 1;
                continue;
            }
        };

        if line.kind.as_deref() == Some("Stages") {
            match line.data.and_then(parse_stages) {
                Some(stages) => out.stages = Some(stages),
                None => out.ignored_lines += 1,
            }
            continue;
        }

        let (Some(kind), Some(metric), Some(data)) = (line.kind, line.metric, line.data) else {
            out.ignored_lines += 1;
            continue;
        };

        match kind.as_str() {
            "Point" => {
                let Some(value) = data.get("value").and_then(serde_json::Value::as_f64) else {
                    out.ignored_lines += 1;
                    continue;
                };
                out.series.push(&metric, value);
                out.points += 1;

                if metric == "checks"
                    && let Some(name) = data.pointer("/tags/check").and_then(|v| v.as_str())
                {
                    checks.record(name, value != 0.0);
                }
            }
            "Metric" => match serde_json::from_value::<MetricDeclaration>(data) {
                Ok(decl) => {
                    if decl.kind == "counter" {
                        out.series.mark_counter(&metric);
                    }
                    out.declared.insert(metric, decl);
                }
                Err(_) => out.ignored_lines += 1,
            },
            _ => out.ignored_lines += 1,
        }
    }

    out.checks = checks.order;
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn keeps_good_points_and_skips_malformed_lines() {
        let text = concat!(
            r#"{"type":"Point","metric":"checkout_duration","data":{"value":123.4}}"#,
            "\n",
            "not json\n",
        );
        let ingested = ingest_str(text);
        assert_eq!(ingested.series.get("checkout_duration"), Some(&[123.4][..]));
        assert_eq!(ingested.series.len(), 1);
        assert_eq!(ingested.skipped_lines, 1);
        assert_eq!(ingested.points, 1);
    }

    #[test]
    fn ignores_non_points_and_non_numeric_values() {
        let text = [
            "",
            "   ",
            r#"{"type":"Point","metric":"vus","data":{"value":"3"}}"#,
            r#"{"type":"Other","metric":"vus","data":{"value":3}}"#,
            r#"{"metric":"vus","data":{"value":3}}"#,
            r#"[1,2,3]"#,
            r#"{"type":"Point","metric":"vus","data":{"value":3}}"#,
            r#"{"type":"Point","metric":"vus","data":{"value":5}}"#,
        ]
        .join("\n");

        let ingested = ingest_str(&text);
        assert_eq!(ingested.series.get("vus"), Some(&[3.0, 5.0][..]));
        assert_eq!(ingested.ignored_lines, 3);
        assert_eq!(ingested.skipped_lines, 1);
    }

    #[test]
    fn tallies_named_checks_in_first_seen_order() {
        let text = [
            r#"{"type":"Point","metric":"checks","data":{"value":1,"tags":{"check":"login 200"}}}"#,
            r#"{"type":"Point","metric":"checks","data":{"value":1,"tags":{"check":"Lesson status 201"}}}"#,
            r#"{"type":"Point","metric":"checks","data":{"value":0,"tags":{"check":"Lesson status 201"}}}"#,
            r#"{"type":"Point","metric":"checks","data":{"value":1}}"#,
        ]
        .join("\n");

        let ingested = ingest_str(&text);
        assert_eq!(
            ingested.checks,
            vec![
                CheckTally {
                    name: "login 200".to_string(),
                    passes: 1,
                    fails: 0
                },
                CheckTally {
                    name: "Lesson status 201".to_string(),
                    passes: 1,
                    fails: 1
                },
            ]
        );
        assert_eq!(ingested.series.get("checks").unwrap().len(), 4);
    }

    #[test]
    fn collects_declared_thresholds() {
        let text = [
            r#"{"type":"Metric","metric":"http_req_duration","data":{"name":"http_req_duration","type":"trend","contains":"time","thresholds":["p(95)<2000","p(99)<3000"]}}"#,
            r#"{"type":"Metric","metric":"vus","data":{"name":"vus","type":"gauge","contains":"default","thresholds":[]}}"#,
        ]
        .join("\n");

        let ingested = ingest_str(&text);
        assert_eq!(ingested.declared.len(), 2);
        assert_eq!(ingested.declared["vus"].kind, "gauge");
        assert!(!ingested.series.is_counter("vus"));
        assert_eq!(
            ingested.declared_thresholds(),
            vec![ThresholdSet::new(
                "http_req_duration",
                ["p(95)<2000", "p(99)<3000"]
            )]
        );
        assert!(ingested.series.is_empty());
    }

    #[test]
    fn reads_recorded_stage_schedule() {
        let text = [
            r#"{"type":"Stages","data":[{"duration":"1m 30s","target":4},{"duration":"500ms","target":0}]}"#,
            r#"{"type":"Stages","data":[{"duration":"soon","target":4}]}"#,
        ]
        .join("\n");

        let ingested = ingest_str(&text);
        assert_eq!(
            ingested.stages,
            Some(vec![
                Stage::new(std::time::Duration::from_secs(90), 4),
                Stage::new(std::time::Duration::from_millis(500), 0),
            ])
        );
        assert_eq!(ingested.ignored_lines, 1);
        assert!(ingest_str("").stages.is_none());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ingest_file(&dir.path().join("results.json")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
