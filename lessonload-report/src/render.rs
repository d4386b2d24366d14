use std::collections::BTreeMap;
use std::time::Duration;

use askama::Template;
use chrono::{DateTime, Utc};
use lessonload_core::Stage;

use crate::Result;
use crate::ingest::CheckTally;
use crate::stats::StatSummary;
use crate::verdicts::ThresholdVerdict;

/// Shown for any statistic whose metric is absent from the results.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub title: String,
    pub subtitle: String,
    pub stages: Vec<Stage>,
    /// Custom trend metrics given their own section, in display order.
    pub custom_trends: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl RunMetadata {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            title: "Performance Test Report".to_string(),
            subtitle: "Music Lesson API - Performance & Load Testing".to_string(),
            stages,
            custom_trends: vec!["checkout_duration".to_string()],
            generated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportInput {
    pub stats: BTreeMap<String, StatSummary>,
    pub verdicts: Vec<ThresholdVerdict>,
    pub checks: Vec<CheckTally>,
    pub metadata: RunMetadata,
}

struct Card {
    label: &'static str,
    value: String,
    class: &'static str,
}

struct Row {
    label: String,
    value: String,
}

struct VerdictRow {
    label: String,
    value: String,
    passed: bool,
}

struct CheckRow {
    name: String,
    tally: String,
    passed: bool,
}

struct StageRow {
    phase: &'static str,
    description: String,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate<'a> {
    title: &'a str,
    subtitle: &'a str,
    cards: Vec<Card>,
    verdicts: Vec<VerdictRow>,
    checks: Vec<CheckRow>,
    checks_total: String,
    http_rows: Vec<Row>,
    custom_rows: Vec<Row>,
    exec_rows: Vec<Row>,
    stages: Vec<StageRow>,
    total_duration: String,
    generated_at: String,
}

struct Lookup<'a>(&'a BTreeMap<String, StatSummary>);

impl Lookup<'_> {
    fn field(&self, metric: &str, pick: impl Fn(&StatSummary) -> f64) -> Option<f64> {
        self.0.get(metric).map(pick)
    }

    fn ms(&self, metric: &str, pick: impl Fn(&StatSummary) -> f64) -> String {
        fmt_or_na(self.field(metric, pick), |v| format!("{v:.2} ms"))
    }

    fn whole(&self, metric: &str, pick: impl Fn(&StatSummary) -> f64) -> String {
        fmt_or_na(self.field(metric, pick), |v| format!("{v:.0}"))
    }

    fn percent(&self, metric: &str, pick: impl Fn(&StatSummary) -> f64) -> String {
        fmt_or_na(self.field(metric, pick), |v| format!("{:.2}%", v * 100.0))
    }

    fn kib(&self, metric: &str) -> String {
        fmt_or_na(self.field(metric, |s| s.sum), |v| {
            format!("{:.0} KB", v / 1024.0)
        })
    }
}

fn fmt_or_na(value: Option<f64>, f: impl Fn(f64) -> String) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), f)
}

fn row(label: impl Into<String>, value: String) -> Row {
    Row {
        label: label.into(),
        value,
    }
}

fn cards(stats: &Lookup<'_>, checks: &[CheckTally]) -> Vec<Card> {
    let error_rate = stats.field("http_req_failed", |s| s.avg);
    let checks_rate = checks_pass_rate(checks).or_else(|| stats.field("checks", |s| s.avg));

    vec![
        Card {
            label: "Total Iterations",
            value: stats.whole("iterations", |s| s.sum),
            class: "",
        },
        Card {
            label: "Total Requests",
            value: stats.whole("http_reqs", |s| s.sum),
            class: "",
        },
        Card {
            label: "Error Rate",
            value: fmt_or_na(error_rate, |v| format!("{:.2}%", v * 100.0)),
            class: match error_rate {
                Some(v) if v == 0.0 => "success",
                Some(_) => "error",
                None => "",
            },
        },
        Card {
            label: "Checks Passed",
            value: fmt_or_na(checks_rate, |v| format!("{:.2}%", v * 100.0)),
            class: match checks_rate {
                Some(v) if v >= 1.0 => "success",
                Some(_) => "error",
                None => "",
            },
        },
    ]
}

fn checks_pass_rate(checks: &[CheckTally]) -> Option<f64> {
    let total: u64 = checks.iter().map(CheckTally::total).sum();
    let passes: u64 = checks.iter().map(|c| c.passes).sum();
    (total > 0).then(|| passes as f64 / total as f64)
}

fn stage_rows(stages: &[Stage]) -> Vec<StageRow> {
    let mut from = 0u64;
    stages
        .iter()
        .map(|s| {
            let phase = match s.target.cmp(&from) {
                std::cmp::Ordering::Greater => "Ramp-up",
                std::cmp::Ordering::Equal => "Steady state",
                std::cmp::Ordering::Less => "Ramp-down",
            };
            let description = format!(
                "{from} → {} VUs over {}",
                s.target,
                humantime::format_duration(s.duration)
            );
            from = s.target;
            StageRow { phase, description }
        })
        .collect()
}

/// Renders the self-contained HTML report. Missing metrics show as [`NOT_AVAILABLE`].
pub fn render(input: &ReportInput) -> Result<String> {
    let stats = Lookup(&input.stats);

    let verdicts = input
        .verdicts
        .iter()
        .map(|v| VerdictRow {
            label: v.label.clone(),
            value: fmt_or_na(v.observed, |o| format!("{o:.2}")),
            passed: v.passed,
        })
        .collect();

    let checks = input
        .checks
        .iter()
        .map(|c| CheckRow {
            name: c.name.clone(),
            tally: format!("{}/{}", c.passes, c.total()),
            passed: c.fails == 0,
        })
        .collect();
    let checks_total = match checks_pass_rate(&input.checks) {
        Some(rate) => {
            let total: u64 = input.checks.iter().map(CheckTally::total).sum();
            let passes: u64 = input.checks.iter().map(|c| c.passes).sum();
            format!(
                "Total: {passes}/{total} checks passed ({:.2}%)",
                rate * 100.0
            )
        }
        None => format!("Total: {NOT_AVAILABLE}"),
    };

    let http = "http_req_duration";
    let http_rows = vec![
        row("Average duration", stats.ms(http, |s| s.avg)),
        row("Minimum duration", stats.ms(http, |s| s.min)),
        row("Maximum duration", stats.ms(http, |s| s.max)),
        row("90th percentile", stats.ms(http, |s| s.p90)),
        row("95th percentile", stats.ms(http, |s| s.p95)),
        row("99th percentile", stats.ms(http, |s| s.p99)),
        row("Total requests", stats.whole("http_reqs", |s| s.sum)),
        row("Failure rate", stats.percent("http_req_failed", |s| s.avg)),
    ];

    let custom_rows = input
        .metadata
        .custom_trends
        .iter()
        .flat_map(|name| {
            [
                row(format!("{name} (avg)"), stats.ms(name, |s| s.avg)),
                row(format!("{name} (min)"), stats.ms(name, |s| s.min)),
                row(format!("{name} (max)"), stats.ms(name, |s| s.max)),
                row(format!("{name} p(95)"), stats.ms(name, |s| s.p95)),
                row(format!("{name} p(99)"), stats.ms(name, |s| s.p99)),
            ]
        })
        .collect();

    let exec_rows = vec![
        row("Iteration duration (avg)", stats.ms("iteration_duration", |s| s.avg)),
        row("Total iterations", stats.whole("iterations", |s| s.sum)),
        row("Max VUs", stats.whole("vus_max", |s| s.max)),
        row("Data received", stats.kib("data_received")),
        row("Data sent", stats.kib("data_sent")),
    ];

    let total: Duration = input.metadata.stages.iter().map(|s| s.duration).sum();

    let tpl = ReportTemplate {
        title: &input.metadata.title,
        subtitle: &input.metadata.subtitle,
        cards: cards(&stats, &input.checks),
        verdicts,
        checks,
        checks_total,
        http_rows,
        custom_rows,
        exec_rows,
        stages: stage_rows(&input.metadata.stages),
        total_duration: humantime::format_duration(total).to_string(),
        generated_at: input
            .metadata
            .generated_at
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
    };
    Ok(tpl.render()?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn empty_input() -> ReportInput {
        ReportInput {
            stats: BTreeMap::new(),
            verdicts: Vec::new(),
            checks: Vec::new(),
            metadata: RunMetadata::new(vec![
                Stage::new(Duration::from_secs(5), 10),
                Stage::new(Duration::from_secs(10), 10),
                Stage::new(Duration::from_secs(5), 0),
            ]),
        }
    }

    #[test]
    fn empty_stats_render_placeholders() {
        let html = render(&empty_input()).unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        // 4 cards + 8 HTTP rows + 5 custom rows + 5 execution rows + checks total.
        assert_eq!(html.matches(NOT_AVAILABLE).count(), 23);
        assert!(!html.contains("155"));
        assert!(!html.contains("<link"));
        assert!(!html.contains("<script src"));
    }

    #[test]
    fn renders_stats_verdicts_and_stages() {
        let mut input = empty_input();
        input.stats.insert(
            "http_req_duration".to_string(),
            crate::stats::compute(&[10.0, 20.0, 30.0]),
        );
        input.stats.insert(
            "http_req_failed".to_string(),
            crate::stats::compute(&[0.0, 0.0, 0.0]),
        );
        input.verdicts.push(ThresholdVerdict {
            label: "http_req_duration p(95)<2000".to_string(),
            observed: Some(30.0),
            passed: true,
        });
        input.checks.push(CheckTally {
            name: "Lesson title correct".to_string(),
            passes: 3,
            fails: 1,
        });

        let html = render(&input).unwrap();
        assert!(html.contains("20.00 ms"));
        assert!(html.contains("0.00%"));
        assert!(html.contains("http_req_duration p(95)&#60;2000"));
        assert!(html.contains("Lesson title correct"));
        assert!(html.contains("Total: 3/4 checks passed (75.00%)"));
        assert!(html.contains("0 → 10 VUs over 5s"));
        assert!(html.contains("Steady state"));
        assert!(html.contains("Ramp-down"));
        assert!(html.contains("20s"));
    }

    #[test]
    fn escapes_metadata() {
        let mut input = empty_input();
        input.metadata.title = "<script>alert(1)</script>".to_string();
        let html = render(&input).unwrap();
        assert!(!html.contains("<script>alert(1)"));
    }
}
