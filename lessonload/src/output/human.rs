use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use lessonload_core::{MetricSummary, MetricValues, RunSummary};

use super::OutputFormatter;
use super::format::{format_duration, format_ms, format_rate, format_value};
use super::progress::HumanProgress;
use crate::options::LoadOptions;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, base_url: &str, options: &LoadOptions) {
        println!("target: {base_url}");
        for (i, stage) in options.run.schedule.stages().iter().enumerate() {
            println!("stage {}: {stage}", i + 1);
        }
        for t in &options.run.thresholds {
            println!("threshold: {} {}", t.metric, t.expressions.join(", "));
        }
        println!();
    }

    fn progress(&self) -> Option<lessonload_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let m = &u.metrics;
            let latency = m.latency_p95_ms.map_or_else(|| "-".to_string(), format_ms);
            let stage = match &u.stage {
                Some(s) => format!(
                    "stage={}/{} target={} ",
                    s.index + 1,
                    s.count,
                    s.current_target
                ),
                None => String::new(),
            };
            let message = format!(
                "{stage}vus={}/{} elapsed={} iters={} rps={} p95={latency} errors={}",
                m.active_vus,
                m.max_vus,
                format_duration(u.elapsed),
                m.iterations_total,
                format_rate(m.rps_now),
                m.failed_requests_total
                    .saturating_add(m.checks_failed_total)
            );
            progress.update(u.total_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, summary: &RunSummary, results: &Path) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));
        println!("results: {}", results.display());

        if !summary.thresholds_passed() {
            eprintln!("thresholds failed:");
            for t in summary.thresholds.iter().filter(|t| !t.passed) {
                match t.observed {
                    Some(obs) => eprintln!("  {} (observed {obs:.2})", t.label()),
                    None => eprintln!("  {} (missing series)", t.label()),
                }
            }
        }
        Ok(())
    }
}

const NAME_WIDTH: usize = 24;

pub(crate) fn render(summary: &RunSummary) -> String {
    let mut out = String::new();

    writeln!(
        out,
        "summary ({})",
        format_duration(summary.run_duration)
    )
    .ok();

    let total = summary.checks_total();
    let failed = summary.checks_failed();
    writeln!(out, "  checks: {}/{total} passed", total - failed).ok();
    for c in &summary.checks {
        let mark = if c.fails == 0 { '✓' } else { '✗' };
        writeln!(out, "    {mark} {} ({}/{})", c.name, c.passes, c.total()).ok();
    }

    if !summary.thresholds.is_empty() {
        out.push_str("  thresholds:\n");
        for t in &summary.thresholds {
            let mark = if t.passed { '✓' } else { '✗' };
            let observed = t
                .observed
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"));
            writeln!(out, "    {mark} {} (observed {observed})", t.label()).ok();
        }
    }

    out.push_str("  metrics:\n");
    for m in &summary.metrics {
        writeln!(out, "    {:.<NAME_WIDTH$}: {}", format!("{} ", m.name), metric_line(m)).ok();
    }

    out
}

fn metric_line(m: &MetricSummary) -> String {
    let fmt = |v: f64| format_value(v, m.contains);
    let opt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), fmt);

    match &m.values {
        MetricValues::Trend {
            count,
            avg,
            min,
            max,
            p90,
            p95,
            p99,
            ..
        } => format!(
            "avg={} min={} p(90)={} p(95)={} p(99)={} max={} (n={count})",
            opt(*avg),
            opt(*min),
            opt(*p90),
            opt(*p95),
            opt(*p99),
            opt(*max)
        ),
        MetricValues::Counter { value, rate } => {
            format!("{} ({}/s)", fmt(*value), format_rate(*rate))
        }
        MetricValues::Rate { total, trues, rate } => format!(
            "{} ({trues}/{total})",
            rate.map_or_else(|| "n/a".to_string(), |r| format!("{:.2}%", r * 100.0))
        ),
        MetricValues::Gauge { value, min, max } => format!(
            "{} min={} max={}",
            fmt(*value),
            opt(*min),
            opt(*max)
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lessonload_core::{CheckSummary, MetricKind, ThresholdOutcome, ValueType};

    use super::*;

    #[test]
    fn render_lists_checks_thresholds_and_metrics() {
        let summary = RunSummary {
            run_duration: Duration::from_secs(20),
            metrics: vec![
                MetricSummary {
                    name: "checkout_duration".to_string(),
                    kind: MetricKind::Trend,
                    contains: ValueType::Time,
                    values: MetricValues::Trend {
                        count: 2,
                        sum: 30.0,
                        min: Some(10.0),
                        max: Some(20.0),
                        avg: Some(15.0),
                        p90: Some(20.0),
                        p95: Some(20.0),
                        p99: Some(20.0),
                    },
                },
                MetricSummary {
                    name: "http_req_failed".to_string(),
                    kind: MetricKind::Rate,
                    contains: ValueType::Default,
                    values: MetricValues::Rate {
                        total: 4,
                        trues: 1,
                        rate: Some(0.25),
                    },
                },
            ],
            checks: vec![CheckSummary {
                name: "Lesson title correct".to_string(),
                passes: 1,
                fails: 1,
            }],
            thresholds: vec![ThresholdOutcome {
                metric: "checkout_duration".to_string(),
                expression: "p(95)<2000".to_string(),
                observed: Some(20.0),
                passed: true,
            }],
        };

        let text = render(&summary);
        assert!(text.starts_with("summary (20.0s)"));
        assert!(text.contains("checks: 1/2 passed"));
        assert!(text.contains("✗ Lesson title correct (1/2)"));
        assert!(text.contains("✓ checkout_duration p(95)<2000 (observed 20.00)"));
        assert!(text.contains("avg=15.00ms"));
        assert!(text.contains("(n=2)"));
        assert!(text.contains("25.00% (1/4)"));
    }
}
