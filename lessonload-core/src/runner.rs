use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::config::RunOptions;
use crate::context::RunContext;
use crate::metrics::{MetricValues, MetricsRegistry};
use crate::progress::{LiveMetrics, ProgressFn, ProgressUpdate};
use crate::schedule::RampingSchedule;
use crate::sink::Tags;
use crate::summary::RunSummary;
use crate::thresholds::{Observe as _, ThresholdAgg, evaluate_thresholds, parse_threshold_expr};
use crate::vu::VuContext;
use crate::{Error, Result};

/// A load test: one `setup` before any VU starts, then `iteration` repeated by every active VU
/// until the schedule ends.
pub trait Workload: Send + Sync + 'static {
    /// Produced once by `setup` and shared read-only with every iteration.
    type Data: Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    fn setup(&self, ctx: &RunContext)
    -> impl Future<Output = std::result::Result<Self::Data, Self::Error>> + Send;

    /// Failures inside an iteration are recorded as checks; they never stop the run.
    fn iteration(&self, vu: &mut VuContext, data: &Self::Data) -> impl Future<Output = ()> + Send;
}

/// Runs `workload` under the ramping-VU schedule in `options`.
///
/// A failed setup returns [`Error::Setup`] before any VU is spawned.
pub async fn run_workload<W: Workload>(
    workload: Arc<W>,
    options: &RunOptions,
    ctx: Arc<RunContext>,
    progress: Option<ProgressFn>,
) -> Result<RunSummary> {
    // Reject bad expressions before generating any load.
    for set in &options.thresholds {
        for raw in &set.expressions {
            parse_threshold_expr(raw)?;
        }
    }

    tracing::info!("running setup");
    let data = workload
        .setup(&ctx)
        .await
        .map_err(|err| Error::Setup(Box::new(err)))?;
    let data = Arc::new(data);

    let schedule = Arc::new(RampingSchedule::new(&options.schedule));
    let max_vus = options.schedule.max_target();
    let active = Arc::new(AtomicU64::new(0));
    ctx.record_vus_max(max_vus);

    tracing::info!(
        max_vus,
        duration = %humantime::format_duration(schedule.total_duration()),
        "starting ramping VUs"
    );

    let started = Instant::now();
    let mut handles = Vec::with_capacity(max_vus.min(usize::MAX as u64) as usize);
    for vu_id in 1..=max_vus {
        handles.push(tokio::spawn(run_vu(
            workload.clone(),
            data.clone(),
            VuContext::new(vu_id, ctx.clone()),
            schedule.clone(),
            started,
            active.clone(),
        )));
    }

    let ticker = tokio::spawn(tick(
        ctx.clone(),
        schedule.clone(),
        started,
        max_vus,
        active.clone(),
        progress,
    ));

    let mut joined = Ok(());
    for h in handles {
        if let Err(err) = h.await {
            joined = Err(err);
        }
    }
    ticker.abort();
    let _ = ticker.await;
    joined?;

    ctx.record_vus(active.load(Ordering::Relaxed));
    let run_duration = started.elapsed();

    let registry = ctx.registry();
    let thresholds = evaluate_thresholds(registry.as_ref(), &options.thresholds)?;
    for t in thresholds.iter().filter(|t| !t.passed) {
        tracing::warn!(threshold = %t.label(), observed = ?t.observed, "threshold crossed");
    }

    Ok(RunSummary {
        run_duration,
        metrics: registry.summarize(),
        checks: ctx.checks().summarize(),
        thresholds,
    })
}

async fn run_vu<W: Workload>(
    workload: Arc<W>,
    data: Arc<W::Data>,
    mut vu: VuContext,
    schedule: Arc<RampingSchedule>,
    started: Instant,
    active: Arc<AtomicU64>,
) {
    let no_tags = Tags::new();
    loop {
        let elapsed = started.elapsed();
        if schedule.is_done(elapsed) {
            break;
        }

        let target = schedule.target_at(elapsed);
        if vu.vu_id > target {
            let wait = schedule.next_recheck_in(elapsed, vu.vu_id);
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
            continue;
        }

        active.fetch_add(1, Ordering::Relaxed);
        let iteration_started = Instant::now();
        workload.iteration(&mut vu, &data).await;
        vu.run
            .record_iteration(iteration_started.elapsed(), &no_tags);
        active.fetch_sub(1, Ordering::Relaxed);

        vu.iteration += 1;
    }
}

async fn tick(
    ctx: Arc<RunContext>,
    schedule: Arc<RampingSchedule>,
    started: Instant,
    max_vus: u64,
    active: Arc<AtomicU64>,
    progress: Option<ProgressFn>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick_id: u64 = 0;
    let mut last_at = Instant::now();
    let mut last_requests = 0u64;

    loop {
        interval.tick().await;
        tick_id = tick_id.saturating_add(1);

        let active_vus = active.load(Ordering::Relaxed);
        ctx.record_vus(active_vus);

        let Some(progress) = &progress else {
            continue;
        };

        let now = Instant::now();
        let dt = now.duration_since(last_at);
        last_at = now;

        let registry = ctx.registry();
        let requests_total = count(registry, "http_reqs");
        let rps_now =
            requests_total.saturating_sub(last_requests) as f64 / dt.as_secs_f64().max(1e-9);
        last_requests = requests_total;

        let elapsed = started.elapsed();
        progress(ProgressUpdate {
            tick: tick_id,
            elapsed,
            total_duration: schedule.total_duration(),
            stage: schedule.stage_snapshot_at(elapsed),
            metrics: LiveMetrics {
                active_vus,
                max_vus,
                requests_total,
                rps_now,
                failed_requests_total: failed_requests(registry),
                iterations_total: count(registry, "iterations"),
                checks_failed_total: ctx.checks().failed_total(),
                latency_p95_ms: registry.observe("http_req_duration", ThresholdAgg::P(95.0)),
            },
        });
    }
}

fn count(registry: &MetricsRegistry, name: &str) -> u64 {
    registry
        .observe(name, ThresholdAgg::Count)
        .map_or(0, |v| v as u64)
}

fn failed_requests(registry: &MetricsRegistry) -> u64 {
    match registry.get("http_req_failed").map(|m| m.values) {
        Some(MetricValues::Rate { trues, .. }) => trues,
        _ => 0,
    }
}
