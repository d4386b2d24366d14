use std::time::Duration;

use crate::schedule::StageSnapshot;

#[derive(Debug, Clone)]
pub struct LiveMetrics {
    /// VUs currently inside an iteration.
    pub active_vus: u64,
    pub max_vus: u64,

    pub requests_total: u64,
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub checks_failed_total: u64,

    /// Run-wide request latency so far, milliseconds.
    pub latency_p95_ms: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub stage: Option<StageSnapshot>,
    pub metrics: LiveMetrics,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
