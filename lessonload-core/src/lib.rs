#![forbid(unsafe_code)]

//! Ramping-VU execution harness: runs a [`Workload`] under a [`StageSchedule`], records k6-style
//! metrics into a per-run [`MetricsRegistry`], streams them to a JSON-lines [`ResultLog`] and
//! evaluates threshold expressions at the end.

mod checks;
mod config;
mod context;
mod error;
mod metrics;
mod progress;
mod runner;
mod schedule;
mod sink;
mod summary;
mod thresholds;
mod vu;

pub use checks::{CheckSummary, CheckTracker};
pub use config::{RunOptions, Stage, StageSchedule};
pub use context::{RunContext, group_tags};
pub use error::{Error, Result};
pub use metrics::{MetricHandle, MetricKind, MetricSummary, MetricValues, MetricsRegistry, ValueType};
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate};
pub use runner::{Workload, run_workload};
pub use schedule::{RampingSchedule, StageSnapshot};
pub use sink::{LogLine, MetricDecl, MetricPoint, PointSink, ResultLog, StageDecl, Tags};
pub use summary::RunSummary;
pub use thresholds::{
    Observe, ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdOutcome, ThresholdSet,
    evaluate_thresholds, parse_threshold_expr,
};
pub use vu::VuContext;

pub use lessonload_http::{
    Error as HttpError, HttpClient, HttpRequest, HttpResponse, TransportErrorKind,
};
