#![forbid(unsafe_code)]

//! Turns a JSON-lines result log into a self-contained HTML report.

mod error;
mod ingest;
mod render;
mod stats;
mod verdicts;

use std::path::{Path, PathBuf};

pub use error::{Error, Result};
pub use ingest::{CheckTally, Ingested, MetricDeclaration, MetricSeries, ingest_file, ingest_str};
pub use render::{NOT_AVAILABLE, ReportInput, RunMetadata, render};
pub use stats::{StatSummary, compute, compute_all, percentile};
pub use verdicts::{ThresholdVerdict, verdicts};

use lessonload_core::ThresholdSet;

#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub path: PathBuf,
    pub verdicts: Vec<ThresholdVerdict>,
    pub ingested_points: u64,
}

/// Ingests `results`, evaluates thresholds and writes the HTML document to `out`.
///
/// With `thresholds == None` the expressions declared in the log's metric lines are used, and
/// empty `metadata.stages` are taken from the schedule recorded in the log.
/// Nothing is written when the results file cannot be read.
pub fn generate(
    results: &Path,
    out: &Path,
    thresholds: Option<&[ThresholdSet]>,
    mut metadata: RunMetadata,
) -> Result<GeneratedReport> {
    let ingested = ingest_file(results)?;
    if metadata.stages.is_empty()
        && let Some(stages) = &ingested.stages
    {
        metadata.stages = stages.clone();
    }
    let verdicts = match thresholds {
        Some(sets) => verdicts(&ingested.series, sets)?,
        None => verdicts(&ingested.series, &ingested.declared_thresholds())?,
    };

    let html = render(&ReportInput {
        stats: compute_all(&ingested.series),
        verdicts: verdicts.clone(),
        checks: ingested.checks,
        metadata,
    })?;

    std::fs::write(out, html).map_err(|source| Error::Write {
        path: out.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %out.display(), "report written");

    Ok(GeneratedReport {
        path: out.to_path_buf(),
        verdicts,
        ingested_points: ingested.points,
    })
}
