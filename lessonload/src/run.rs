use std::sync::Arc;

use anyhow::Context as _;
use lessonload_core::{HttpClient, LogLine, ResultLog, RunContext, run_workload};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::fixtures::LessonPool;
use crate::options::{LoadOptions, OptionsFile};
use crate::output;
use crate::run_error::RunError;
use crate::workload::LessonWorkload;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let file = match &args.options {
        Some(path) => Some(
            OptionsFile::load(path)
                .await
                .map_err(RunError::InvalidInput)?,
        ),
        None => None,
    };
    let options = LoadOptions::resolve(file.as_ref(), args.think_time)?;

    let lessons = match (&args.lessons, args.generate_lessons) {
        (Some(path), _) => LessonPool::load(path)
            .await
            .map_err(RunError::InvalidInput)?,
        (None, Some(n)) => LessonPool::generated(n),
        (None, None) => LessonPool::bundled().map_err(RunError::RuntimeError)?,
    };
    tracing::info!(
        base_url = %args.base_url,
        lessons = lessons.count(),
        think_time = %humantime::format_duration(options.think_time),
        "load test configured"
    );

    let log = ResultLog::create(&args.out)
        .await
        .with_context(|| format!("failed to create result log: {}", args.out.display()))
        .map_err(RunError::RuntimeError)?;
    log.sink().emit(LogLine::stages(&options.run.schedule));

    let ctx = Arc::new(RunContext::new(
        HttpClient::default(),
        Some(log.sink()),
        &options.run.thresholds,
    )?);
    let workload = Arc::new(LessonWorkload::new(
        &args.base_url,
        lessons,
        options.think_time,
        &ctx,
    )?);

    out.print_header(&args.base_url, &options);
    let result = run_workload(workload, &options.run, ctx, out.progress()).await;

    // Flush whatever was recorded, including setup points of an aborted run.
    let path = log.path().to_path_buf();
    let closed = log.close().await;
    let summary = result?;
    let lines = closed
        .with_context(|| format!("failed to write result log: {}", path.display()))
        .map_err(RunError::RuntimeError)?;
    tracing::info!(path = %path.display(), lines, "result log written");

    out.print_summary(&summary, &path)
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_thresholds(summary.thresholds_passed()))
}
