use lessonload_report::{RunMetadata, generate};

use crate::cli::ReportArgs;
use crate::exit_codes::ExitCode;
use crate::options::OptionsFile;
use crate::run_error::RunError;

pub async fn report(args: ReportArgs) -> Result<ExitCode, RunError> {
    let file = match &args.options {
        Some(path) => Some(
            OptionsFile::load(path)
                .await
                .map_err(RunError::InvalidInput)?,
        ),
        None => None,
    };

    // Without an options file the schedule and thresholds recorded in the log are used.
    let stages = file.as_ref().map(OptionsFile::stages).unwrap_or_default();
    let thresholds = file.as_ref().map(OptionsFile::thresholds);

    let report = generate(
        &args.results,
        &args.out,
        thresholds.as_deref(),
        RunMetadata::new(stages),
    )?;

    for v in report.verdicts.iter().filter(|v| !v.passed) {
        tracing::warn!(threshold = %v.label, observed = ?v.observed, "threshold crossed");
    }

    let path = std::path::absolute(&report.path).unwrap_or(report.path);
    println!("✅ HTML report generated: {}", path.display());
    Ok(ExitCode::Success)
}
