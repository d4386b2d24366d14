use std::path::Path;

use crate::cli::OutputFormat;
use crate::options::LoadOptions;

mod format;
mod human;
mod json;
mod progress;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, base_url: &str, options: &LoadOptions);
    fn progress(&self) -> Option<lessonload_core::ProgressFn>;
    fn print_summary(
        &self,
        summary: &lessonload_core::RunSummary,
        results: &Path,
    ) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
