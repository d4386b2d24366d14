use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 1s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 1s, 250ms, 1m)"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr and a human-readable summary on stdout.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "lessonload",
    author,
    version,
    about = "Load test for the Music Lesson API",
    long_about = "lessonload drives a register -> login -> create lesson flow against the Music Lesson API under a ramped virtual-user schedule, writes every metric point to a JSON-lines result log and renders an HTML report from it.",
    after_help = "Examples:\n  lessonload run\n  lessonload run --base-url http://127.0.0.1:3000 --options load.yaml\n  lessonload run --output json --out results.json\n  lessonload report --results results.json --out report.html"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the lesson-creation load test
    #[command(
        long_about = "Register and log in one instructor, then create lessons from every active VU until the stage schedule ends.\n\nStages and thresholds come from --options when given, otherwise 5s->10, 10s->10, 5s->0 with p(95)<2000 and p(99)<3000 on http_req_duration and checkout_duration."
    )]
    Run(RunArgs),

    /// Render an HTML report from a result log
    Report(ReportArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Base URL of the API under test
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// JSON array of {title, description} lessons to post (bundled fixtures when omitted)
    #[arg(long, value_name = "FILE")]
    pub lessons: Option<PathBuf>,

    /// Post N synthetic lessons instead of a fixture file
    #[arg(long, value_name = "N", conflicts_with = "lessons")]
    pub generate_lessons: Option<usize>,

    /// YAML options file with stages, thresholds and thinkTime
    #[arg(long, value_name = "FILE")]
    pub options: Option<PathBuf>,

    /// Where to write the JSON-lines result log
    #[arg(long, value_name = "FILE", default_value = "results.json")]
    pub out: PathBuf,

    /// Pause after every iteration (e.g. 1s, 250ms); overrides the options file
    #[arg(long, value_parser = parse_duration)]
    pub think_time: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// JSON-lines result log produced by `lessonload run`
    #[arg(long, value_name = "FILE", default_value = "results.json")]
    pub results: PathBuf,

    /// Where to write the HTML report
    #[arg(long, value_name = "FILE", default_value = "report.html")]
    pub out: PathBuf,

    /// YAML options file; its stages and thresholds replace the ones recorded in the log
    #[arg(long, value_name = "FILE")]
    pub options: Option<PathBuf>,
}
