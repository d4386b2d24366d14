use std::path::Path;
use std::process::{Command, Output};

use anyhow::Context as _;
use lessonload_testserver::{TestServer, TestServerConfig};

const SHORT_RUN: &str = r#"
stages:
  - { duration: 1s, target: 2 }
  - { duration: 500ms, target: 0 }
thinkTime: 50ms
"#;

fn status_code(out: &Output) -> i32 {
    out.status.code().unwrap_or(-1)
}

fn describe(out: &Output) -> String {
    format!(
        "exit {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

async fn lessonload(args: Vec<String>, base_url: Option<String>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_lessonload");
    tokio::task::spawn_blocking(move || {
        let mut cmd = Command::new(exe);
        cmd.args(&args).env_remove("BASE_URL").env("RUST_LOG", "lessonload=warn");
        if let Some(url) = base_url {
            cmd.env("BASE_URL", url);
        }
        cmd.output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run lessonload binary")
}

fn write(path: &Path, contents: &str) -> anyhow::Result<String> {
    std::fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(path.display().to_string())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_then_report_against_test_server() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let tmp = tempfile::tempdir()?;
    let options = write(&tmp.path().join("load.yaml"), SHORT_RUN)?;
    let lessons = write(
        &tmp.path().join("lessons.json"),
        r#"[{"title":"Intro","description":"First steps"}]"#,
    )?;
    let results = tmp.path().join("out/results.json");

    let out = lessonload(
        vec![
            "run".into(),
            "--options".into(),
            options,
            "--lessons".into(),
            lessons,
            "--out".into(),
            results.display().to_string(),
            "--output".into(),
            "json".into(),
        ],
        Some(server.base_url().to_string()),
    )
    .await?;
    let created = server.stats().lessons_created();
    let registrations = server.stats().registrations();
    server.shutdown().await;

    anyhow::ensure!(status_code(&out) == 0, "{}", describe(&out));
    anyhow::ensure!(registrations == 1, "setup runs exactly once");
    anyhow::ensure!(created > 0, "expected lessons to be created");

    let stdout = String::from_utf8(out.stdout)?;
    let last = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .context("no summary line")?;
    let summary: serde_json::Value = serde_json::from_str(last)?;
    anyhow::ensure!(summary["kind"] == "summary", "{last}");
    anyhow::ensure!(summary["checks_failed"] == 0, "{last}");
    anyhow::ensure!(summary["thresholds_passed"] == true, "{last}");
    anyhow::ensure!(summary["iterations_total"].as_f64() == Some(created as f64));

    let log = std::fs::read_to_string(&results)?;
    let checkout_points = log
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .filter(|v| v["type"] == "Point" && v["metric"] == "checkout_duration")
        .count();
    anyhow::ensure!(checkout_points as u64 == created);

    let report_path = tmp.path().join("report.html");
    let out = lessonload(
        vec![
            "report".into(),
            "--results".into(),
            results.display().to_string(),
            "--out".into(),
            report_path.display().to_string(),
        ],
        None,
    )
    .await?;
    anyhow::ensure!(status_code(&out) == 0, "{}", describe(&out));
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(stdout.contains("✅ HTML report generated: "), "{stdout}");

    let html = std::fs::read_to_string(&report_path)?;
    anyhow::ensure!(html.contains("checkout_duration p(95)&#60;2000"));
    anyhow::ensure!(html.contains("Lesson title correct"));
    anyhow::ensure!(html.contains("0 → 2 VUs over 1s"), "stage table follows the run");
    anyhow::ensure!(html.contains("2 → 0 VUs over 500ms"), "stage table follows the run");
    Ok(())
}

#[tokio::test]
async fn setup_failure_exits_20_without_iterations() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerConfig {
        issue_token: false,
        ..TestServerConfig::default()
    })
    .await
    .context("start test server")?;
    let tmp = tempfile::tempdir()?;
    let options = write(&tmp.path().join("load.yaml"), SHORT_RUN)?;

    let out = lessonload(
        vec![
            "run".into(),
            "--options".into(),
            options,
            "--out".into(),
            tmp.path().join("results.json").display().to_string(),
        ],
        Some(server.base_url().to_string()),
    )
    .await?;
    let created = server.stats().lessons_created();
    server.shutdown().await;

    anyhow::ensure!(status_code(&out) == 20, "{}", describe(&out));
    anyhow::ensure!(created == 0);
    Ok(())
}

#[tokio::test]
async fn failed_thresholds_exit_11() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let tmp = tempfile::tempdir()?;
    let options = write(
        &tmp.path().join("load.yaml"),
        &format!("{SHORT_RUN}thresholds:\n  http_req_duration: \"p(95)<0\"\n"),
    )?;

    let out = lessonload(
        vec![
            "run".into(),
            "--options".into(),
            options,
            "--out".into(),
            tmp.path().join("results.json").display().to_string(),
            "--output".into(),
            "json".into(),
        ],
        Some(server.base_url().to_string()),
    )
    .await?;
    server.shutdown().await;

    anyhow::ensure!(status_code(&out) == 11, "{}", describe(&out));
    Ok(())
}

#[tokio::test]
async fn missing_results_file_exits_30() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let report_path = tmp.path().join("report.html");

    let out = lessonload(
        vec![
            "report".into(),
            "--results".into(),
            tmp.path().join("nope.json").display().to_string(),
            "--out".into(),
            report_path.display().to_string(),
        ],
        None,
    )
    .await?;

    anyhow::ensure!(status_code(&out) == 30, "{}", describe(&out));
    anyhow::ensure!(!report_path.exists(), "no report for a missing log");
    Ok(())
}

#[tokio::test]
async fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = lessonload(
        vec!["run".into(), "--think-time".into(), "10x".into()],
        None,
    )
    .await?;
    anyhow::ensure!(status_code(&out) == 30, "{}", describe(&out));

    let out = lessonload(vec!["--help".into()], None).await?;
    anyhow::ensure!(status_code(&out) == 0, "{}", describe(&out));
    Ok(())
}
