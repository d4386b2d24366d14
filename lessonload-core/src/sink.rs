//! Line-delimited JSON result log.
//!
//! Every metric gets one `{"type":"Metric",...}` declaration line the first time it is
//! registered, followed by one `{"type":"Point",...}` line per observation. The shape matches
//! k6's JSON output so the report pipeline can consume either. A run also records its stage
//! schedule once as `{"type":"Stages","data":[{"duration":"5s","target":10},...]}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncWriteExt as _, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::StageSchedule;
use crate::metrics::{MetricKind, ValueType};
use crate::{Error, Result};

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
    pub tags: Tags,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricDecl {
    pub name: Arc<str>,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub contains: ValueType,
    pub thresholds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDecl {
    /// humantime, e.g. `1m 30s`.
    pub duration: String,
    pub target: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LogLine {
    Metric { metric: Arc<str>, data: MetricDecl },
    Point { metric: Arc<str>, data: MetricPoint },
    Stages { data: Vec<StageDecl> },
}

impl LogLine {
    pub fn stages(schedule: &StageSchedule) -> Self {
        Self::Stages {
            data: schedule
                .stages()
                .iter()
                .map(|s| StageDecl {
                    duration: humantime::format_duration(s.duration).to_string(),
                    target: s.target,
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
enum Message {
    Line(LogLine),
    Close,
}

/// Cheap, cloneable handle used by metric handles to append lines.
#[derive(Debug, Clone)]
pub struct PointSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl PointSink {
    pub fn emit(&self, line: LogLine) {
        // A closed log only happens after the run is over; late points are dropped.
        let _ = self.tx.send(Message::Line(line));
    }
}

/// Owns the writer task for one result file.
#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,
    tx: mpsc::UnboundedSender<Message>,
    task: JoinHandle<Result<u64>>,
}

impl ResultLog {
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(path).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_lines(BufWriter::new(file), rx));

        tracing::debug!(path = %path.display(), "result log opened");

        Ok(Self {
            path: path.to_path_buf(),
            tx,
            task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sink(&self) -> PointSink {
        PointSink {
            tx: self.tx.clone(),
        }
    }

    /// Flushes everything emitted so far and returns the number of lines written.
    pub async fn close(self) -> Result<u64> {
        self.tx
            .send(Message::Close)
            .map_err(|_| Error::ResultLogClosed)?;
        let lines = self.task.await??;
        tracing::debug!(path = %self.path.display(), lines, "result log closed");
        Ok(lines)
    }
}

async fn write_lines(
    mut out: BufWriter<tokio::fs::File>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) -> Result<u64> {
    let mut lines = 0u64;
    while let Some(msg) = rx.recv().await {
        match msg {
            Message::Line(line) => {
                let mut buf = serde_json::to_vec(&line)?;
                buf.push(b'\n');
                out.write_all(&buf).await?;
                lines += 1;
            }
            Message::Close => break,
        }
    }
    out.flush().await?;
    Ok(lines)
}
