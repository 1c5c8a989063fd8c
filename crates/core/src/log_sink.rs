use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;

pub const FRONTEND_LOG_DIR: &str = "frontend_logs";
pub const METRICS_FILE: &str = "metrics.jsonl";

/// Client-side render log, as posted by the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSubmission {
    pub logs: Vec<String>,
    #[serde(default)]
    pub min_val: Option<f64>,
    #[serde(default)]
    pub max_val: Option<f64>,
    #[serde(default)]
    pub point_count: Option<u64>,
}

impl LogSubmission {
    pub fn from_json(body: &Value) -> Result<Self> {
        match body.get("logs") {
            Some(Value::Array(_)) => {}
            _ => return Err(Error::InvalidRequest("logs must be a list".to_string())),
        }
        serde_json::from_value(body.clone())
            .map_err(|err| Error::InvalidRequest(format!("log submission: {err}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogAck {
    pub status: &'static str,
    pub path: PathBuf,
}

pub trait LogSink: Send + Sync {
    fn submit(&self, submission: &LogSubmission) -> Result<LogAck>;
    fn record_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileLogSink {
    root: PathBuf,
}

impl FileLogSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `frontend_render_log_<stamp>.txt`, suffixing `_N` when a file
    /// with the same second already exists.
    pub fn submit_at(&self, submission: &LogSubmission, now: NaiveDateTime) -> Result<LogAck> {
        let dir = self.root.join(FRONTEND_LOG_DIR);
        fs::create_dir_all(&dir).map_err(Error::LogSink)?;
        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let mut path = dir.join(format!("frontend_render_log_{stamp}.txt"));
        let mut suffix = 1;
        while path.exists() {
            path = dir.join(format!("frontend_render_log_{stamp}_{suffix}.txt"));
            suffix += 1;
        }

        let mut text = String::new();
        if let (Some(min), Some(max)) = (submission.min_val, submission.max_val) {
            text.push_str(&format!("# range [{min}, {max}]"));
            if let Some(count) = submission.point_count {
                text.push_str(&format!(" points {count}"));
            }
            text.push('\n');
        }
        text.push_str(&submission.logs.join("\n"));
        fs::write(&path, text).map_err(Error::LogSink)?;

        tracing::info!(
            target: "saltf::log_sink",
            path = %path.display(),
            lines = submission.logs.len(),
            "frontend log saved"
        );
        Ok(LogAck { status: "ok", path })
    }
}

impl LogSink for FileLogSink {
    fn submit(&self, submission: &LogSubmission) -> Result<LogAck> {
        self.submit_at(submission, Local::now().naive_local())
    }

    fn record_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(Error::LogSink)?;
        let line = serde_json::to_string(snapshot)
            .map_err(|err| Error::LogSink(std::io::Error::other(err)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(METRICS_FILE))
            .map_err(Error::LogSink)?;
        writeln!(file, "{line}").map_err(Error::LogSink)
    }
}
