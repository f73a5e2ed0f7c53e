//! Tailing and classifying the orchestration agent's logs.
//!
//! The agent writes JSON-structured records to `<root>/logs/*.log`. The
//! watcher polls those files, picks up appended lines, and prints a compact
//! one-line form: component stdout/stderr verbatim, lifecycle and error
//! records with their service name, the rest suppressed. A file that turns
//! out not to be JSON is reported once and then echoed raw.

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(default)]
    level: String,
    #[serde(default)]
    message: String,
    #[serde(rename = "eventType", default)]
    event_type: Option<String>,
    #[serde(default)]
    contexts: HashMap<String, String>,
}

impl LogRecord {
    fn service(&self) -> &str {
        self.contexts.get("serviceName").map_or("agent", String::as_str)
    }
}

/// Reduce one JSON log line to its printable form, or `None` when it is
/// routine noise.
pub fn classify(line: &str) -> Option<String> {
    let record: LogRecord = serde_json::from_str(line).ok()?;
    match record.event_type.as_deref() {
        Some("stdout") => Some(format!("[{}] {}", record.service(), record.message)),
        Some("stderr") => Some(format!("[{}] ! {}", record.service(), record.message)),
        Some(event) if event.contains("lifecycle") || event.contains("deployment") => {
            Some(format!("[{}] {} {}", record.service(), event, record.message))
        }
        _ if record.level == "WARN" || record.level == "ERROR" => {
            Some(format!("[{}] {}: {}", record.service(), record.level, record.message))
        }
        _ => None,
    }
}

/// Tail every `*.log` file under `logs_dir` until interrupted.
///
/// Existing content is skipped; only lines appended after the watch starts
/// are shown. Files may appear, rotate, or shrink while watching.
pub async fn watch(logs_dir: &Path) -> Result<()> {
    tracing::info!("watching {}", logs_dir.display());
    let mut tail = Tail::new(logs_dir);
    tail.skip_existing()?;
    loop {
        for line in tail.poll()? {
            match classify(&line) {
                Some(compact) => println!("{compact}"),
                None if line.trim_start().starts_with('{') => {}
                None => println!("{line}"),
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Byte offsets per log file, advanced on every poll.
struct Tail {
    dir: PathBuf,
    offsets: HashMap<PathBuf, u64>,
    warned: HashMap<PathBuf, bool>,
}

impl Tail {
    fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf(), offsets: HashMap::new(), warned: HashMap::new() }
    }

    fn log_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else { return Vec::new() };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
            .collect();
        files.sort();
        files
    }

    /// Record current file sizes without emitting anything.
    fn skip_existing(&mut self) -> Result<()> {
        for file in self.log_files() {
            let len = std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
            self.offsets.insert(file, len);
        }
        Ok(())
    }

    /// Complete lines appended since the previous poll, across all files.
    fn poll(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for file in self.log_files() {
            let offset = self.offsets.entry(file.clone()).or_insert(0);
            let Ok(len) = std::fs::metadata(&file).map(|m| m.len()) else { continue };
            if len < *offset {
                // rotated or truncated, start over
                *offset = 0;
            }
            if len == *offset {
                continue;
            }
            let Ok(mut handle) = std::fs::File::open(&file) else { continue };
            if handle.seek(SeekFrom::Start(*offset)).is_err() {
                continue;
            }
            let mut chunk = String::new();
            if handle.read_to_string(&mut chunk).is_err() {
                continue;
            }
            // a line still being written stays in the file until its newline
            // arrives; only complete lines advance the offset
            let Some(last_newline) = chunk.rfind('\n') else { continue };
            *offset += (last_newline + 1) as u64;
            let warned = self.warned.entry(file.clone()).or_insert(false);
            for line in chunk[..last_newline].lines() {
                if line.is_empty() {
                    continue;
                }
                if !line.trim_start().starts_with('{') && !*warned {
                    tracing::warn!("{} is not JSON-structured", file.display());
                    *warned = true;
                }
                lines.push(line.to_string());
            }
        }
        Ok(lines)
    }
}
