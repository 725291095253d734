//! Connection-log ingestion.
//!
//! Event sources turn log files into `HostEvent` batches. A row that
//! cannot be parsed never kills a file and is never silently dropped:
//! it becomes a `RowError` carried in the batch, counted per host, and
//! surfaced on that host's verdict.
//!
//! Two formats are supported: JSONL exports with `logdate` /
//! `url_hostname` fields, one object per line, and CSV with a header row
//! naming a timestamp and a hostname column.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{IngestError, RowError, RowErrorKind};
use crate::event::{HostEvent, UNKNOWN_HOST};

/// Default CSV column carrying the event timestamp.
pub const DEFAULT_TIME_COLUMN: &str = "_time";
/// Default CSV column carrying the destination hostname.
pub const DEFAULT_HOST_COLUMN: &str = "url_hostname";

/// Parsed events plus every row that failed to parse.
#[derive(Debug, Default)]
pub struct EventBatch {
    pub events: Vec<HostEvent>,
    pub row_errors: Vec<RowError>,
}

impl EventBatch {
    /// Folds another batch into this one.
    pub fn merge(&mut self, other: EventBatch) {
        self.events.extend(other.events);
        self.row_errors.extend(other.row_errors);
    }

    /// Malformed-row counts keyed by host, hostless rows under "unknown".
    pub fn malformed_per_host(&self) -> HashMap<String, u64> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for err in &self.row_errors {
            let host = err.host.clone().unwrap_or_else(|| UNKNOWN_HOST.to_string());
            *counts.entry(host).or_insert(0) += 1;
        }
        counts
    }
}

/// Anything that can produce a batch of host events.
pub trait EventSource: Send + Sync {
    /// Reads and parses the underlying data.
    fn fetch(&self) -> Result<EventBatch>;

    /// Short human-readable identity for logs.
    fn describe(&self) -> String;
}

/// JSONL log file: one object per line with `logdate` and `url_hostname`.
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Deserialize)]
struct JsonlRecord {
    logdate: Option<String>,
    url_hostname: Option<String>,
}

impl EventSource for JsonlSource {
    fn fetch(&self) -> Result<EventBatch> {
        let name = self.describe();
        let content =
            std::fs::read_to_string(&self.path).map_err(|source| IngestError::FileRead {
                path: name.clone(),
                source,
            })?;

        let mut batch = EventBatch::default();
        for (i, line) in content.lines().enumerate() {
            let line_no = i + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let record: JsonlRecord = match serde_json::from_str(trimmed) {
                Ok(record) => record,
                Err(err) => {
                    batch.row_errors.push(RowError {
                        file: name.clone(),
                        line: line_no,
                        host: None,
                        raw_timestamp: None,
                        reason: RowErrorKind::MalformedRecord(err.to_string()),
                    });
                    continue;
                }
            };

            let host = record.url_hostname;
            let Some(raw) = record.logdate else {
                batch.row_errors.push(RowError {
                    file: name.clone(),
                    line: line_no,
                    host,
                    raw_timestamp: None,
                    reason: RowErrorKind::MissingTimestamp("logdate".to_string()),
                });
                continue;
            };

            match parse_timestamp(&raw) {
                Some(timestamp) => batch.events.push(HostEvent { host, timestamp }),
                None => batch.row_errors.push(RowError {
                    file: name.clone(),
                    line: line_no,
                    host,
                    raw_timestamp: Some(raw.clone()),
                    reason: RowErrorKind::MalformedTimestamp(raw),
                }),
            }
        }

        finish_batch(&name, batch)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// CSV log file with a header row naming the timestamp and host columns.
pub struct CsvSource {
    path: PathBuf,
    pub time_column: String,
    pub host_column: String,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            time_column: DEFAULT_TIME_COLUMN.to_string(),
            host_column: DEFAULT_HOST_COLUMN.to_string(),
        }
    }
}

impl EventSource for CsvSource {
    fn fetch(&self) -> Result<EventBatch> {
        let name = self.describe();
        let file = std::fs::File::open(&self.path).map_err(|source| IngestError::FileRead {
            path: name.clone(),
            source,
        })?;
        let mut reader = csv::Reader::from_reader(file);

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header from {}", name))?
            .clone();
        let time_idx = headers
            .iter()
            .position(|h| h == self.time_column)
            .with_context(|| format!("CSV {} has no '{}' column", name, self.time_column))?;
        let host_idx = headers.iter().position(|h| h == self.host_column);

        let mut batch = EventBatch::default();
        for (i, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    batch.row_errors.push(RowError {
                        file: name.clone(),
                        // header occupies the first line
                        line: i + 2,
                        host: None,
                        raw_timestamp: None,
                        reason: RowErrorKind::MalformedRecord(err.to_string()),
                    });
                    continue;
                }
            };
            let line_no = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(i + 2);

            let host = host_idx
                .and_then(|idx| record.get(idx))
                .filter(|h| !h.is_empty())
                .map(|h| h.to_string());

            let raw = record.get(time_idx).unwrap_or("").trim().to_string();
            if raw.is_empty() {
                batch.row_errors.push(RowError {
                    file: name.clone(),
                    line: line_no,
                    host,
                    raw_timestamp: None,
                    reason: RowErrorKind::MissingTimestamp(self.time_column.clone()),
                });
                continue;
            }

            match parse_timestamp(&raw) {
                Some(timestamp) => batch.events.push(HostEvent { host, timestamp }),
                None => batch.row_errors.push(RowError {
                    file: name.clone(),
                    line: line_no,
                    host,
                    raw_timestamp: Some(raw.clone()),
                    reason: RowErrorKind::MalformedTimestamp(raw),
                }),
            }
        }

        finish_batch(&name, batch)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn finish_batch(name: &str, batch: EventBatch) -> Result<EventBatch> {
    if batch.row_errors.is_empty() {
        debug!(file = %name, events = batch.events.len(), "ingested");
    } else {
        warn!(
            file = %name,
            events = batch.events.len(),
            rejected = batch.row_errors.len(),
            "ingested with rejected rows"
        );
    }
    Ok(batch)
}

/// Parses a log timestamp in any of the accepted shapes.
///
/// RFC 3339 first, then the naive ISO forms the exports carry, then a
/// bare time of day anchored to the epoch date (cleaned captures keep
/// only times). Returns `None` when nothing matches.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(time) = NaiveTime::parse_from_str(raw, "%H:%M:%S%.f") {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
        return Some(NaiveDateTime::new(epoch, time).and_utc());
    }
    None
}

/// Builds the source matching a file's extension.
pub fn source_for_path(path: &Path) -> Result<Box<dyn EventSource>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jsonl" | "json" => Ok(Box::new(JsonlSource::new(path))),
        "csv" => Ok(Box::new(CsvSource::new(path))),
        _ => Err(IngestError::UnsupportedFormat {
            path: path.display().to_string(),
        }
        .into()),
    }
}

/// Resolves an input path into the list of log files to ingest.
///
/// A file stands for itself; a directory contributes every contained
/// regular file with a supported extension, skipping the rest with a
/// warning. An empty result is an error.
pub fn collect_input_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = std::fs::read_dir(path).map_err(|source| IngestError::DirList {
        path: path.display().to_string(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| IngestError::DirList {
            path: path.display().to_string(),
            source,
        })?;
        let file_path = entry.path();
        if !file_path.is_file() {
            continue;
        }
        match source_for_path(&file_path) {
            Ok(_) => files.push(file_path),
            Err(_) => warn!(file = %file_path.display(), "skipping unsupported file"),
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(IngestError::NoInputFiles {
            path: path.display().to_string(),
        }
        .into());
    }
    Ok(files)
}
