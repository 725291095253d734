//! Domain-specific error types for beaconsift.
//!
//! Uses `thiserror` for ergonomic error definitions that integrate
//! with the broader `anyhow` error handling strategy.

use thiserror::Error;

/// Errors that can occur while ingesting connection logs.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read log file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list log directory '{path}': {source}")]
    DirList {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported log format for '{path}' (expected .jsonl, .json or .csv)")]
    UnsupportedFormat { path: String },

    #[error("No input files found under '{path}'")]
    NoInputFiles { path: String },
}

/// A single rejected log row. Rows are excluded and counted, never
/// silently dropped; the per-host exclusion tally ends up on the verdict.
#[derive(Debug, Clone)]
pub struct RowError {
    /// Source file the row came from.
    pub file: String,
    /// 1-based line number within the file.
    pub line: usize,
    /// Host the row named, if that much parsed.
    pub host: Option<String>,
    /// Raw timestamp text that failed to parse, if present.
    pub raw_timestamp: Option<String>,
    /// What went wrong.
    pub reason: RowErrorKind,
}

/// Why a row was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowErrorKind {
    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("Missing timestamp field '{0}'")]
    MissingTimestamp(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.reason)
    }
}

/// Errors raised by the per-host analysis stages.
///
/// None of these abort a run: `InsufficientData` turns the host's verdict
/// into "not analyzable", the filter errors degrade the host to its
/// unfiltered signal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data points for analysis (need at least {required}, got {actual})")]
    InsufficientData { required: usize, actual: usize },

    #[error("Filter band [{low_cut}, {high_cut}] is invalid at sampling rate {rate_hz:.6} Hz (normalized cutoffs must lie strictly inside (0, 1))")]
    InvalidFilterBand {
        low_cut: f64,
        high_cut: f64,
        rate_hz: f64,
    },

    #[error("Signal of {len} samples is too short for zero-phase filtering (needs more than {padlen})")]
    SignalTooShort { len: usize, padlen: usize },
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
