//! Batch analysis pipeline.
//!
//! One `run` ingests every input file concurrently, merges the partial
//! batches, segments events by host, and fans the per-host analysis out
//! over blocking tasks (the math is synchronous and CPU-bound). Nothing
//! mutable is shared across hosts after segmentation, so the fan-out is
//! plain task parallelism joined before reporting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::analyzer::{HostAnalyzer, HostVerdict, VerdictKind};
use crate::config::Config;
use crate::event;
use crate::source::{self, EventBatch};

/// Everything one batch run produced.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    /// Input files that were ingested, in deterministic order.
    pub files: Vec<String>,
    /// Events parsed across all files, before segmentation.
    pub total_events: usize,
    pub hosts_analyzed: usize,
    /// Distinct hosts removed by exclusion rules.
    pub excluded_hosts: usize,
    /// Events removed with them.
    pub excluded_events: u64,
    /// Log rows that failed to parse, across all files.
    pub malformed_rows: usize,
    /// Sorted by confidence descending, ties by host name.
    pub verdicts: Vec<HostVerdict>,
}

impl RunReport {
    /// Number of hosts with at least one periodicity finding.
    pub fn detected_count(&self) -> usize {
        self.verdicts
            .iter()
            .filter(|v| v.kind == VerdictKind::Detected)
            .count()
    }
}

/// One ingested file and what came out of it.
pub struct FileBatch {
    pub file: String,
    pub batch: EventBatch,
}

/// Reads every file concurrently, one blocking task per file.
///
/// Results are joined by this single caller and returned in path order,
/// so downstream reports are deterministic regardless of completion
/// order. A file-level read failure aborts the whole ingestion.
pub async fn ingest_files(files: &[PathBuf]) -> Result<Vec<FileBatch>> {
    let mut set = JoinSet::new();
    for path in files {
        let path = path.clone();
        set.spawn_blocking(move || -> Result<FileBatch> {
            let source = source::source_for_path(&path)?;
            let batch = source.fetch()?;
            Ok(FileBatch {
                file: path.display().to_string(),
                batch,
            })
        });
    }

    let mut batches = Vec::new();
    while let Some(joined) = set.join_next().await {
        let file_batch = joined.context("ingestion task panicked")??;
        batches.push(file_batch);
    }
    batches.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(batches)
}

/// Drives a full analysis run from input paths to a report.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Ingests `input` (a log file or a directory of them) and analyzes
    /// every non-excluded host.
    pub async fn run(&self, input: &Path) -> Result<RunReport> {
        let started = Instant::now();
        let files = source::collect_input_files(input)?;
        info!(
            input = %input.display(),
            files = files.len(),
            "starting analysis run"
        );

        let mut merged = EventBatch::default();
        let mut file_names = Vec::with_capacity(files.len());
        for file_batch in ingest_files(&files).await? {
            file_names.push(file_batch.file);
            merged.merge(file_batch.batch);
        }

        let report = self.analyze_batch(merged, file_names).await?;
        info!(
            events = report.total_events,
            hosts = report.hosts_analyzed,
            detected = report.detected_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis run complete"
        );
        Ok(report)
    }

    /// Segments a merged batch and fans per-host analysis out over
    /// blocking tasks. Public so callers with events already in hand
    /// (tests, embedders) can skip file ingestion.
    pub async fn analyze_batch(
        &self,
        batch: EventBatch,
        files: Vec<String>,
    ) -> Result<RunReport> {
        let total_events = batch.events.len();
        let malformed_rows = batch.row_errors.len();
        let malformed_per_host = batch.malformed_per_host();
        if malformed_rows > 0 {
            warn!(rejected = malformed_rows, "rows excluded from analysis");
        }

        let segmented = event::segment(batch.events, &self.config.exclusions);
        let analyzer = Arc::new(HostAnalyzer::new(self.config.clone()));

        let mut set = JoinSet::new();
        for (host, events) in segmented.groups {
            let analyzer = Arc::clone(&analyzer);
            let malformed = malformed_per_host.get(&host).copied().unwrap_or(0);
            set.spawn_blocking(move || analyzer.analyze(&host, &events, malformed));
        }

        let mut verdicts = Vec::new();
        while let Some(joined) = set.join_next().await {
            verdicts.push(joined.context("analysis task panicked")?);
        }
        verdicts.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.host.cmp(&b.host))
        });

        Ok(RunReport {
            generated_at: Utc::now(),
            files,
            total_events,
            hosts_analyzed: verdicts.len(),
            excluded_hosts: segmented.excluded_hosts,
            excluded_events: segmented.excluded_events,
            malformed_rows,
            verdicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn write_jsonl(dir: &Path, name: &str, host: &str, secs: &[i64]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for &s in secs {
            let ts = Utc.timestamp_opt(s, 0).unwrap().to_rfc3339();
            writeln!(
                file,
                r#"{{"logdate": "{}", "url_hostname": "{}"}}"#,
                ts, host
            )
            .unwrap();
        }
        path
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write_jsonl(
            dir.path(),
            "beacon.jsonl",
            "jitter.example",
            &[0, 60, 121, 179, 241, 301, 360],
        );

        let report = Pipeline::new(Config::default())
            .run(dir.path())
            .await
            .unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.total_events, 7);
        assert_eq!(report.hosts_analyzed, 1);
        assert_eq!(report.malformed_rows, 0);
        assert_eq!(report.verdicts[0].host, "jitter.example");
        assert_eq!(report.verdicts[0].kind, VerdictKind::Detected);
    }

    #[tokio::test]
    async fn test_verdicts_sorted_by_confidence() {
        let dir = tempfile::tempdir().unwrap();
        // strong autocorrelation alignment on one host, a weak
        // spectral-only finding on the other
        write_jsonl(
            dir.path(),
            "aligned.jsonl",
            "aligned.example",
            &[0, 60, 120, 180, 240, 300, 301],
        );
        write_jsonl(
            dir.path(),
            "jitter.jsonl",
            "jitter.example",
            &[0, 60, 121, 179, 241, 301, 360],
        );

        let report = Pipeline::new(Config::default())
            .run(dir.path())
            .await
            .unwrap();

        assert_eq!(report.hosts_analyzed, 2);
        assert_eq!(report.verdicts[0].host, "aligned.example");
        assert!(report.verdicts[0].confidence >= report.verdicts[1].confidence);
    }

    #[tokio::test]
    async fn test_excluded_hosts_never_surface() {
        let dir = tempfile::tempdir().unwrap();
        write_jsonl(
            dir.path(),
            "corp.jsonl",
            "cdn.corp.internal",
            &[0, 60, 121, 179],
        );
        write_jsonl(
            dir.path(),
            "evil.jsonl",
            "evil.example",
            &[0, 60, 121, 179, 241, 301, 360],
        );

        let mut config = Config::default();
        config.exclusions.patterns = vec!["corp".to_string()];

        let report = Pipeline::new(config).run(dir.path()).await.unwrap();

        assert_eq!(report.hosts_analyzed, 1);
        assert_eq!(report.excluded_hosts, 1);
        assert_eq!(report.excluded_events, 4);
        assert!(report.verdicts.iter().all(|v| !v.host.contains("corp")));
    }

    #[tokio::test]
    async fn test_malformed_rows_attributed_to_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jsonl(
            dir.path(),
            "mixed.jsonl",
            "jitter.example",
            &[0, 60, 121, 179, 241, 301, 360],
        );
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        writeln!(
            file,
            r#"{{"logdate": "banana", "url_hostname": "jitter.example"}}"#
        )
        .unwrap();

        let report = Pipeline::new(Config::default())
            .run(dir.path())
            .await
            .unwrap();

        assert_eq!(report.malformed_rows, 1);
        // the bad row is counted on its host and kept out of the intervals
        assert_eq!(report.verdicts[0].malformed_rows, 1);
        assert_eq!(report.verdicts[0].event_count, 7);
        assert_eq!(report.verdicts[0].kind, VerdictKind::Detected);
    }

    #[tokio::test]
    async fn test_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Pipeline::new(Config::default())
            .run(&dir.path().join("nope"))
            .await;
        assert!(result.is_err());
    }
}
