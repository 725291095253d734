//! Report rendering.
//!
//! Turns a finished run report into text, JSON, JSON Lines or CSV for
//! downstream tooling, plus a CSV export of the per-host salience curves.
//! Rendering is pure string production; `write_output` is the single
//! place bytes leave the process.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::analyzer::HostVerdict;
use crate::pipeline::RunReport;
use crate::summary::SummaryReport;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonLines, // One JSON object per line (JSONL)
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" => Ok(Self::JsonLines),
            "csv" => Ok(Self::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::JsonLines => write!(f, "jsonl"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Renders a report in the requested format.
pub fn render_report(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(report)),
        OutputFormat::Json => Ok(render_json(report)),
        OutputFormat::JsonLines => Ok(render_jsonl(report)),
        OutputFormat::Csv => render_csv(report),
    }
}

/// Renders a report as pretty-printed JSON.
pub fn render_json(report: &RunReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// Renders a report as JSON Lines: a summary line, then one verdict per line.
pub fn render_jsonl(report: &RunReport) -> String {
    let mut lines = Vec::new();

    let summary = serde_json::json!({
        "type": "summary",
        "generated_at": report.generated_at.to_rfc3339(),
        "files": report.files,
        "total_events": report.total_events,
        "hosts_analyzed": report.hosts_analyzed,
        "detected": report.detected_count(),
        "excluded_hosts": report.excluded_hosts,
        "excluded_events": report.excluded_events,
        "malformed_rows": report.malformed_rows,
    });
    lines.push(serde_json::to_string(&summary).unwrap_or_default());

    for verdict in &report.verdicts {
        if let Ok(line) = serde_json::to_string(verdict) {
            lines.push(line);
        }
    }

    lines.join("\n")
}

/// Renders a report as formatted text.
pub fn render_text(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "--- Beacon Analysis Report ---\nTime: {}\nFiles: {} | Events: {} | Hosts analyzed: {}\nExcluded: {} hosts / {} events | Malformed rows: {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        report.files.len(),
        report.total_events,
        report.hosts_analyzed,
        report.excluded_hosts,
        report.excluded_events,
        report.malformed_rows,
    ));

    if report.verdicts.is_empty() {
        output.push_str("Verdicts: none (no analyzable hosts)\n");
        return output;
    }

    output.push_str(&format!(
        "\nVerdicts ({}, {} with findings):\n",
        report.verdicts.len(),
        report.detected_count()
    ));
    output.push_str(&"-".repeat(100));
    output.push('\n');

    for verdict in &report.verdicts {
        let stats = verdict.interval_stats.as_ref();
        output.push_str(&format!(
            "[{:8}] {} | {} | conf {:.2} | period {} | freq {} | CV {} | {} events{}{}\n",
            verdict.severity(),
            verdict.host,
            verdict.kind,
            verdict.confidence,
            format_period(verdict.dominant_lag_secs),
            format_frequency(verdict.dominant_frequency_hz),
            stats.map_or("N/A".to_string(), |s| format!("{:.3}", s.cv)),
            verdict.event_count,
            if verdict.malformed_rows > 0 {
                format!(" ({} rejected rows)", verdict.malformed_rows)
            } else {
                String::new()
            },
            if verdict.degraded_filter {
                " | unfiltered"
            } else {
                ""
            },
        ));
    }

    output
}

/// One verdict flattened into CSV-friendly columns.
#[derive(Serialize)]
struct CsvVerdict {
    host: String,
    verdict: String,
    severity: String,
    regularity: String,
    confidence: f64,
    dominant_frequency_hz: Option<f64>,
    spectral_dominance: Option<f64>,
    dominant_lag_secs: Option<f64>,
    autocorr_value: Option<f64>,
    cv: Option<f64>,
    mean_interval_secs: Option<f64>,
    median_interval_secs: Option<f64>,
    event_count: usize,
    malformed_rows: u64,
    distinct_intervals: usize,
    degraded_filter: bool,
    first_seen: Option<String>,
    last_seen: Option<String>,
}

impl From<&HostVerdict> for CsvVerdict {
    fn from(verdict: &HostVerdict) -> Self {
        let stats = verdict.interval_stats.as_ref();
        Self {
            host: verdict.host.clone(),
            verdict: verdict.kind.to_string(),
            severity: verdict.severity().to_string(),
            regularity: verdict.regularity.to_string(),
            confidence: verdict.confidence,
            dominant_frequency_hz: verdict.dominant_frequency_hz,
            spectral_dominance: verdict.spectral_dominance,
            dominant_lag_secs: verdict.dominant_lag_secs,
            autocorr_value: verdict.autocorr_value,
            cv: stats.map(|s| s.cv),
            mean_interval_secs: stats.map(|s| s.mean_secs),
            median_interval_secs: stats.map(|s| s.median_secs),
            event_count: verdict.event_count,
            malformed_rows: verdict.malformed_rows,
            distinct_intervals: verdict.distinct_intervals,
            degraded_filter: verdict.degraded_filter,
            first_seen: verdict.first_seen.map(|t| t.to_rfc3339()),
            last_seen: verdict.last_seen.map(|t| t.to_rfc3339()),
        }
    }
}

/// Renders the verdict table as CSV, one row per host.
pub fn render_csv(report: &RunReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for verdict in &report.verdicts {
        writer
            .serialize(CsvVerdict::from(verdict))
            .context("Failed to serialize verdict row")?;
    }
    let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

/// Renders the per-host salience curves as CSV.
///
/// One row per (host, interval) pair inside the band of interest; hosts
/// whose analysis produced no salience contribute nothing.
pub fn render_salience_csv(verdicts: &[HostVerdict]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["host", "interval_seconds", "salience"])
        .context("Failed to write salience header")?;
    for verdict in verdicts {
        for point in &verdict.salience {
            writer
                .write_record([
                    verdict.host.as_str(),
                    &point.interval_secs.to_string(),
                    &point.salience.to_string(),
                ])
                .context("Failed to write salience row")?;
        }
    }
    let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

/// Renders a traffic summary in the requested format.
///
/// The CSV shape carries the request-count table only; the other tables
/// are text/JSON concerns.
pub fn render_summary(report: &SummaryReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_summary_text(report)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))),
        OutputFormat::JsonLines => Ok(render_summary_jsonl(report)),
        OutputFormat::Csv => render_summary_csv(report),
    }
}

fn render_summary_text(report: &SummaryReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "--- Traffic Summary ---\nTime: {}\nEvents: {} | Hosts: {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        report.total_events,
        report.hosts_seen,
    ));
    if let Some(peak) = &report.peak_interval_host {
        output.push_str(&format!(
            "Peak interval: {} repeated a {}s interval {} times\n",
            peak.host, peak.interval_secs, peak.occurrences
        ));
        if !report.peak_minutes_panel.is_empty() {
            output.push_str("Minute-scale intervals: ");
            let cells: Vec<String> = report
                .peak_minutes_panel
                .iter()
                .map(|b| format!("{} x{}", b.label(), b.count))
                .collect();
            output.push_str(&cells.join(", "));
            output.push('\n');
        }
        if !report.peak_seconds_panel.is_empty() {
            output.push_str("Second-scale intervals: ");
            let cells: Vec<String> = report
                .peak_seconds_panel
                .iter()
                .map(|b| format!("{} x{}", b.label(), b.count))
                .collect();
            output.push_str(&cells.join(", "));
            output.push('\n');
        }
    }

    output.push_str(&format!(
        "\nBusiest hosts ({}):\n",
        report.request_counts.len()
    ));
    for row in &report.request_counts {
        output.push_str(&format!("  {:<42} {:>8}\n", row.host, row.count));
    }

    if !report.hourly.is_empty() {
        output.push_str(&format!(
            "\nHourly buckets over floor ({}):\n",
            report.hourly.len()
        ));
        for row in &report.hourly {
            output.push_str(&format!(
                "  {:<42} {:02}:00 {:>8}\n",
                row.host, row.hour, row.count
            ));
        }
        if let (Some(day), Some(night)) = (report.day_avg, report.night_avg) {
            output.push_str(&format!(
                "Avg visits 00:00-04:00: {:.1} | 04:00-24:00: {:.1}\n",
                day, night
            ));
        }
    }

    output.push_str("\nUnique hosts per file:\n");
    for row in &report.unique_hosts_per_file {
        output.push_str(&format!("  {:<42} {:>8}\n", row.file, row.unique_hosts));
    }

    output
}

fn render_summary_jsonl(report: &SummaryReport) -> String {
    let mut lines = Vec::new();

    let head = serde_json::json!({
        "type": "summary",
        "generated_at": report.generated_at.to_rfc3339(),
        "total_events": report.total_events,
        "hosts_seen": report.hosts_seen,
        "day_avg": report.day_avg,
        "night_avg": report.night_avg,
        "peak_interval_host": &report.peak_interval_host,
    });
    lines.push(serde_json::to_string(&head).unwrap_or_default());

    for row in &report.request_counts {
        let line = serde_json::json!({
            "type": "request_count", "host": row.host, "count": row.count,
        });
        lines.push(serde_json::to_string(&line).unwrap_or_default());
    }
    for row in &report.hourly {
        let line = serde_json::json!({
            "type": "hourly_visits", "host": row.host, "hour": row.hour, "count": row.count,
        });
        lines.push(serde_json::to_string(&line).unwrap_or_default());
    }
    for row in &report.unique_hosts_per_file {
        let line = serde_json::json!({
            "type": "unique_hosts", "file": row.file, "unique_hosts": row.unique_hosts,
        });
        lines.push(serde_json::to_string(&line).unwrap_or_default());
    }

    lines.join("\n")
}

fn render_summary_csv(report: &SummaryReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["host", "request_count"])
        .context("Failed to write summary header")?;
    for row in &report.request_counts {
        writer
            .write_record([row.host.as_str(), &row.count.to_string()])
            .context("Failed to write summary row")?;
    }
    let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

/// Writes rendered output to a file, or stdout when no path is given.
pub fn write_output(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = content.len(), "report written");
        }
        None => println!("{}", content),
    }
    Ok(())
}

/// Formats a beacon period in a human-readable way.
fn format_period(secs: Option<f64>) -> String {
    match secs {
        Some(secs) if secs >= 120.0 => format!("{:.1}m", secs / 60.0),
        Some(secs) => format!("{:.1}s", secs),
        None => "N/A".to_string(),
    }
}

/// Formats a dominant frequency, dropping to millihertz for slow beacons.
fn format_frequency(hz: Option<f64>) -> String {
    match hz {
        Some(hz) if hz < 0.1 => format!("{:.3} mHz", hz * 1000.0),
        Some(hz) => format!("{:.3} Hz", hz),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{IntervalStats, Regularity, VerdictKind};
    use chrono::{TimeZone, Utc};

    fn verdict(host: &str, confidence: f64) -> HostVerdict {
        HostVerdict {
            host: host.to_string(),
            kind: VerdictKind::Detected,
            regularity: Regularity::HighlyPeriodic,
            dominant_frequency_hz: Some(1.0 / 60.0),
            spectral_dominance: Some(0.21),
            dominant_lag_secs: Some(60.0),
            autocorr_value: Some(confidence),
            confidence,
            event_count: 100,
            malformed_rows: 2,
            distinct_intervals: 5,
            interval_stats: Some(IntervalStats {
                mean_secs: 60.0,
                std_dev_secs: 1.4,
                cv: 0.023,
                min_secs: 58.0,
                max_secs: 62.0,
                median_secs: 60.0,
            }),
            degraded_filter: true,
            first_seen: Some(Utc.timestamp_opt(0, 0).unwrap()),
            last_seen: Some(Utc.timestamp_opt(5940, 0).unwrap()),
            salience: vec![],
        }
    }

    fn report() -> RunReport {
        RunReport {
            generated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            files: vec!["conn.jsonl".to_string()],
            total_events: 120,
            hosts_analyzed: 2,
            excluded_hosts: 1,
            excluded_events: 17,
            malformed_rows: 2,
            verdicts: vec![verdict("evil.example", 0.83), verdict("meh.example", 0.12)],
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "jsonl".parse::<OutputFormat>().unwrap(),
            OutputFormat::JsonLines
        );
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("invalid".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Text.to_string(), "text");
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::JsonLines.to_string(), "jsonl");
        assert_eq!(OutputFormat::Csv.to_string(), "csv");
    }

    #[test]
    fn test_render_text() {
        let text = render_text(&report());
        assert!(text.contains("evil.example"));
        assert!(text.contains("[CRITICAL"));
        assert!(text.contains("period 60.0s"));
        assert!(text.contains("16.667 mHz"));
        assert!(text.contains("(2 rejected rows)"));
        assert!(text.contains("unfiltered"));
    }

    #[test]
    fn test_render_jsonl_line_per_verdict() {
        let jsonl = render_jsonl(&report());
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 3);

        let summary: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(summary["type"], "summary");
        assert_eq!(summary["detected"], 2);

        let first: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first["host"], "evil.example");
        assert_eq!(first["kind"], "detected");
    }

    #[test]
    fn test_render_csv_round_trips() {
        let csv_text = render_csv(&report()).unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().next(), Some("host"));

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "evil.example");
        assert_eq!(&rows[0][2], "CRITICAL");
    }

    #[test]
    fn test_render_salience_csv() {
        let mut v = verdict("evil.example", 0.8);
        v.salience = vec![
            crate::baseline::SaliencePoint {
                interval_secs: 59,
                salience: 0.0,
            },
            crate::baseline::SaliencePoint {
                interval_secs: 60,
                salience: 0.8,
            },
        ];
        let csv_text = render_salience_csv(&[v]).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines[0], "host,interval_seconds,salience");
        assert_eq!(lines[2], "evil.example,60,0.8");
    }

    fn summary() -> SummaryReport {
        SummaryReport {
            generated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            total_events: 1200,
            hosts_seen: 3,
            request_counts: vec![crate::summary::RequestCountRow {
                host: "busy.example".to_string(),
                count: 900,
            }],
            hourly: vec![crate::summary::HourlyVisitRow {
                host: "busy.example".to_string(),
                hour: 4,
                count: 600,
            }],
            day_avg: Some(600.0),
            night_avg: Some(600.0),
            unique_hosts_per_file: vec![crate::summary::UniqueHostRow {
                file: "conn.jsonl".to_string(),
                unique_hosts: 3,
            }],
            peak_interval_host: Some(crate::summary::PeakIntervalHost {
                host: "busy.example".to_string(),
                interval_secs: 60,
                occurrences: 899,
            }),
            peak_seconds_panel: vec![crate::intervals::RebinnedBin {
                lo: 60,
                hi: Some(61),
                count: 899,
            }],
            peak_minutes_panel: vec![crate::intervals::RebinnedBin {
                lo: 60,
                hi: Some(120),
                count: 899,
            }],
        }
    }

    #[test]
    fn test_render_summary_text() {
        let text = render_summary(&summary(), OutputFormat::Text).unwrap();
        assert!(text.contains("busy.example"));
        assert!(text.contains("Peak interval: busy.example repeated a 60s interval 899 times"));
        assert!(text.contains("Minute-scale intervals: 60-120s x899"));
        assert!(text.contains("Second-scale intervals: 60-61s x899"));
        assert!(text.contains("04:00"));
        assert!(text.contains("conn.jsonl"));
    }

    #[test]
    fn test_render_summary_jsonl_tags_rows() {
        let jsonl = render_summary(&summary(), OutputFormat::JsonLines).unwrap();
        let lines: Vec<serde_json::Value> = jsonl
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["type"], "summary");
        assert_eq!(lines[1]["type"], "request_count");
        assert_eq!(lines[2]["type"], "hourly_visits");
        assert_eq!(lines[3]["type"], "unique_hosts");
    }

    #[test]
    fn test_render_summary_csv_is_request_counts() {
        let csv_text = render_summary(&summary(), OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines[0], "host,request_count");
        assert_eq!(lines[1], "busy.example,900");
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_output("{}", Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_format_period() {
        assert_eq!(format_period(Some(60.0)), "60.0s");
        assert_eq!(format_period(Some(300.0)), "5.0m");
        assert_eq!(format_period(None), "N/A");
    }

    #[test]
    fn test_format_frequency() {
        assert_eq!(format_frequency(Some(1.0 / 60.0)), "16.667 mHz");
        assert_eq!(format_frequency(Some(0.5)), "0.500 Hz");
        assert_eq!(format_frequency(None), "N/A");
    }
}
