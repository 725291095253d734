//! End-to-end tests: synthetic logs through ingestion, analysis and export.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use beaconsift::analyzer::VerdictKind;
use beaconsift::config::Config;
use beaconsift::export::{self, OutputFormat};
use beaconsift::pipeline::{self, Pipeline};
use beaconsift::source;
use beaconsift::summary;
use beaconsift::synth::{self, SynthConfig};

fn synth_file(dir: &Path, name: &str, config: &SynthConfig, seed: u64) -> PathBuf {
    let events = synth::generate_events(config, &mut StdRng::seed_from_u64(seed));
    let path = dir.join(name);
    synth::write_jsonl(&events, &path).unwrap();
    path
}

fn beacon_with_organics() -> SynthConfig {
    SynthConfig {
        host: "beacon1.example".to_string(),
        events: 400,
        period_secs: 60,
        jitter_secs: 2,
        organic_hosts: 2,
        organic_events: 120,
        ..SynthConfig::default()
    }
}

#[tokio::test]
async fn test_synthetic_beacon_detected_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    synth_file(dir.path(), "synthetic.jsonl", &beacon_with_organics(), 7);

    let report = Pipeline::new(Config::default())
        .run(dir.path())
        .await
        .unwrap();

    assert_eq!(report.hosts_analyzed, 3);
    assert_eq!(report.total_events, 400 + 2 * 120);
    assert_eq!(report.malformed_rows, 0);

    let beacon = report
        .verdicts
        .iter()
        .find(|v| v.host == "beacon1.example")
        .unwrap();
    assert_eq!(beacon.kind, VerdictKind::Detected);
    assert_eq!(beacon.event_count, 400);
    // steps of 58..=62 s leave five histogram keys
    assert_eq!(beacon.distinct_intervals, 5);
    // whole-second intervals sample at 1 Hz, so the configured band
    // cannot be realized and the filter falls back
    assert!(beacon.degraded_filter);

    // the 60 s cadence dominates the spectrum despite the jitter
    let freq = beacon.dominant_frequency_hz.unwrap();
    assert!(
        (freq - 1.0 / 60.0).abs() < 1e-3,
        "dominant frequency {} Hz",
        freq
    );
    // accumulated jitter scatters exact lag alignment below threshold,
    // so the finding rides on the spectrum alone
    assert!(beacon.dominant_lag_secs.is_none());
    assert!(beacon.confidence > 0.0);

    let stats = beacon.interval_stats.as_ref().unwrap();
    assert!((stats.mean_secs - 60.0).abs() < 1.0);
    assert!(stats.cv < 0.1);
}

#[tokio::test]
async fn test_excluded_synthetic_hosts_absent() {
    let dir = tempfile::tempdir().unwrap();
    synth_file(dir.path(), "synthetic.jsonl", &beacon_with_organics(), 7);

    let mut config = Config::default();
    config.exclusions.patterns = vec!["organic".to_string()];

    let report = Pipeline::new(config).run(dir.path()).await.unwrap();
    assert_eq!(report.hosts_analyzed, 1);
    assert_eq!(report.excluded_hosts, 2);
    assert_eq!(report.excluded_events, 240);
    assert!(report.verdicts.iter().all(|v| !v.host.contains("organic")));
}

#[tokio::test]
async fn test_report_renders_in_every_format() {
    let dir = tempfile::tempdir().unwrap();
    synth_file(dir.path(), "synthetic.jsonl", &beacon_with_organics(), 7);

    let report = Pipeline::new(Config::default())
        .run(dir.path())
        .await
        .unwrap();

    let text = export::render_report(&report, OutputFormat::Text).unwrap();
    assert!(text.contains("beacon1.example"));

    let json = export::render_report(&report, OutputFormat::Json).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["hosts_analyzed"], 3);

    let jsonl = export::render_report(&report, OutputFormat::JsonLines).unwrap();
    assert_eq!(jsonl.lines().count(), 1 + report.verdicts.len());

    let csv_text = export::render_report(&report, OutputFormat::Csv).unwrap();
    // header plus one row per verdict
    assert_eq!(csv_text.lines().count(), 1 + report.verdicts.len());
}

#[tokio::test]
async fn test_summary_over_synthetic_run() {
    let dir = tempfile::tempdir().unwrap();
    synth_file(dir.path(), "synthetic.jsonl", &beacon_with_organics(), 7);

    let files = source::collect_input_files(dir.path()).unwrap();
    let batches = pipeline::ingest_files(&files).await.unwrap();

    let mut config = Config::default();
    config.summary.request_count_floor = 200;
    config.summary.hourly_visit_floor = 10_000; // suppress the hourly table

    let report = summary::build_summary(&batches, &config.exclusions, &config.summary);
    assert_eq!(report.hosts_seen, 3);
    // only the beacon clears the 200-event floor
    assert_eq!(report.request_counts.len(), 1);
    assert_eq!(report.request_counts[0].host, "beacon1.example");
    assert_eq!(report.request_counts[0].count, 400);

    assert_eq!(report.unique_hosts_per_file.len(), 1);
    assert_eq!(report.unique_hosts_per_file[0].unique_hosts, 3);

    // ~80 repeats of the beacon's modal step dwarf anything organic
    let peak = report.peak_interval_host.unwrap();
    assert_eq!(peak.host, "beacon1.example");
    assert!(peak.occurrences > 50);
    assert!((58..=62).contains(&peak.interval_secs));

    // every beacon delta (58..=62 s) fits the second-scale panel
    let seconds_total: u64 = report.peak_seconds_panel.iter().map(|b| b.count).sum();
    assert_eq!(seconds_total, 399);
    assert!(report
        .peak_seconds_panel
        .iter()
        .all(|b| (58..=62).contains(&b.lo)));
    // the minute-scale panel keeps only the 60-62 s deltas
    let minutes_total: u64 = report.peak_minutes_panel.iter().map(|b| b.count).sum();
    assert!(minutes_total > 0 && minutes_total < seconds_total);
    assert!(report.peak_minutes_panel.iter().all(|b| b.lo == 60));
}

#[tokio::test]
async fn test_csv_logs_with_bare_times_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conn.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "_time,url_hostname,user").unwrap();
    for secs in [0, 60, 121, 179, 241, 301, 360] {
        let time = Utc.timestamp_opt(secs, 0).unwrap().format("%H:%M:%S");
        writeln!(file, "{},jitter.example,-", time).unwrap();
    }
    drop(file);

    let report = Pipeline::new(Config::default())
        .run(dir.path())
        .await
        .unwrap();

    assert_eq!(report.hosts_analyzed, 1);
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.kind, VerdictKind::Detected);
    let freq = verdict.dominant_frequency_hz.unwrap();
    assert!((freq - 1.0 / 60.0).abs() <= 1.0 / 361.0);
}

#[tokio::test]
async fn test_realizable_band_skips_degrade_path() {
    // deltas 10..=40 s: 31 distinct keys one second apart at the low
    // end, so the estimated rate is 1 Hz and a sub-Nyquist band holds
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spread.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    let mut cursor = 0i64;
    let mut write_event = |secs: i64, file: &mut std::fs::File| {
        let ts = Utc.timestamp_opt(secs, 0).unwrap().to_rfc3339();
        writeln!(
            file,
            r#"{{"logdate": "{}", "url_hostname": "spread.example"}}"#,
            ts
        )
        .unwrap();
    };
    write_event(cursor, &mut file);
    for delta in 10..=40 {
        cursor += delta;
        write_event(cursor, &mut file);
    }
    drop(file);

    let mut config = Config::default();
    config.band.low_cut_secs = 0.2;
    config.band.high_cut_secs = 0.45;
    config.validate().unwrap();

    let report = Pipeline::new(config).run(dir.path()).await.unwrap();
    let verdict = &report.verdicts[0];
    assert!(!verdict.degraded_filter);
    // no whole-second interval lies inside the fractional band
    assert!(verdict.salience.is_empty());
}
