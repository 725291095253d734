//! Aggregate traffic summaries.
//!
//! Pure data producers over ingested batches, independent of the
//! detection pipeline: per-host request counts above a floor, an hourly
//! visit profile with day/night averages, per-file unique-host counts,
//! and the host whose single most repeated inter-arrival interval is
//! the tallest of the run. Rendering lives in `export`.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::config::{ExclusionConfig, SummaryConfig};
use crate::event::{self, HostEvent, UNKNOWN_HOST};
use crate::intervals::{IntervalHistogram, RebinnedBin};
use crate::pipeline::FileBatch;

/// One host over the request-count floor.
#[derive(Debug, Clone, Serialize)]
pub struct RequestCountRow {
    pub host: String,
    pub count: u64,
}

/// One (host, hour-of-day) bucket over the visit floor.
#[derive(Debug, Clone, Serialize)]
pub struct HourlyVisitRow {
    pub host: String,
    /// Hour of day, 0-23.
    pub hour: u32,
    pub count: u64,
}

/// Unique hosts contacted per input file.
#[derive(Debug, Clone, Serialize)]
pub struct UniqueHostRow {
    pub file: String,
    pub unique_hosts: usize,
}

/// The host whose most repeated interval is the tallest of the run.
#[derive(Debug, Clone, Serialize)]
pub struct PeakIntervalHost {
    pub host: String,
    pub interval_secs: u64,
    pub occurrences: u64,
}

/// Aggregate summary over one ingested run.
#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub generated_at: DateTime<Utc>,
    /// Events surviving exclusion, across all files.
    pub total_events: usize,
    /// Distinct non-excluded hosts seen.
    pub hosts_seen: usize,
    /// Hosts with strictly more events than the configured floor,
    /// busiest first.
    pub request_counts: Vec<RequestCountRow>,
    /// (host, hour) buckets at or above the visit floor, by host then hour.
    pub hourly: Vec<HourlyVisitRow>,
    /// Mean visit count of kept hourly buckets in hours 0-4 inclusive.
    pub day_avg: Option<f64>,
    /// Mean visit count of kept hourly buckets in hours 4-23 inclusive.
    /// Hour 4 deliberately contributes to both averages.
    pub night_avg: Option<f64>,
    pub unique_hosts_per_file: Vec<UniqueHostRow>,
    pub peak_interval_host: Option<PeakIntervalHost>,
    /// Nonzero `[lo, hi)` buckets of the peak host's per-second interval
    /// view (0-65 s).
    pub peak_seconds_panel: Vec<RebinnedBin>,
    /// Same host's per-minute view, 1-30 min plus an overflow bucket;
    /// sub-minute intervals are dropped, not zeroed.
    pub peak_minutes_panel: Vec<RebinnedBin>,
}

/// Resolves the host bucket an event counts under, applying the same
/// exclusion rules as segmentation. `None` means the event is dropped.
fn included_host(event: &HostEvent, exclusions: &ExclusionConfig) -> Option<String> {
    let host = event
        .host
        .clone()
        .unwrap_or_else(|| UNKNOWN_HOST.to_string());
    let hostless = event.host.is_none();
    if (hostless && !exclusions.include_unknown)
        || event::is_excluded(&host, &exclusions.patterns)
    {
        None
    } else {
        Some(host)
    }
}

/// Builds the summary tables from per-file batches.
pub fn build_summary(
    batches: &[FileBatch],
    exclusions: &ExclusionConfig,
    config: &SummaryConfig,
) -> SummaryReport {
    let mut unique_hosts_per_file = Vec::with_capacity(batches.len());
    let mut per_host: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
    let mut hourly_counts: BTreeMap<(String, u32), u64> = BTreeMap::new();
    let mut total_events = 0usize;

    for file_batch in batches {
        let mut seen: HashSet<String> = HashSet::new();
        for event in &file_batch.batch.events {
            let Some(host) = included_host(event, exclusions) else {
                continue;
            };
            total_events += 1;
            *hourly_counts
                .entry((host.clone(), event.timestamp.hour()))
                .or_insert(0) += 1;
            seen.insert(host.clone());
            per_host.entry(host).or_default().push(event.timestamp);
        }
        unique_hosts_per_file.push(UniqueHostRow {
            file: file_batch.file.clone(),
            unique_hosts: seen.len(),
        });
    }
    unique_hosts_per_file.sort_by(|a, b| a.file.cmp(&b.file));

    // request counts: strictly above the floor, busiest first
    let mut request_counts: Vec<RequestCountRow> = per_host
        .iter()
        .map(|(host, timestamps)| RequestCountRow {
            host: host.clone(),
            count: timestamps.len() as u64,
        })
        .filter(|row| row.count > config.request_count_floor)
        .collect();
    request_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.host.cmp(&b.host)));

    // hourly profile: buckets at or above the floor
    let hourly: Vec<HourlyVisitRow> = hourly_counts
        .into_iter()
        .filter(|(_, count)| *count >= config.hourly_visit_floor)
        .map(|((host, hour), count)| HourlyVisitRow { host, hour, count })
        .collect();
    let day_avg = hour_range_avg(&hourly, 0, 4);
    let night_avg = hour_range_avg(&hourly, 4, 23);

    // the tallest single histogram bin of the run; ties keep the
    // alphabetically first host
    let mut peak_interval_host: Option<PeakIntervalHost> = None;
    let mut peak_histogram: Option<IntervalHistogram> = None;
    for (host, timestamps) in per_host.iter_mut() {
        timestamps.sort_unstable();
        let histogram = IntervalHistogram::from_sorted_timestamps(timestamps);
        if let Some((interval_secs, occurrences)) = histogram.peak() {
            let tallest_so_far = peak_interval_host
                .as_ref()
                .map(|p| p.occurrences)
                .unwrap_or(0);
            if occurrences > tallest_so_far {
                peak_interval_host = Some(PeakIntervalHost {
                    host: host.clone(),
                    interval_secs,
                    occurrences,
                });
                peak_histogram = Some(histogram);
            }
        }
    }

    let nonzero = |bins: Vec<RebinnedBin>| -> Vec<RebinnedBin> {
        bins.into_iter().filter(|b| b.count > 0).collect()
    };
    let (peak_seconds_panel, peak_minutes_panel) = match &peak_histogram {
        Some(histogram) => (
            nonzero(histogram.rebin_seconds_panel()),
            nonzero(histogram.rebin_minutes_panel()),
        ),
        None => (Vec::new(), Vec::new()),
    };

    SummaryReport {
        generated_at: Utc::now(),
        total_events,
        hosts_seen: per_host.len(),
        request_counts,
        hourly,
        day_avg,
        night_avg,
        unique_hosts_per_file,
        peak_interval_host,
        peak_seconds_panel,
        peak_minutes_panel,
    }
}

/// Mean visit count of hourly rows with hour in `[lo, hi]` inclusive.
fn hour_range_avg(rows: &[HourlyVisitRow], lo: u32, hi: u32) -> Option<f64> {
    let counts: Vec<u64> = rows
        .iter()
        .filter(|row| row.hour >= lo && row.hour <= hi)
        .map(|row| row.count)
        .collect();
    if counts.is_empty() {
        return None;
    }
    Some(counts.iter().sum::<u64>() as f64 / counts.len() as f64)
}
