//! Synthetic beacon-log generation.
//!
//! Produces artificial connection logs for exercising the pipeline: one
//! beaconing host walking forward in near-constant steps, optionally
//! surrounded by "organic" hosts with wide random gaps. Output is the
//! same JSONL shape the file sources ingest, so generated data round-trips
//! through the whole pipeline.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::info;

use crate::event::HostEvent;

/// Parameters for one synthetic log.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    /// Hostname the beacon contacts.
    pub host: String,
    /// Number of beacon events.
    pub events: usize,
    /// Base step between beacon events, whole seconds.
    pub period_secs: i64,
    /// Uniform jitter applied to each step, in ±seconds.
    pub jitter_secs: i64,
    /// Timestamp of the step before the first event.
    pub start: DateTime<Utc>,
    /// Number of irregular background hosts to mix in.
    pub organic_hosts: usize,
    /// Events per background host.
    pub organic_events: usize,
    /// Background gaps are drawn uniformly from [1, this] seconds.
    pub organic_max_step_secs: i64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            host: "beacon1.example".to_string(),
            events: 12_000,
            period_secs: 2,
            jitter_secs: 1,
            start: DateTime::UNIX_EPOCH,
            organic_hosts: 0,
            organic_events: 500,
            organic_max_step_secs: 900,
        }
    }
}

/// Generates the synthetic event stream.
///
/// Beacon steps are drawn uniformly from
/// `[max(1, period - jitter), period + jitter]`, so time always moves
/// forward and events within a host come out sorted.
pub fn generate_events(config: &SynthConfig, rng: &mut impl Rng) -> Vec<HostEvent> {
    let lo = (config.period_secs - config.jitter_secs).max(1);
    let hi = (config.period_secs + config.jitter_secs).max(lo);

    let mut events = Vec::with_capacity(config.events + config.organic_hosts * config.organic_events);

    let mut cursor = config.start;
    for _ in 0..config.events {
        cursor += Duration::seconds(rng.gen_range(lo..=hi));
        events.push(HostEvent::new(config.host.clone(), cursor));
    }

    for i in 0..config.organic_hosts {
        let host = format!("organic{}.example", i + 1);
        let mut cursor = config.start;
        for _ in 0..config.organic_events {
            cursor += Duration::seconds(rng.gen_range(1..=config.organic_max_step_secs.max(1)));
            events.push(HostEvent::new(host.clone(), cursor));
        }
    }

    events
}

/// Writes events as JSONL in the ingestion format.
pub fn write_jsonl(events: &[HostEvent], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);

    for event in events {
        let line = serde_json::json!({
            "logdate": event.timestamp.to_rfc3339(),
            "url_hostname": event.host,
            "user": "-",
        });
        writeln!(writer, "{}", line)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;

    info!(path = %path.display(), events = events.len(), "synthetic log written");
    Ok(())
}
