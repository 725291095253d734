//! Connection-log event model and per-host segmentation.
//!
//! A run owns one flat batch of events; segmentation partitions it into
//! per-host groups and applies the exclusion rules before any analysis
//! happens. Hosts dropped here never surface in a verdict or an export.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::ExclusionConfig;

/// Bucket name for events that carried no hostname.
pub const UNKNOWN_HOST: &str = "unknown";

/// One connection-log event: who was contacted, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEvent {
    /// Destination hostname; `None` until segmentation assigns the
    /// explicit "unknown" bucket.
    pub host: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HostEvent {
    pub fn new(host: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            host: Some(host.into()),
            timestamp,
        }
    }
}

/// Events partitioned by host, plus tallies for what segmentation dropped.
#[derive(Debug, Default)]
pub struct SegmentedEvents {
    /// Per-host event groups, order within a group as received.
    pub groups: HashMap<String, Vec<HostEvent>>,
    /// Number of distinct hosts removed by exclusion rules.
    pub excluded_hosts: usize,
    /// Number of events removed with them.
    pub excluded_events: u64,
}

/// Returns true if the host matches any exclusion pattern.
///
/// Patterns are case-sensitive substrings; "allianz" does not match
/// "Allianz.example".
pub fn is_excluded(host: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| host.contains(p.as_str()))
}

/// Partitions a flat event batch into per-host groups.
///
/// Every event lands in exactly one group or in the excluded tally; hostless
/// events go to the "unknown" bucket, which is itself excluded unless
/// `include_unknown` is set. Group iteration order is unspecified; callers
/// that need determinism sort downstream.
pub fn segment(events: Vec<HostEvent>, exclusions: &ExclusionConfig) -> SegmentedEvents {
    let mut groups: HashMap<String, Vec<HostEvent>> = HashMap::new();
    let mut dropped: HashMap<String, u64> = HashMap::new();

    for event in events {
        let host = event
            .host
            .clone()
            .unwrap_or_else(|| UNKNOWN_HOST.to_string());

        let unknown = host == UNKNOWN_HOST && event.host.is_none();
        let excluded =
            (unknown && !exclusions.include_unknown) || is_excluded(&host, &exclusions.patterns);

        if excluded {
            *dropped.entry(host).or_insert(0) += 1;
        } else {
            groups.entry(host).or_default().push(event);
        }
    }

    for (host, count) in &dropped {
        tracing::debug!(host = %host, events = count, "excluded by segmentation");
    }

    SegmentedEvents {
        groups,
        excluded_hosts: dropped.len(),
        excluded_events: dropped.values().sum(),
    }
}
