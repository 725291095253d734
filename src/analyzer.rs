//! Per-host periodicity analysis.
//!
//! This module runs the full detection pipeline for one host and folds the
//! outcome into a single verdict:
//!
//! 1. inter-arrival histogram over the sorted timestamps
//! 2. band-pass filtering of the bin-count signal (degrading to the raw
//!    signal when the band or the signal length does not allow it)
//! 3. baseline normalization into a salience curve
//! 4. presence signal → spectral dominant frequency
//! 5. presence signal → autocorrelation dominant lag
//!
//! # Statistical Methodology
//!
//! ## Jitter Metric (Coefficient of Variation)
//! CV = σ / μ over the inter-arrival deltas. The CV is dimensionless and
//! comparable across hosts with different beacon periods:
//! - CV < 0.1: highly regular cadence, machine-like
//! - 0.1 ≤ CV < 0.5: jittered but still suspicious regularity
//! - CV ≥ 1.0: stochastic, human-like
//!
//! ## Confidence
//! The autocorrelation peak value when one qualifies (alignment is the
//! stronger evidence), otherwise the spectral dominance ratio, otherwise
//! zero. Either way the verdict reports what each method saw.

use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::statistics::{Data, Distribution, Max, Min, OrderStatistics};
use tracing::debug;

use crate::autocorr;
use crate::baseline::{self, SaliencePoint};
use crate::config::Config;
use crate::event::HostEvent;
use crate::filter;
use crate::intervals::IntervalHistogram;
use crate::presence::PresenceSignal;
use crate::spectrum;

/// Outcome class of a host's analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// At least one method produced a periodicity finding.
    Detected,
    /// Analyzable, but neither method found anything.
    NoPeriodicity,
    /// Too little interval structure to run the pipeline.
    NotAnalyzable,
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detected => write!(f, "Periodicity Detected"),
            Self::NoPeriodicity => write!(f, "No Periodicity Detected"),
            Self::NotAnalyzable => write!(f, "Not Analyzable"),
        }
    }
}

/// Cadence regularity classification from the CV of the deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Regularity {
    /// CV < 0.1 - highly regular intervals, likely automated
    HighlyPeriodic,
    /// 0.1 ≤ CV < 0.5 - some jitter but suspicious regularity
    Jittered,
    /// 0.5 ≤ CV < 1.0 - moderate variation
    Moderate,
    /// CV ≥ 1.0 - high variation, likely human-driven
    Stochastic,
    /// Not enough deltas to classify
    Insufficient,
}

impl Regularity {
    /// Returns the classification for a CV value.
    pub fn from_cv(cv: f64) -> Self {
        match cv {
            cv if cv < 0.1 => Self::HighlyPeriodic,
            cv if cv < 0.5 => Self::Jittered,
            cv if cv < 1.0 => Self::Moderate,
            _ => Self::Stochastic,
        }
    }
}

impl std::fmt::Display for Regularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighlyPeriodic => write!(f, "Highly Periodic"),
            Self::Jittered => write!(f, "Jittered Periodic"),
            Self::Moderate => write!(f, "Moderate Variation"),
            Self::Stochastic => write!(f, "Stochastic"),
            Self::Insufficient => write!(f, "Insufficient Data"),
        }
    }
}

/// Statistical summary of a host's inter-arrival deltas, in seconds.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalStats {
    pub mean_secs: f64,
    pub std_dev_secs: f64,
    pub cv: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    pub median_secs: f64,
}

/// Calculates comprehensive statistics for a set of deltas.
pub fn calculate_statistics(deltas_secs: &[f64]) -> IntervalStats {
    let mut data = Data::new(deltas_secs.to_vec());

    let mean = data.mean().unwrap_or(0.0);
    let std_dev = data.std_dev().unwrap_or(0.0);
    let cv = if mean > 0.0 {
        std_dev / mean
    } else {
        f64::INFINITY
    };

    IntervalStats {
        mean_secs: mean,
        std_dev_secs: std_dev,
        cv,
        min_secs: data.min(),
        max_secs: data.max(),
        median_secs: data.median(),
    }
}

/// The complete analysis outcome for one host. Every non-excluded host
/// of a run gets exactly one of these.
#[derive(Debug, Clone, Serialize)]
pub struct HostVerdict {
    pub host: String,
    pub kind: VerdictKind,
    pub regularity: Regularity,
    /// Dominant spectral line of the presence signal, if any.
    pub dominant_frequency_hz: Option<f64>,
    /// Share of non-DC spectral magnitude held by the dominant line.
    pub spectral_dominance: Option<f64>,
    /// Dominant autocorrelation period, if a peak qualified.
    pub dominant_lag_secs: Option<f64>,
    /// Normalized autocorrelation at that lag.
    pub autocorr_value: Option<f64>,
    /// Combined confidence in [0, 1].
    pub confidence: f64,
    pub event_count: usize,
    /// Log rows for this host that failed to parse and were excluded.
    pub malformed_rows: u64,
    pub distinct_intervals: usize,
    pub interval_stats: Option<IntervalStats>,
    /// True when filtering fell back to the unfiltered signal.
    pub degraded_filter: bool,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Normalized salience per interval inside the band of interest.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub salience: Vec<SaliencePoint>,
}

impl HostVerdict {
    /// Human-readable severity for reports.
    pub fn severity(&self) -> &'static str {
        match self.kind {
            VerdictKind::NotAnalyzable => "UNKNOWN",
            VerdictKind::NoPeriodicity => "LOW",
            VerdictKind::Detected => {
                if self.confidence >= 0.5 {
                    match self.regularity {
                        Regularity::HighlyPeriodic => "CRITICAL",
                        _ => "HIGH",
                    }
                } else {
                    "MEDIUM"
                }
            }
        }
    }

    fn not_analyzable(
        host: &str,
        event_count: usize,
        malformed_rows: u64,
        distinct_intervals: usize,
        first_seen: Option<DateTime<Utc>>,
        last_seen: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            host: host.to_string(),
            kind: VerdictKind::NotAnalyzable,
            regularity: Regularity::Insufficient,
            dominant_frequency_hz: None,
            spectral_dominance: None,
            dominant_lag_secs: None,
            autocorr_value: None,
            confidence: 0.0,
            event_count,
            malformed_rows,
            distinct_intervals,
            interval_stats: None,
            degraded_filter: false,
            first_seen,
            last_seen,
            salience: Vec::new(),
        }
    }
}

/// Runs the detection pipeline for individual hosts.
pub struct HostAnalyzer {
    config: Config,
}

impl HostAnalyzer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Analyzes one host's events into a verdict.
    ///
    /// `malformed_rows` is the count of this host's log rows that failed
    /// parsing upstream; it rides along on the verdict. Failures inside
    /// the pipeline never escape as errors: an unusable histogram makes
    /// the host "not analyzable", a rejected filter band degrades to the
    /// unfiltered signal.
    pub fn analyze(&self, host: &str, events: &[HostEvent], malformed_rows: u64) -> HostVerdict {
        let mut timestamps: Vec<DateTime<Utc>> = events.iter().map(|e| e.timestamp).collect();
        timestamps.sort_unstable();

        let first_seen = timestamps.first().copied();
        let last_seen = timestamps.last().copied();
        let histogram = IntervalHistogram::from_sorted_timestamps(&timestamps);

        let rate = match histogram.sampling_rate(self.config.band.estimator) {
            Ok(rate) => rate,
            Err(err) => {
                debug!(host = %host, error = %err, "not analyzable");
                return HostVerdict::not_analyzable(
                    host,
                    events.len(),
                    malformed_rows,
                    histogram.distinct_keys(),
                    first_seen,
                    last_seen,
                );
            }
        };

        let raw_signal = histogram.values_in_order();
        let (signal, degraded_filter) = match filter::band_pass_filtfilt(
            &raw_signal,
            self.config.band.low_cut_secs,
            self.config.band.high_cut_secs,
            rate,
            self.config.band.order,
        ) {
            Ok(filtered) => (filtered, false),
            Err(err) => {
                debug!(host = %host, error = %err, "filter degraded to raw signal");
                (raw_signal, true)
            }
        };

        let normalized = baseline::normalize(&signal);
        let salience = baseline::restrict_to_band(
            &histogram.keys_in_order(),
            &normalized,
            self.config.band.low_cut_secs,
            self.config.band.high_cut_secs,
        );

        let step = self.config.presence.step_secs;
        let (spectral, periodicity) = match PresenceSignal::from_sorted_timestamps(&timestamps, step)
        {
            Some(presence) => (
                spectrum::dominant_frequency(&presence.values, step),
                autocorr::detect_period(&presence.values, step, self.config.autocorr.threshold),
            ),
            None => (None, None),
        };

        let confidence = periodicity
            .map(|p| p.value)
            .or_else(|| spectral.map(|s| s.dominance))
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        let kind = if spectral.is_none() && periodicity.is_none() {
            VerdictKind::NoPeriodicity
        } else {
            VerdictKind::Detected
        };

        let stats = calculate_statistics(&histogram.expanded_deltas());
        let regularity = Regularity::from_cv(stats.cv);

        debug!(
            host = %host,
            kind = %kind,
            confidence,
            degraded_filter,
            "host analyzed"
        );

        HostVerdict {
            host: host.to_string(),
            kind,
            regularity,
            dominant_frequency_hz: spectral.map(|s| s.frequency_hz),
            spectral_dominance: spectral.map(|s| s.dominance),
            dominant_lag_secs: periodicity.map(|p| p.period_secs),
            autocorr_value: periodicity.map(|p| p.value),
            confidence,
            event_count: events.len(),
            malformed_rows,
            distinct_intervals: histogram.distinct_keys(),
            interval_stats: Some(stats),
            degraded_filter,
            first_seen,
            last_seen,
            salience,
        }
    }
}
