//! Inter-arrival interval extraction.
//!
//! The interval histogram is the core signal carrier: adjacent-pair deltas
//! in whole seconds over a host's time-sorted events, bucketed by delta.
//! Ascending key order is the consumption order for every downstream stage.
//!
//! Display rebinning uses one convention throughout: bins are left-closed,
//! right-open `[lo, hi)`, with an optional unbounded overflow bucket at the
//! top. Out-of-range deltas are dropped from a rebinned view, never zeroed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics};

use crate::config::RateEstimator;
use crate::error::AnalysisError;

/// Histogram of inter-arrival deltas, keyed by whole seconds.
///
/// Deltas are truncated toward zero, never rounded, so a 59.9 s gap lands
/// in bin 59. Invariant: the value sum equals the event count minus one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalHistogram {
    bins: BTreeMap<u64, u64>,
}

impl IntervalHistogram {
    /// Builds the histogram from timestamps already sorted ascending.
    ///
    /// Fewer than two timestamps yield an empty histogram.
    pub fn from_sorted_timestamps(timestamps: &[DateTime<Utc>]) -> Self {
        let mut bins: BTreeMap<u64, u64> = BTreeMap::new();
        for pair in timestamps.windows(2) {
            // sorted input, so the delta is non-negative and num_seconds
            // truncation matches the whole-second floor
            let delta = (pair[1] - pair[0]).num_seconds().max(0) as u64;
            *bins.entry(delta).or_insert(0) += 1;
        }
        Self { bins }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Number of distinct interval keys.
    pub fn distinct_keys(&self) -> usize {
        self.bins.len()
    }

    /// Sum of all bin counts (event count minus one).
    pub fn total_count(&self) -> u64 {
        self.bins.values().sum()
    }

    /// Interval keys in ascending order.
    pub fn keys_in_order(&self) -> Vec<u64> {
        self.bins.keys().copied().collect()
    }

    /// Bin counts in ascending key order, as the raw analysis signal.
    pub fn values_in_order(&self) -> Vec<f64> {
        self.bins.values().map(|&v| v as f64).collect()
    }

    /// Ascending (key, count) iteration.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.bins.iter().map(|(&k, &v)| (k, v))
    }

    /// The bin with the highest count, ties broken toward the smaller key.
    pub fn peak(&self) -> Option<(u64, u64)> {
        self.bins
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&k, &v)| (k, v))
    }

    /// Every delta repeated by its count, for order statistics.
    pub fn expanded_deltas(&self) -> Vec<f64> {
        let mut deltas = Vec::with_capacity(self.total_count() as usize);
        for (&key, &count) in &self.bins {
            for _ in 0..count {
                deltas.push(key as f64);
            }
        }
        deltas
    }

    /// Estimates the sampling rate of the bin-count signal in Hz.
    ///
    /// The literal estimator uses the spacing of the two smallest keys;
    /// the median estimator uses the median delta and falls back to the
    /// literal spacing when that median is zero. Fewer than two distinct
    /// keys make the host unanalyzable.
    pub fn sampling_rate(&self, estimator: RateEstimator) -> Result<f64, AnalysisError> {
        let keys = self.keys_in_order();
        if keys.len() < 2 {
            return Err(AnalysisError::InsufficientData {
                required: 2,
                actual: keys.len(),
            });
        }
        let first_spacing = (keys[1] - keys[0]) as f64;

        let spacing = match estimator {
            RateEstimator::FirstKeys => first_spacing,
            RateEstimator::MedianDelta => {
                let mut data = Data::new(self.expanded_deltas());
                let median = data.median();
                if median > 0.0 {
                    median
                } else {
                    first_spacing
                }
            }
        };
        Ok(1.0 / spacing)
    }

    /// Rebins into fixed `[lo, hi)` buckets given ascending edges.
    ///
    /// `overflow` appends an unbounded bucket above the last edge. Deltas
    /// below the first edge or, without overflow, at or above the last
    /// edge are dropped.
    pub fn rebin(&self, edges: &[u64], overflow: bool) -> Vec<RebinnedBin> {
        let mut out: Vec<RebinnedBin> = edges
            .windows(2)
            .map(|w| RebinnedBin {
                lo: w[0],
                hi: Some(w[1]),
                count: 0,
            })
            .collect();
        if overflow {
            if let Some(&last) = edges.last() {
                out.push(RebinnedBin {
                    lo: last,
                    hi: None,
                    count: 0,
                });
            }
        }

        for (&key, &count) in &self.bins {
            if let Some(bin) = out
                .iter_mut()
                .find(|b| key >= b.lo && b.hi.map_or(true, |hi| key < hi))
            {
                bin.count += count;
            }
        }
        out
    }

    /// Per-second view of the first 65 seconds, out-of-range dropped.
    pub fn rebin_seconds_panel(&self) -> Vec<RebinnedBin> {
        let edges: Vec<u64> = (0..=65).collect();
        self.rebin(&edges, false)
    }

    /// Per-minute view from 1 to 30 minutes with a `>30min` overflow bucket;
    /// sub-minute deltas dropped.
    pub fn rebin_minutes_panel(&self) -> Vec<RebinnedBin> {
        let edges: Vec<u64> = (1..=30).map(|m| m * 60).collect();
        self.rebin(&edges, true)
    }
}

/// One `[lo, hi)` display bucket; `hi == None` marks the overflow bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebinnedBin {
    pub lo: u64,
    pub hi: Option<u64>,
    pub count: u64,
}

impl RebinnedBin {
    pub fn label(&self) -> String {
        match self.hi {
            Some(hi) => format!("{}-{}s", self.lo, hi),
            None => format!(">={}s", self.lo),
        }
    }
}
