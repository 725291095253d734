//! Dense presence signal on a fixed sampling grid.
//!
//! Spectral and autocorrelation analysis need evenly spaced samples, so a
//! host's irregular timestamps are projected onto a step grid anchored at
//! the first event: 1.0 where at least one event fell into a grid cell,
//! 0.0 elsewhere.

use chrono::{DateTime, Utc};

/// A 0/1 activity signal with its sampling step.
#[derive(Debug, Clone)]
pub struct PresenceSignal {
    pub values: Vec<f64>,
    pub step_secs: f64,
}

impl PresenceSignal {
    /// Builds the signal from timestamps already sorted ascending.
    ///
    /// The grid spans `floor((last - first) / step) + 1` cells; a cell is
    /// set when any event lands in it, so duplicates collapse to a single
    /// 1.0. Returns `None` for an empty slice.
    pub fn from_sorted_timestamps(timestamps: &[DateTime<Utc>], step_secs: f64) -> Option<Self> {
        let first = *timestamps.first()?;
        let last = *timestamps.last()?;

        let span_secs = (last - first).num_milliseconds() as f64 / 1000.0;
        let len = (span_secs / step_secs).floor() as usize + 1;
        let mut values = vec![0.0; len];

        for &t in timestamps {
            let offset = (t - first).num_milliseconds() as f64 / 1000.0;
            let idx = (offset / step_secs).floor() as usize;
            values[idx] = 1.0;
        }

        Some(Self { values, step_secs })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of grid cells with activity.
    pub fn active_cells(&self) -> usize {
        self.values.iter().filter(|&&v| v > 0.0).count()
    }
}
