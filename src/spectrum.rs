//! Spectral periodicity detection.
//!
//! A forward DFT over the presence signal, scanned on the non-negative
//! frequency half with the DC bin excluded. Excluding DC matters: a 0/1
//! presence signal always has its largest raw component at frequency zero,
//! which says "events exist", not "events repeat". A flat signal therefore
//! reports no dominant frequency at all rather than 0 Hz.

use rustfft::{num_complex::Complex, FftPlanner};

/// Dominant spectral line of a presence signal.
#[derive(Debug, Clone, Copy)]
pub struct SpectralPeak {
    /// Center of the winning bin in Hz.
    pub frequency_hz: f64,
    /// Raw DFT magnitude at that bin.
    pub magnitude: f64,
    /// Peak magnitude over the summed non-DC magnitudes, in (0, 1].
    pub dominance: f64,
}

/// Finds the dominant non-DC frequency of a regularly sampled signal.
///
/// Bins `1..n/2` are inspected; bin `k` maps to `k / (n * step)` Hz. Ties
/// resolve to the lowest bin, favoring the fundamental over harmonics.
/// Returns `None` when no bin rises above numeric noise (all-zero or
/// constant input) or when the signal is too short to have a non-DC bin.
pub fn dominant_frequency(values: &[f64], step_secs: f64) -> Option<SpectralPeak> {
    let n = values.len();
    if n / 2 <= 1 {
        return None;
    }

    let mut buffer: Vec<Complex<f64>> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    let mut best_bin = 0usize;
    let mut best_mag = 0.0f64;
    let mut total = 0.0f64;
    for (k, value) in buffer.iter().enumerate().take(n / 2).skip(1) {
        let mag = value.norm();
        total += mag;
        if mag > best_mag {
            best_mag = mag;
            best_bin = k;
        }
    }

    let noise_floor = 1e-9 * (n as f64).max(1.0);
    if best_bin == 0 || best_mag <= noise_floor || total <= 0.0 {
        return None;
    }

    Some(SpectralPeak {
        frequency_hz: best_bin as f64 / (n as f64 * step_secs),
        magnitude: best_mag,
        dominance: best_mag / total,
    })
}
