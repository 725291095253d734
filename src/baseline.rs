//! Baseline normalization of the filtered interval signal.
//!
//! Subtracting the mean centers the curve so only above-baseline activity
//! survives the zero clip; what remains inside the interval band of
//! interest is the salience curve a host is judged on.

use serde::Serialize;
use statrs::statistics::{Data, Distribution};

/// One (interval, salience) point of a host's salience curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SaliencePoint {
    pub interval_secs: u64,
    pub salience: f64,
}

/// Elementwise mean subtraction. The output sums to zero up to rounding.
pub fn subtract_mean(values: &[f64]) -> Vec<f64> {
    let mean = Data::new(values.to_vec()).mean().unwrap_or(0.0);
    values.iter().map(|v| v - mean).collect()
}

/// Mean subtraction followed by a clip at zero.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    subtract_mean(values)
        .into_iter()
        .map(|v| v.max(0.0))
        .collect()
}

/// Pairs interval keys with their normalized values and keeps the points
/// whose key lies inside `[low_secs, high_secs]`, both ends inclusive.
/// Out-of-band points are dropped, not zeroed.
pub fn restrict_to_band(
    keys: &[u64],
    values: &[f64],
    low_secs: f64,
    high_secs: f64,
) -> Vec<SaliencePoint> {
    keys.iter()
        .zip(values.iter())
        .filter(|(&k, _)| {
            let k = k as f64;
            k >= low_secs && k <= high_secs
        })
        .map(|(&k, &v)| SaliencePoint {
            interval_secs: k,
            salience: v,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtract_mean_centers() {
        let centered = subtract_mean(&[1.0, 2.0, 3.0, 6.0]);
        let sum: f64 = centered.iter().sum();
        assert!(sum.abs() < 1e-12);
        assert_eq!(centered[0], -2.0);
        assert_eq!(centered[3], 3.0);
    }

    #[test]
    fn test_normalize_clips_at_zero() {
        let normalized = normalize(&[1.0, 2.0, 3.0, 6.0]);
        assert!(normalized.iter().all(|&v| v >= 0.0));
        assert_eq!(normalized, vec![0.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_band_bounds_are_inclusive() {
        let keys = [3, 5, 60, 1000, 1001];
        let values = [0.5, 1.5, 2.5, 3.5, 4.5];
        let curve = restrict_to_band(&keys, &values, 5.0, 1000.0);
        let kept: Vec<u64> = curve.iter().map(|p| p.interval_secs).collect();
        assert_eq!(kept, vec![5, 60, 1000]);
        // dropped, never zero-filled
        assert_eq!(curve.len(), 3);
        assert_eq!(curve[0].salience, 1.5);
        assert_eq!(curve[2].salience, 3.5);
    }
}
