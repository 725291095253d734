//! Configuration Module
//!
//! Provides TOML-based configuration for beaconsift.
//! Configuration is optional - CLI arguments can override file settings.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::export::OutputFormat;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub band: BandConfig,
    pub presence: PresenceConfig,
    pub autocorr: AutocorrConfig,
    pub exclusions: ExclusionConfig,
    pub output: OutputConfig,
    pub summary: SummaryConfig,
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads configuration from file if it exists, otherwise returns defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::load(p).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Generates a default configuration file content
    pub fn generate_default() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| "# Failed to generate config".to_string())
    }

    /// Validates the configuration
    ///
    /// Configuration errors are the only fatal class in a run; everything
    /// downstream degrades per host instead of aborting.
    pub fn validate(&self) -> Result<()> {
        if self.band.order == 0 || self.band.order > 16 {
            anyhow::bail!("filter order must be between 1 and 16");
        }
        if self.band.low_cut_secs <= 0.0 {
            anyhow::bail!("low_cut_secs must be greater than 0");
        }
        if self.band.high_cut_secs <= self.band.low_cut_secs {
            anyhow::bail!("high_cut_secs must be greater than low_cut_secs");
        }
        if self.presence.step_secs <= 0.0 {
            anyhow::bail!("step_secs must be greater than 0");
        }
        if self.autocorr.threshold <= 0.0 || self.autocorr.threshold > 1.0 {
            anyhow::bail!("autocorr threshold must be between 0.0 (exclusive) and 1.0");
        }
        Ok(())
    }
}

/// Band-pass filter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BandConfig {
    /// Lower edge of the interval band of interest, in seconds
    pub low_cut_secs: f64,
    /// Upper edge of the interval band of interest, in seconds
    pub high_cut_secs: f64,
    /// Butterworth filter order
    pub order: usize,
    /// How the histogram sampling rate is estimated
    pub estimator: RateEstimator,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            low_cut_secs: 5.0,
            high_cut_secs: 1000.0,
            order: 4,
            estimator: RateEstimator::FirstKeys,
        }
    }
}

/// Sampling-rate estimator for the interval histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RateEstimator {
    /// 1 / (spacing of the two smallest histogram keys)
    #[default]
    FirstKeys,
    /// 1 / (median inter-arrival delta), more robust on spiky histograms
    MedianDelta,
}

impl std::fmt::Display for RateEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstKeys => write!(f, "first-keys"),
            Self::MedianDelta => write!(f, "median-delta"),
        }
    }
}

impl std::str::FromStr for RateEstimator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first-keys" => Ok(Self::FirstKeys),
            "median-delta" => Ok(Self::MedianDelta),
            _ => Err(format!(
                "Unknown estimator: {} (expected first-keys or median-delta)",
                s
            )),
        }
    }
}

/// Presence-signal configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Sampling grid step in seconds
    pub step_secs: f64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { step_secs: 1.0 }
    }
}

/// Autocorrelation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutocorrConfig {
    /// Minimum normalized autocorrelation for a lag to count as a peak
    pub threshold: f64,
}

impl Default for AutocorrConfig {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

/// Host exclusion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// Case-sensitive substrings; hosts containing any of them are dropped
    pub patterns: Vec<String>,
    /// Analyze events that carried no hostname (the "unknown" bucket)
    pub include_unknown: bool,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            include_unknown: false,
        }
    }
}

/// Output-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format (text, json, jsonl, csv)
    #[serde(with = "output_format_serde")]
    pub format: OutputFormat,
    /// Output file path (None = stdout)
    pub file: Option<String>,
    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            verbose: false,
        }
    }
}

/// Summary-report configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Hosts must exceed this many events to appear in the request-count table
    pub request_count_floor: u64,
    /// (host, hour) buckets below this visit count are dropped from the hourly profile
    pub hourly_visit_floor: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            request_count_floor: 500,
            hourly_visit_floor: 500,
        }
    }
}

/// Custom serde implementation for OutputFormat
mod output_format_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(format: &OutputFormat, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OutputFormat, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
