//! beaconsift: periodic beacon detection from connection logs.
//!
//! Analyzes timestamped per-host connection events and flags hosts that
//! are contacted on a near-constant cadence, the signature of C2
//! beaconing. The unit of analysis is the destination hostname; every
//! non-excluded host of a run gets exactly one verdict.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌─────────────────────┐
//! │ sources  │───>│ segmentation │───>│ per-host analysis   │──> verdicts
//! │ (files)  │    │ (exclusions) │    │  histogram → filter │    + report
//! └──────────┘    └──────────────┘    │  presence → FFT     │
//!                                     │  presence → autocorr│
//!                                     └─────────────────────┘
//! ```
//!
//! - **sources**: JSONL/CSV readers, one blocking task per file
//! - **analysis**: inter-arrival histogram, Butterworth band-pass with
//!   salience normalization, and spectral + autocorrelation periodicity
//!   detection over the presence signal
//! - **report**: verdicts sorted by confidence, rendered as text, JSON,
//!   JSONL or CSV

pub mod analyzer;
pub mod autocorr;
pub mod baseline;
pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod filter;
pub mod intervals;
pub mod pipeline;
pub mod presence;
pub mod source;
pub mod spectrum;
pub mod summary;
pub mod synth;

pub use analyzer::{HostAnalyzer, HostVerdict, VerdictKind};
pub use config::Config;
pub use error::Result;
pub use event::HostEvent;
pub use pipeline::{Pipeline, RunReport};
