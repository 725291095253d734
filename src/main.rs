//! beaconsift command-line interface.
//!
//! Four commands: `analyze` runs the beacon-detection pipeline over log
//! files, `summarize` produces traffic-volume tables from the same
//! inputs, `synth` generates artificial beacon logs for testing, and
//! `init-config` writes a default configuration file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use beaconsift::config::Config;
use beaconsift::export::{self, OutputFormat};
use beaconsift::pipeline::{self, Pipeline};
use beaconsift::source;
use beaconsift::summary;
use beaconsift::synth::{self, SynthConfig};

/// beaconsift: C2 beacon detection from connection logs.
#[derive(Parser, Debug)]
#[command(name = "beaconsift")]
#[command(version = "0.1.0")]
#[command(about = "Detect C2 beaconing in connection logs via interval and spectral analysis")]
#[command(long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze connection logs for periodic beaconing.
    Analyze {
        /// Log file or directory of log files (.jsonl, .json, .csv).
        input: PathBuf,

        /// Output format: text, json, jsonl, csv.
        #[arg(short, long)]
        output: Option<OutputFormat>,

        /// Write the report here instead of stdout.
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,

        /// Also write the per-host salience curves as CSV to this path.
        #[arg(long)]
        salience: Option<PathBuf>,

        /// Exclude hosts containing this substring (repeatable).
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,

        /// Analyze events that carried no hostname.
        #[arg(long)]
        include_unknown: bool,

        /// Enable verbose logging.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Summarize traffic volume per host, hour and file.
    Summarize {
        /// Log file or directory of log files (.jsonl, .json, .csv).
        input: PathBuf,

        /// Output format: text, json, jsonl, csv.
        #[arg(short, long)]
        output: Option<OutputFormat>,

        /// Write the summary here instead of stdout.
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,

        /// Only report hosts with strictly more events than this.
        #[arg(long)]
        min_requests: Option<u64>,

        /// Only report (host, hour) buckets with at least this many visits.
        #[arg(long)]
        min_hourly_visits: Option<u64>,

        /// Enable verbose logging.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate a synthetic beaconing log.
    Synth {
        /// Output JSONL path.
        output: PathBuf,

        /// Beacon hostname.
        #[arg(long, default_value = "beacon1.example")]
        host: String,

        /// Number of beacon events.
        #[arg(short = 'n', long, default_value = "12000")]
        events: usize,

        /// Base beacon period in seconds.
        #[arg(short, long, default_value = "2")]
        period: i64,

        /// Uniform jitter in +/- seconds.
        #[arg(short, long, default_value = "1")]
        jitter: i64,

        /// First timestamp (RFC 3339); defaults to the epoch.
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Number of irregular background hosts to mix in.
        #[arg(long, default_value = "0")]
        organic_hosts: usize,

        /// Events per background host.
        #[arg(long, default_value = "500")]
        organic_events: usize,

        /// Enable verbose logging.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Write a default configuration file.
    InitConfig {
        /// Destination path.
        #[arg(default_value = "beaconsift.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // an explicitly-passed config that fails to load is fatal; no config
    // file means defaults
    let base_config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Analyze {
            input,
            output,
            file,
            salience,
            exclude,
            include_unknown,
            verbose,
        } => {
            let mut config = base_config;
            if let Some(format) = output {
                config.output.format = format;
            }
            if let Some(path) = file {
                config.output.file = Some(path.display().to_string());
            }
            config.exclusions.patterns.extend(exclude);
            if include_unknown {
                config.exclusions.include_unknown = true;
            }
            if verbose {
                config.output.verbose = true;
            }

            init_logging(config.output.verbose)?;
            config.validate()?;
            run_analyze(config, &input, salience.as_deref()).await
        }

        Commands::Summarize {
            input,
            output,
            file,
            min_requests,
            min_hourly_visits,
            verbose,
        } => {
            let mut config = base_config;
            if let Some(format) = output {
                config.output.format = format;
            }
            if let Some(path) = file {
                config.output.file = Some(path.display().to_string());
            }
            if let Some(floor) = min_requests {
                config.summary.request_count_floor = floor;
            }
            if let Some(floor) = min_hourly_visits {
                config.summary.hourly_visit_floor = floor;
            }
            if verbose {
                config.output.verbose = true;
            }

            init_logging(config.output.verbose)?;
            config.validate()?;
            run_summarize(config, &input).await
        }

        Commands::Synth {
            output,
            host,
            events,
            period,
            jitter,
            start,
            organic_hosts,
            organic_events,
            verbose,
        } => {
            init_logging(verbose)?;
            let config = SynthConfig {
                host,
                events,
                period_secs: period,
                jitter_secs: jitter,
                start: start.unwrap_or(DateTime::UNIX_EPOCH),
                organic_hosts,
                organic_events,
                ..SynthConfig::default()
            };
            let events = synth::generate_events(&config, &mut rand::thread_rng());
            synth::write_jsonl(&events, &output)
        }

        Commands::InitConfig { path } => {
            std::fs::write(&path, Config::generate_default())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the verbose flag picks debug over
/// info.
fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

async fn run_analyze(config: Config, input: &Path, salience: Option<&Path>) -> Result<()> {
    let format = config.output.format;
    let out_path = config.output.file.clone().map(PathBuf::from);

    let pipeline = Pipeline::new(config);
    let report = pipeline.run(input).await?;

    let rendered = export::render_report(&report, format)?;
    export::write_output(&rendered, out_path.as_deref())?;

    if let Some(path) = salience {
        let csv = export::render_salience_csv(&report.verdicts)?;
        export::write_output(&csv, Some(path))?;
    }
    Ok(())
}

async fn run_summarize(config: Config, input: &Path) -> Result<()> {
    let files = source::collect_input_files(input)?;
    let batches = pipeline::ingest_files(&files).await?;
    let report = summary::build_summary(&batches, &config.exclusions, &config.summary);

    let rendered = export::render_summary(&report, config.output.format)?;
    let out_path = config.output.file.as_deref().map(Path::new);
    export::write_output(&rendered, out_path)
}
