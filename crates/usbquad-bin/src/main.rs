//! CLI entry point for usbquad
//!
//! Provides:
//! - `run`: reconstruct positions from the simulated counter bank and print
//!   them to stdout as JSON lines
//! - `check-config`: load and validate a reader configuration
//!
//! # Usage
//!
//! ```bash
//! usbquad run --duration 10 --seed 42 > positions.jsonl
//! usbquad check-config --config config/usbquad.toml --print
//! ```
//!
//! Logs go to stderr. `RUST_LOG` overrides the configured level.

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod logging;
mod output;
mod simulation;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::BufWriter;
use tokio::signal;
use tracing::{info, warn};

use usbquad_core::config::DEFAULT_CONFIG_PATH;
use usbquad_core::{LogFormat, ReaderConfig};
use usbquad_reader::{stop_channel, AcquisitionLoop, StopHandle};

use crate::logging::TracingConfig;
use crate::output::JsonLinesSink;

#[derive(Parser)]
#[command(name = "usbquad", version)]
#[command(about = "Quadrature encoder position reader", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct positions from the simulated counter bank
    Run {
        /// Reader configuration file (TOML)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Stop after this many seconds; runs until Ctrl-C otherwise
        #[arg(long)]
        duration: Option<f64>,

        /// Seed for the simulated counter noise
        #[arg(long)]
        seed: Option<u64>,

        /// Log format, overriding the configuration file
        #[arg(long, value_enum)]
        log_format: Option<LogFormatArg>,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Reader configuration file (TOML)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Print the effective configuration
        #[arg(long)]
        print: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            duration,
            seed,
            log_format,
        } => run(&config, duration, seed, log_format).await,
        Commands::CheckConfig { config, print } => check_config(&config, print),
    }
}

/// Load a configuration file with environment overrides and validate it.
fn load_config(path: &Path) -> Result<ReaderConfig> {
    let config = ReaderConfig::load_from(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn check_config(path: &Path, print: bool) -> Result<()> {
    let config = load_config(path)?;
    if print {
        print!("{}", config.to_toml_string()?);
    }
    eprintln!(
        "Configuration OK: {} Hz, {} samples per channel, {} channels",
        config.acquisition.sample_rate_hz, config.acquisition.samples_per_channel,
        config.layout.stride
    );
    Ok(())
}

fn stop_after(duration: Option<f64>) -> Result<Option<Duration>> {
    match duration {
        None => Ok(None),
        Some(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        Some(secs) => bail!("--duration must be a positive number of seconds, got {}", secs),
    }
}

/// Fire `stop` on Ctrl-C or once `limit` has elapsed.
async fn watch_for_stop(stop: StopHandle, limit: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    match limit {
        Some(limit) => tokio::select! {
            _ = ctrl_c => info!("Interrupted"),
            _ = tokio::time::sleep(limit) => info!(secs = limit.as_secs_f64(), "Run duration reached"),
        },
        None => {
            ctrl_c.await;
            info!("Interrupted");
        }
    }
    stop.stop();
}

async fn run(
    path: &Path,
    duration: Option<f64>,
    seed: Option<u64>,
    log_format: Option<LogFormatArg>,
) -> Result<()> {
    let config = load_config(path)?;
    let mut tracing_config = TracingConfig::from_logging_config(&config.logging)?;
    if let Some(format) = log_format {
        tracing_config = tracing_config.with_format(format.into());
    }
    logging::init(tracing_config)?;

    let limit = stop_after(duration)?;
    let bank = Arc::new(simulation::counter_bank(&config, seed)?);
    let sink = JsonLinesSink::new(BufWriter::new(tokio::io::stdout()));
    let (stop, signal) = stop_channel();

    let acquisition = AcquisitionLoop::builder(bank, sink)
        .config(config)
        .stop_signal(signal)
        .build()?;

    let watcher = tokio::spawn(watch_for_stop(stop, limit));
    let result = acquisition.run().await;
    watcher.abort();

    let summary = result?;
    eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
