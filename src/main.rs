//! CLI entry point for dual_sonar
//!
//! Runs the ranging engine against simulated sensors and exposes the control
//! surface on stdin.
//!
//! # Usage
//!
//! Sample every 2 seconds for half a minute:
//! ```bash
//! dual_sonar run --rate 2 --duration 30
//! ```
//!
//! While running, each stdin line is written to the control surface (`0` to `50`),
//! `?` prints the readout and `stats` prints the engine counters.
//!
//! Validate a configuration file:
//! ```bash
//! dual_sonar check-config --config config/dual_sonar.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use dual_sonar::config::SonarConfig;
use dual_sonar::control::{RateControl, ReadoutSurface};
use dual_sonar::hardware::simulated::SimulatedSensors;
use dual_sonar::hardware::MonotonicClock;
use dual_sonar::logging;
use dual_sonar::ranging::RangingEngine;

#[derive(Parser)]
#[command(name = "dual_sonar")]
#[command(about = "Dual-channel ultrasonic ranging engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against simulated sensors
    Run {
        /// Configuration file (defaults to config/dual_sonar.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Initial sampling period in seconds (0 disables sampling)
        #[arg(long)]
        rate: Option<String>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Load and validate a configuration file, then print the effective values
    CheckConfig {
        /// Configuration file (defaults to config/dual_sonar.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            rate,
            duration,
        } => run(config, rate, duration).await,
        Commands::CheckConfig { config } => check_config(config),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<SonarConfig> {
    let config = match path {
        Some(path) => SonarConfig::load_from(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SonarConfig::load()?,
    };
    Ok(config)
}

fn check_config(path: Option<PathBuf>) -> Result<()> {
    let config = load_config(path)?;
    let rendered = toml::to_string_pretty(&config).context("rendering configuration")?;
    println!("Configuration OK\n\n{}", rendered);
    Ok(())
}

async fn run(path: Option<PathBuf>, rate: Option<String>, duration: Option<u64>) -> Result<()> {
    let config = load_config(path)?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let mut engine = RangingEngine::new(&config)?;
    let sensors = SimulatedSensors::new(
        config.pins.echo,
        config.simulation.targets(),
        config.simulation.jitter_us,
    );
    engine.start(Arc::new(sensors), Arc::new(MonotonicClock::new()))?;

    if let Some(rate) = rate {
        if let Err(e) = RateControl::new(&engine).write(&rate) {
            engine.stop().await?;
            return Err(e.into());
        }
    }

    let result = control_loop(&engine, duration).await;

    engine.stop().await?;
    let stats = toml::to_string(&engine.stats()).context("rendering statistics")?;
    println!("{}", stats);
    result
}

async fn control_loop(engine: &RangingEngine, duration: Option<u64>) -> Result<()> {
    let control = RateControl::new(engine);
    let readout = ReadoutSurface::new(engine);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match line.trim() {
                    "" => {}
                    "?" => print!("{}", readout.read()),
                    "stats" => print!("{}", toml::to_string(&engine.stats())?),
                    input => match control.write(input) {
                        Ok(period) => info!(period, "Sampling period updated"),
                        Err(e) => warn!(error = %e, "Rate rejected"),
                    },
                },
                None => {
                    stdin_open = false;
                    if duration.is_none() {
                        break;
                    }
                }
            },
            _ = &mut deadline => {
                info!("Run duration elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result.context("listening for Ctrl-C")?;
                info!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}
