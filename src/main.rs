//! CLI entry point for calo-positions
//!
//! Provides command-line interface for:
//! - Running the position assignment pipeline over an event file
//! - Checking a configuration and geometry without processing events
//! - Decoding a single cell identifier against a readout
//!
//! # Usage
//!
//! ```bash
//! calo-positions run --config config/pipeline.toml --max-events 10
//! calo-positions check --config config/pipeline.toml
//! calo-positions decode --geometry config/geometry.toml --readout ECalBarrelPhiEta 0x2205
//! ```

use anyhow::{Context, Result};
use calo_positions::app::PositionsApp;
use calo_positions::config::PipelineConfig;
use calo_positions::geometry::{DetectorGeometry, GeometryProvider};
use calo_positions::logging::{self, OutputFormat, TracingConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(name = "calo-positions")]
#[command(about = "Assigns detector-space positions to calorimeter cells", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured stage over the input events
    Run {
        /// Pipeline configuration file
        #[arg(long, default_value = "config/pipeline.toml")]
        config: PathBuf,

        /// Stop after this many events (overrides run.max_events)
        #[arg(long)]
        max_events: Option<u64>,

        /// Run the stages of each event concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Validate configuration and geometry, then list the stages
    Check {
        #[arg(long, default_value = "config/pipeline.toml")]
        config: PathBuf,
    },

    /// Decode one cell identifier with a readout's descriptor
    Decode {
        /// Detector description file
        #[arg(long, default_value = "config/geometry.toml")]
        geometry: PathBuf,

        /// Readout name
        #[arg(long)]
        readout: String,

        /// Cell identifier, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_cell_id)]
        cell_id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            max_events,
            parallel,
        } => run(config, max_events, parallel).await,
        Commands::Check { config } => check(config),
        Commands::Decode {
            geometry,
            readout,
            cell_id,
        } => decode(geometry, &readout, cell_id),
    }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config = PipelineConfig::load_from(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    logging::init_from_config(&config)?;
    Ok(config)
}

async fn run(path: PathBuf, max_events: Option<u64>, parallel: bool) -> Result<()> {
    let mut config = load_config(&path)?;
    if max_events.is_some() {
        config.run.max_events = max_events;
    }
    config.run.parallel_stages |= parallel;

    let app = PositionsApp::new(config)?;
    let summary = app.run().await?;

    println!("Processed {} event(s)", summary.events);
    for (stage, cells) in &summary.cells_per_stage {
        println!("  {:<28} {:>10} cells", stage, cells);
    }
    println!("Output written to {}", app.config().output.path.display());
    Ok(())
}

fn check(path: PathBuf) -> Result<()> {
    let config = load_config(&path)?;
    let app = PositionsApp::new(config)?;

    println!("Configuration OK: {}", path.display());
    for report in app.check() {
        println!("  {}", report);
    }
    Ok(())
}

fn decode(geometry_path: PathBuf, readout: &str, cell_id: u64) -> Result<()> {
    logging::init(TracingConfig::new(Level::WARN).with_format(OutputFormat::Compact))?;
    let geometry = DetectorGeometry::from_path(&geometry_path)?;
    let readout = geometry.readout(readout)?;

    println!("{:#x} ({})", cell_id, readout.name());
    println!("  {}", readout.decoder().describe(cell_id));
    Ok(())
}

fn parse_cell_id(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid cell id '{}': {}", s, e))
}
