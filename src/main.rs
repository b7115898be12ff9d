//! Command line entry point for PulseKit
//!
//! ```bash
//! pulsekit replay signals.jsonl --config pulsekit.toml --drain-to events.jsonl
//! pulsekit check-config pulsekit.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulsekit::replay::{read_frames, Acquisition, FrameReport};
use pulsekit::{
    init_logging, CncDataQueueOutput, Config, JsonLinesSink, MtConnectModule, QueueDrain,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pulsekit", version = pulsekit::VERSION)]
#[command(about = "CNC acquisition output and MTConnect adapter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded acquisition frames through the output module
    Replay {
        /// JSON-lines file of frames
        signals: PathBuf,

        /// Configuration file (JSON or TOML); defaults to the per-user config.toml
        #[arg(long)]
        config: Option<PathBuf>,

        /// Log one JSON object per line
        #[arg(long)]
        json_logs: bool,

        /// Move the queued records to this JSON-lines file afterwards
        #[arg(long)]
        drain_to: Option<PathBuf>,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Configuration file (JSON or TOML)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            signals,
            config,
            json_logs,
            drain_to,
        } => replay(&signals, config.as_deref(), json_logs, drain_to).await,
        Commands::CheckConfig { file } => check_config(&file),
    }
}

/// Load `path`, or the per-user configuration file when none is given
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => match Config::default_path() {
            Ok(path) => Config::load_or_default(&path)
                .with_context(|| format!("loading configuration {}", path.display())),
            // No configuration directory on this platform
            Err(_) => Ok(Config::default()),
        },
    }
}

async fn replay(
    signals: &Path,
    config_path: Option<&Path>,
    json_logs: bool,
    drain_to: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(json_logs || config.logging.json, &config.logging.filter)?;
    tracing::info!(
        "PulseKit {} (built {}), acquisition {}",
        pulsekit::VERSION,
        pulsekit::BUILD_DATE,
        config.machine.acquisition_name
    );

    let queue = config.build_queue()?;
    let output = CncDataQueueOutput::new(
        config.output_options()?,
        queue.clone(),
        config.build_tracker(),
    );
    let mut acquisition = Acquisition::new(output);
    if let Some(adapter) = config.build_adapter() {
        tracing::info!("Publishing SHDR on {}:{}", config.mtconnect.host, adapter.port());
        let module = MtConnectModule::new(config.machine.machine_module_id, adapter)
            .with_acquisition_name(config.machine.acquisition_name.clone());
        acquisition = acquisition.with_module(Box::new(module));
    }

    let frames = read_frames(signals)?;
    tracing::info!("Replaying {} frames from {}", frames.len(), signals.display());

    let mut totals = FrameReport::default();
    for frame in &frames {
        let report = acquisition
            .apply(frame)
            .with_context(|| format!("acquisition cycle at {}", frame.at))?;
        totals.applied += report.applied;
        totals.unknown += report.unknown;
        totals.failed += report.failed;
    }
    acquisition.flush()?;

    println!("Frames:         {}", frames.len());
    println!("Keys applied:   {}", totals.applied);
    println!("Keys unknown:   {}", totals.unknown);
    println!("Keys rejected:  {}", totals.failed);
    for (command, count) in acquisition.counts().snapshot() {
        println!("  {:<18} {}", command.to_string(), count);
    }
    println!("Queued records: {}", queue.lock().len()?);

    if let Some(path) = drain_to {
        let drain = QueueDrain::new(queue.clone(), JsonLinesSink::new(&path));
        let moved = drain.drain_all().await?;
        println!("Drained {} records to {}", moved, path.display());
    }

    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    let options = config.output_options()?;
    println!("Configuration {} is valid", path.display());
    println!(
        "  machine {} module {}, detection {:?}",
        options.machine_id, options.machine_module_id, options.detection
    );
    println!(
        "  queue {}, flicker window {:?}, mode refresh {:?}",
        config.queue.kind, options.flicker_window, options.mode_refresh
    );
    if config.mtconnect.enabled {
        println!("  SHDR on {}:{}", config.mtconnect.host, config.mtconnect.port);
    }
    Ok(())
}
