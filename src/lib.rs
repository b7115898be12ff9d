//! # PulseKit
//!
//! CNC data acquisition core:
//! - A change-tracking output module that turns per-cycle controller
//!   signals into exchange-data events (machine modes, cycles, stamps,
//!   variables, field values and alarms) on a persistent queue
//! - An MTConnect SHDR adapter publishing live machine state to agents
//!
//! ## Architecture
//!
//! PulseKit is organized as a workspace with multiple crates:
//!
//! 1. **pulsekit-core** - Values, exchange data, errors and the module surface
//! 2. **pulsekit-queue** - Output module, change tracker, queues and the drain
//! 3. **pulsekit-mtconnect** - SHDR data items, server and adapter module
//! 4. **pulsekit-settings** - Configuration loading and component building
//! 5. **pulsekit** - Signal replay and the command line tool

pub mod replay;

pub use pulsekit_core::{
    CncAlarm, CncModule, CncValue, Error, ExchangeData, ExchangeDataCommand, ModuleError,
    QueueError, Result,
};

pub use pulsekit_queue::{
    CncDataQueue, CncDataQueueOutput, DetectionMethod, ExchangeDataSink, FileCncDataQueue,
    JsonLinesSink, MemoryCncDataQueue, OutputOptions, QueueDrain, SharedCncDataQueue,
    VariableChangeTracker,
};

pub use pulsekit_mtconnect::{Adapter, MtConnectModule};

pub use pulsekit_settings::{Config, QueueKind, SettingsError};

pub use replay::{read_frames, Acquisition, FrameReport, SignalFrame};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging with:
/// - `RUST_LOG` support, falling back to `default_filter`
/// - Pretty console output, or one JSON object per line when `json` is set
///
/// Logs go to stderr so command output stays clean on stdout.
pub fn init_logging(json: bool, default_filter: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
