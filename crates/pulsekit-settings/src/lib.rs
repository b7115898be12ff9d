//! PulseKit Settings Crate
//!
//! Loads and validates acquisition configuration and builds the output
//! module's queue, tracker and options, plus the optional SHDR adapter.

pub mod config;
pub mod error;

pub use config::{
    Config, ConfigFormat, DetectionSettings, LoggingSettings, MachineSettings, MtConnectSettings,
    OutputSettings, QueueKind, QueueSettings,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
