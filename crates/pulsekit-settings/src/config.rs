//! Configuration and settings management for PulseKit
//!
//! Provides configuration file handling and validation, and turns the
//! settings into the components an acquisition needs.
//! Supports JSON and TOML file formats.
//!
//! Configuration is organized into logical sections:
//! - Machine identity (machine id, machine module id)
//! - Cycle detection methods
//! - Output module tuning (flicker window, refresh, backpressure, trackers)
//! - Exchange-data queue backend
//! - MTConnect adapter
//! - Logging

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
use pulsekit_mtconnect::{Adapter, DEFAULT_PORT};
use pulsekit_queue::{
    shared_queue, DetectionMethod, FileCncDataQueue, MemoryCncDataQueue, OutputOptions,
    SharedCncDataQueue, VariableChangeTracker,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Machine identity settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Machine the acquired data belongs to
    pub machine_id: u32,
    /// Machine module read by this acquisition
    pub machine_module_id: u32,
    /// Human readable acquisition name, used in logs
    pub acquisition_name: String,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            machine_id: 1,
            machine_module_id: 1,
            acquisition_name: "default".to_string(),
        }
    }
}

/// Cycle detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Enabled detection methods, by name
    pub methods: Vec<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            methods: vec![
                "cycle_start_signal".to_string(),
                "cycle_stop_signal".to_string(),
                "stamp".to_string(),
            ],
        }
    }
}

impl DetectionSettings {
    /// Enabled methods as a mask
    pub fn mask(&self) -> SettingsResult<DetectionMethod> {
        DetectionMethod::from_names(self.methods.as_slice()).map_err(|e| {
            SettingsError::InvalidSetting {
                key: "detection.methods".to_string(),
                reason: e.to_string(),
            }
        })
    }
}

/// Output module settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// How long a machine mode must last before it is committed (0 disables)
    pub flicker_window_ms: u64,
    /// Re-emit an unchanged machine mode after this many seconds (0 disables)
    pub mode_refresh_secs: u64,
    /// Queue length at which field values are shed (0 disables)
    pub max_queue_size: usize,
    /// Pause buffer length forcing an early release
    pub max_pause_buffer: usize,
    /// Keep tracked values on disk across restarts
    pub persist_trackers: bool,
    /// Tracker directory; defaults to the local data directory
    pub tracker_directory: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            flicker_window_ms: 5_000,
            mode_refresh_secs: 60,
            max_queue_size: 100_000,
            max_pause_buffer: 256,
            persist_trackers: true,
            tracker_directory: None,
        }
    }
}

/// Queue backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Volatile in-memory queue
    #[default]
    Memory,
    /// JSON-lines file queue
    File,
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Exchange-data queue settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Backend
    pub kind: QueueKind,
    /// Queue file, required by the file backend
    pub path: Option<PathBuf>,
    /// Hard capacity; enqueue fails beyond it
    pub capacity: Option<usize>,
}

/// MTConnect adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MtConnectSettings {
    /// Publish data over SHDR
    pub enabled: bool,
    /// Address to listen on
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Heartbeat announced to agents, in milliseconds
    pub heartbeat_ms: u64,
}

impl Default for MtConnectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            heartbeat_ms: 10_000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Emit JSON log lines
    pub json: bool,
    /// Default filter directive when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info".to_string(),
        }
    }
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format matching the file extension
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            Some(other) => Err(ConfigError::UnsupportedFormat(other.to_string())),
            None => Err(ConfigError::UnsupportedFormat(
                "missing file extension".to_string(),
            )),
        }
    }
}

/// Complete acquisition configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Machine identity
    pub machine: MachineSettings,
    /// Cycle detection
    pub detection: DetectionSettings,
    /// Output module tuning
    pub output: OutputSettings,
    /// Queue backend
    pub queue: QueueSettings,
    /// MTConnect adapter
    pub mtconnect: MtConnectSettings,
    /// Logging
    pub logging: LoggingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the configuration file
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("pulsekit").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = match format {
            ConfigFormat::Json => serde_json::from_str(&content)?,
            ConfigFormat::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use the defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content).map_err(|e| SettingsError::SaveError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.machine.machine_id == 0 {
            return Err(invalid("machine.machine_id", "must be > 0"));
        }

        self.detection.mask()?;

        if self.output.max_pause_buffer == 0 {
            return Err(invalid("output.max_pause_buffer", "must be > 0"));
        }

        if self.queue.kind == QueueKind::File && self.queue.path.is_none() {
            return Err(ConfigError::MissingKey("queue.path".to_string()).into());
        }

        if self.queue.capacity == Some(0) {
            return Err(ConfigError::ValueOutOfRange {
                key: "queue.capacity".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if self.mtconnect.port == 0 {
            return Err(invalid("mtconnect.port", "must be > 0"));
        }

        if self.mtconnect.heartbeat_ms == 0 {
            return Err(invalid("mtconnect.heartbeat_ms", "must be > 0"));
        }

        Ok(())
    }

    /// Options of the output module
    pub fn output_options(&self) -> SettingsResult<OutputOptions> {
        Ok(OutputOptions {
            machine_id: self.machine.machine_id,
            machine_module_id: self.machine.machine_module_id,
            detection: self.detection.mask()?,
            flicker_window: Duration::from_millis(self.output.flicker_window_ms),
            mode_refresh: Duration::from_secs(self.output.mode_refresh_secs),
            max_queue_size: self.output.max_queue_size,
            max_pause_buffer: self.output.max_pause_buffer,
        })
    }

    /// Open the configured queue
    pub fn build_queue(&self) -> SettingsResult<SharedCncDataQueue> {
        match self.queue.kind {
            QueueKind::Memory => {
                let queue = match self.queue.capacity {
                    Some(capacity) => MemoryCncDataQueue::with_capacity(capacity),
                    None => MemoryCncDataQueue::new(),
                };
                Ok(shared_queue(queue))
            }
            QueueKind::File => {
                let path = self
                    .queue
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingKey("queue.path".to_string()))?;
                let mut queue = FileCncDataQueue::open(path)?;
                if let Some(capacity) = self.queue.capacity {
                    queue = queue.with_capacity(capacity);
                }
                Ok(shared_queue(queue))
            }
        }
    }

    /// Directory holding this acquisition's tracked values
    ///
    /// Each machine module gets its own subdirectory.
    pub fn tracker_directory(&self) -> PathBuf {
        let base = self.output.tracker_directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join("pulsekit").join("trackers"))
                .unwrap_or_else(|| PathBuf::from("trackers"))
        });
        base.join(format!(
            "{}-{}",
            self.machine.machine_id, self.machine.machine_module_id
        ))
    }

    /// Change tracker of the output module
    pub fn build_tracker(&self) -> VariableChangeTracker {
        if self.output.persist_trackers {
            VariableChangeTracker::with_directory(self.tracker_directory())
        } else {
            VariableChangeTracker::in_memory()
        }
    }

    /// SHDR adapter, if enabled
    pub fn build_adapter(&self) -> Option<Adapter> {
        self.mtconnect.enabled.then(|| {
            Adapter::new()
                .with_host(self.mtconnect.host.clone())
                .with_port(self.mtconnect.port)
                .with_heartbeat(Duration::from_millis(self.mtconnect.heartbeat_ms))
        })
    }
}

fn invalid(key: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
