//! Variable change tracking
//!
//! Remembers the last value seen for each variable so the output module
//! only queues real changes. With a directory, each variable's last value is
//! also written to its own file, so a restarted acquisition does not re-emit
//! stamps or cycle edges it already reported.

use pulsekit_core::CncValue;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Outcome of comparing a value with the tracked one
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Nothing was known about the variable
    First,
    /// The variable had a different value
    Changed {
        /// The value known before
        previous: CncValue,
    },
    /// The variable already had this value
    Unchanged,
}

impl Change {
    /// `First` or `Changed`
    pub fn is_changed(&self) -> bool {
        !matches!(self, Change::Unchanged)
    }

    /// The previous value, if one was known and differs
    pub fn previous(&self) -> Option<&CncValue> {
        match self {
            Change::Changed { previous } => Some(previous),
            _ => None,
        }
    }
}

/// Per-variable last-value cache
#[derive(Debug, Default)]
pub struct VariableChangeTracker {
    values: HashMap<String, CncValue>,
    directory: Option<PathBuf>,
}

impl VariableChangeTracker {
    /// Tracker that forgets everything when dropped
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Tracker falling back to one file per variable under `directory`
    ///
    /// The directory is created lazily on the first write.
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            values: HashMap::new(),
            directory: Some(directory.into()),
        }
    }

    /// Directory used for the on-disk fallback
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Compare `value` with the tracked value and record it when it differs
    pub fn check(&mut self, key: &str, value: &CncValue) -> Change {
        let change = self.compare(key, value);
        if change.is_changed() {
            self.record(key, value.clone());
        }
        change
    }

    /// Compare `value` with the tracked value without recording it
    ///
    /// A value found on disk is loaded into memory.
    pub fn compare(&mut self, key: &str, value: &CncValue) -> Change {
        let previous = match self.values.get(key) {
            Some(known) => Some(known.clone()),
            None => {
                let loaded = self.load(key);
                if let Some(loaded) = &loaded {
                    self.values.insert(key.to_string(), loaded.clone());
                }
                loaded
            }
        };
        match previous {
            None => Change::First,
            Some(previous) if previous.same_as(value) => Change::Unchanged,
            Some(previous) => Change::Changed { previous },
        }
    }

    /// Record `value` as the tracked value of `key`
    pub fn record(&mut self, key: &str, value: CncValue) {
        self.store(key, &value);
        self.values.insert(key.to_string(), value);
    }

    /// Value currently held in memory for `key`
    pub fn peek(&self, key: &str) -> Option<&CncValue> {
        self.values.get(key)
    }

    /// Forget `key`, in memory and on disk
    pub fn forget(&mut self, key: &str) {
        self.values.remove(key);
        if let Some(path) = self.file_path(key) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Failed to remove tracker file {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Forget every variable, in memory and on disk
    pub fn reset(&mut self) {
        let keys: Vec<String> = self.values.keys().cloned().collect();
        for key in keys {
            self.forget(&key);
        }
        if let Some(directory) = &self.directory {
            let entries = match fs::read_dir(directory) {
                Ok(entries) => entries,
                Err(_) => return,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    if let Err(e) = fs::remove_file(&path) {
                        tracing::warn!("Failed to remove tracker file {}: {}", path.display(), e);
                    }
                }
            }
        }
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        self.directory
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", sanitize_key(key))))
    }

    fn load(&self, key: &str) -> Option<CncValue> {
        let path = self.file_path(key)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read tracker file {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => {
                tracing::trace!("Loaded {} from {}", key, path.display());
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Ignoring corrupted tracker file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn store(&self, key: &str, value: &CncValue) {
        let Some(path) = self.file_path(key) else {
            return;
        };
        if let Err(e) = write_atomically(&path, value) {
            tracing::warn!(
                "Failed to persist {} to {}, keeping it in memory only: {}",
                key,
                path.display(),
                e
            );
        }
    }
}

fn write_atomically(path: &Path, value: &CncValue) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}

/// Map a variable key to a file stem
///
/// Characters outside `[A-Za-z0-9._-]` become `_`.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
