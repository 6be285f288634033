//! Persisted display settings.
//!
//! The record is tiny and has a single writer, so every save is a full
//! replacement. Loading never fails: a missing, unreadable or malformed
//! store simply means "no saved state".

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Persisted display selection.
///
/// `mode` and `effect` are stored as plain integers; whoever builds the
/// display intent from a record wraps them into range, so one bad value
/// does not cost the rest of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsRecord {
    pub mode: i64,
    pub effect: i64,
    pub am_pm_mode: bool,
}

/// Key-value store for the settings record.
pub trait SettingsStore {
    /// Load the saved record, or defaults when nothing usable is stored.
    fn load(&self) -> SettingsRecord;

    /// Replace the saved record.
    fn save(&mut self, record: &SettingsRecord) -> Result<(), SettingsError>;
}

/// Settings stored as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default path (`<data dir>/unicorn-clock/settings.json`).
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("unicorn-clock")
            .join("settings.json")
    }

    fn write_err(&self, source: std::io::Error) -> SettingsError {
        SettingsError::WriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> SettingsRecord {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No saved settings at {:?}, using defaults", self.path);
                return SettingsRecord::default();
            }
            Err(e) => {
                warn!("Failed to read settings {:?}: {}, using defaults", self.path, e);
                return SettingsRecord::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(record) => {
                info!("Settings restored from {:?}", self.path);
                record
            }
            Err(e) => {
                warn!("Malformed settings {:?}: {}, using defaults", self.path, e);
                SettingsRecord::default()
            }
        }
    }

    fn save(&mut self, record: &SettingsRecord) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.write_err(e))?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string(record)?;

        {
            let mut file = fs::File::create(&temp_path).map_err(|e| self.write_err(e))?;
            file.write_all(json.as_bytes()).map_err(|e| self.write_err(e))?;
            file.sync_all().map_err(|e| self.write_err(e))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| self.write_err(e))?;
        Ok(())
    }
}

/// In-memory store; clones share the same record and save log.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    saved: Arc<Mutex<Vec<SettingsRecord>>>,
    initial: Option<SettingsRecord>,
}

#[cfg(test)]
impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SettingsRecord) -> Self {
        Self {
            saved: Arc::default(),
            initial: Some(record),
        }
    }

    /// Every record saved so far, oldest first.
    pub fn saves(&self) -> Vec<SettingsRecord> {
        self.saved
            .lock()
            .map(|saved| saved.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> SettingsRecord {
        self.saves()
            .last()
            .copied()
            .or(self.initial)
            .unwrap_or_default()
    }

    fn save(&mut self, record: &SettingsRecord) -> Result<(), SettingsError> {
        if let Ok(mut saved) = self.saved.lock() {
            saved.push(*record);
        }
        Ok(())
    }
}
