//! Persisted 0 VU reference levels, one per device type, as a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vu_capture_core::models::config::{DEFAULT_MICROPHONE_REFERENCE_DBFS, DEFAULT_MONITOR_REFERENCE_DBFS};
use vu_capture_core::{CaptureOptions, DeviceKind};

const FILE_NAME: &str = "references.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("failed to serialize references: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredReferences {
    pub microphone_dbfs: f32,
    pub monitor_dbfs: f32,
}

impl Default for StoredReferences {
    fn default() -> Self {
        Self {
            microphone_dbfs: DEFAULT_MICROPHONE_REFERENCE_DBFS,
            monitor_dbfs: DEFAULT_MONITOR_REFERENCE_DBFS,
        }
    }
}

impl StoredReferences {
    pub fn set(&mut self, kind: DeviceKind, dbfs: f32) {
        match kind {
            DeviceKind::Microphone => self.microphone_dbfs = dbfs,
            DeviceKind::SystemOutput => self.monitor_dbfs = dbfs,
        }
    }

    pub fn apply_to(&self, options: &mut CaptureOptions) {
        options.microphone_reference_dbfs = self.microphone_dbfs;
        options.monitor_reference_dbfs = self.monitor_dbfs;
    }
}

/// `$XDG_CONFIG_HOME/vu-meter/references.json`, falling back to `~/.config`.
pub fn default_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("vu-meter").join(FILE_NAME))
}

/// Loads stored references. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<StoredReferences, StoreError> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoredReferences::default()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&json).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save(references: &StoredReferences, path: &Path) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(references)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| StoreError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, json).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}
