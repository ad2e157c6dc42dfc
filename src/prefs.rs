//! Local preference store
//!
//! Persisted key/value settings for the non-core UI controls (last chosen
//! pipeline, target rate, layer toggles). Stored as a flat TOML table
//! under the platform config directory; writes go straight to disk so a
//! crash never loses more than the last set.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use parking_lot::Mutex;

use crate::error::PrefsError;

const PREFS_FILE: &str = "prefs.toml";

pub struct PreferenceStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl PreferenceStore {
    /// Open the store at the platform config location
    pub fn open_default() -> Result<Self, PrefsError> {
        let dirs = ProjectDirs::from("", "", "vision-stream-client")
            .ok_or(PrefsError::NoConfigDir)?;
        Self::open(dirs.config_dir().join(PREFS_FILE))
    }

    /// Open the store at an explicit path; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PrefsError> {
        let path = path.into();
        let values = if path.exists() {
            let text = fs::read_to_string(&path)
                .map_err(|e| PrefsError::ReadFailed(e.to_string()))?;
            toml::from_str(&text).map_err(|e| PrefsError::Malformed(e.to_string()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    /// Set one value and persist the whole table
    pub fn set(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        let snapshot = {
            let mut values = self.values.lock();
            values.insert(key.to_string(), value.to_string());
            values.clone()
        };
        self.persist(&snapshot)
    }

    /// Remove one value; absent keys are fine
    pub fn remove(&self, key: &str) -> Result<(), PrefsError> {
        let snapshot = {
            let mut values = self.values.lock();
            values.remove(key);
            values.clone()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| PrefsError::WriteFailed(e.to_string()))?;
        }
        let text =
            toml::to_string_pretty(values).map_err(|e| PrefsError::WriteFailed(e.to_string()))?;
        fs::write(&self.path, text).map_err(|e| PrefsError::WriteFailed(e.to_string()))
    }
}
