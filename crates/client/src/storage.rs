//! Persistent key/value storage for session state.
//!
//! Values are stored as strings under fixed keys so a session survives
//! restarts:
//! - [`FileStorage`]: one file per key in the platform config directory:
//!   - Linux: `~/.config/cribzconnect/`
//!   - macOS: `~/Library/Application Support/cribzconnect/`
//!   - Windows: `%APPDATA%\cribzconnect\`
//! - [`MemoryStorage`]: process-local, for tests and ephemeral sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{de::DeserializeOwned, Serialize};

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Returns `true` if the value was written.
    fn set(&self, key: &str, value: &str) -> bool;

    fn remove(&self, key: &str);

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Save a value as JSON.
///
/// Returns `true` if the operation succeeded.
pub fn save_json<T: Serialize>(storage: &dyn Storage, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => storage.set(key, &json),
        Err(_) => false,
    }
}

/// Load a JSON value.
///
/// Returns `None` if the key doesn't exist or deserialization fails.
pub fn load_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let json = storage.get(key)?;
    serde_json::from_str(&json).ok()
}

// =========================================
// File-backed storage
// =========================================

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    /// Storage in the platform config directory.
    pub fn in_config_dir() -> std::io::Result<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no platform config directory",
            )
        })?;
        Self::new(config_dir.join("cribzconnect"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        match std::fs::write(self.file_path(key), value) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to persist '{}': {}", key, e);
                false
            }
        }
    }

    fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }
}

// =========================================
// In-memory storage
// =========================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        true
    }

    fn remove(&self, key: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
