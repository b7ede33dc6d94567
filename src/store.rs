//! Key-value persistence for the cache and the API credential.
//!
//! The store only knows keys and JSON values. TTL policy lives in
//! [`crate::cache`].

use crate::error::{AffError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Default store file name in the home directory
const STORE_FILE_NAME: &str = ".arxiv_affiliations.json";

/// Default store path: `~/.arxiv_affiliations.json`
pub fn default_store_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(STORE_FILE_NAME))
        .ok_or_else(|| AffError::Config("Cannot determine home directory".to_string()))
}

/// Host-managed key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON object per file, rewritten on every write
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store at the default path
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(default_store_path()?))
    }

    /// Create a store at a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Get the store file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns an empty map if the file doesn't exist or is invalid JSON.
    /// A file that exists but cannot be read is an error.
    fn load(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            debug!("Store file not found: {:?}", self.path);
            return Ok(Map::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            AffError::Store(format!("Failed to read store {:?}: {}", self.path, e))
        })?;
        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!("Failed to parse store {:?}: {}", self.path, e);
                Ok(Map::new())
            }
        }
    }

    fn save(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, content)?;
        debug!(keys = map.len(), "Saved store to {:?}", self.path);
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AffError::Store("store lock poisoned".to_string()))?;
        let mut map = self.load()?;
        f(&mut map);
        self.save(&map)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|map| {
            if map.remove(key).is_some() {
                info!(key = key, "Removed key from store");
            }
        })
    }
}

/// In-process store, lost on exit
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| AffError::Store("store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| AffError::Store("store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| AffError::Store("store lock poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}
