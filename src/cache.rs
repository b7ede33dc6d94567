//! Persistent affiliation cache with lazy TTL expiry.
//!
//! The whole mapping lives under one store key and is rewritten on every
//! `put`. Expired entries stay in the mapping until the next miss for the
//! same identifier overwrites them.

use crate::arxiv::ArxivId;
use crate::error::Result;
use crate::store::KeyValueStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store key holding the cache mapping
pub const CACHE_KEY: &str = "arxivAffCache";

/// Entry lifetime: 365 days in milliseconds
pub const CACHE_TTL_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// Cached affiliations for one paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "affs")]
    pub affiliations: Vec<String>,
    /// Write time, epoch milliseconds
    #[serde(rename = "ts")]
    pub cached_at: i64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.cached_at) >= CACHE_TTL_MS
    }
}

/// Counts for `cache stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
}

/// Identifier → affiliations mapping backed by a [`KeyValueStore`]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
    entries: HashMap<ArxivId, CacheEntry>,
}

impl ResultCache {
    /// Load the mapping from the store.
    ///
    /// Entries that do not deserialize are logged and dropped one by one;
    /// a stored value that is not an object at all reads as empty.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let entries = match store.get(CACHE_KEY)? {
            Some(Value::Object(map)) => parse_entries(map),
            Some(other) => {
                warn!(kind = json_kind(&other), "Stored cache is not a mapping, starting empty");
                HashMap::new()
            }
            None => HashMap::new(),
        };
        info!(entries = entries.len(), "Cache loaded");
        Ok(Self { store, entries })
    }

    pub fn get(&self, id: &ArxivId) -> Option<&CacheEntry> {
        self.get_at(id, now_ms())
    }

    /// Lookup as of `now_ms`; expired entries read as absent.
    pub fn get_at(&self, id: &ArxivId, now_ms: i64) -> Option<&CacheEntry> {
        let entry = self.entries.get(id)?;
        if entry.is_expired_at(now_ms) {
            debug!(id = %id, cached_at = entry.cached_at, "Cache entry expired");
            return None;
        }
        Some(entry)
    }

    pub fn put(&mut self, id: &ArxivId, affiliations: Vec<String>) -> Result<()> {
        self.put_at(id, affiliations, now_ms())
    }

    /// Replace the entry for `id`, stamped with `now_ms`, and persist.
    pub fn put_at(&mut self, id: &ArxivId, affiliations: Vec<String>, now_ms: i64) -> Result<()> {
        self.entries.insert(
            id.clone(),
            CacheEntry {
                affiliations,
                cached_at: now_ms,
            },
        );
        self.persist()
    }

    /// Empty the whole mapping, in memory and in the store.
    pub fn clear(&mut self) -> Result<()> {
        let count = self.entries.len();
        self.entries.clear();
        self.persist()?;
        info!(removed = count, "Cache cleared");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let now = now_ms();
        CacheStats {
            entries: self.entries.len(),
            expired: self.entries.values().filter(|e| e.is_expired_at(now)).count(),
        }
    }

    fn persist(&self) -> Result<()> {
        let value = serde_json::to_value(&self.entries)?;
        self.store.set(CACHE_KEY, value)
    }
}

fn parse_entries(map: Map<String, Value>) -> HashMap<ArxivId, CacheEntry> {
    map.into_iter()
        .filter_map(|(key, value)| {
            let id = ArxivId::from_stored(key);
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => Some((id, entry)),
                Err(e) => {
                    warn!(id = %id, error = %e, "Dropping malformed cache entry");
                    None
                }
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
