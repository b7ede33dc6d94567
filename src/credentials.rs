//! API credential persistence.
//!
//! The key is stored next to the cache, under its own store key, and asked
//! for interactively the first time it is needed.

use crate::error::{AffError, Result};
use crate::store::KeyValueStore;
use serde_json::Value;
use std::io::{BufRead, Write};
use tracing::info;

/// Store key holding the API credential
pub const API_KEY_KEY: &str = "OPENAI_API_KEY";

/// Stored key, if any
pub fn load_api_key(store: &dyn KeyValueStore) -> Result<Option<String>> {
    Ok(store
        .get(API_KEY_KEY)?
        .and_then(|v| v.as_str().map(str::to_string))
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty()))
}

pub fn save_api_key(store: &dyn KeyValueStore, key: &str) -> Result<()> {
    store.set(API_KEY_KEY, Value::String(key.trim().to_string()))?;
    info!("API key saved");
    Ok(())
}

pub fn clear_api_key(store: &dyn KeyValueStore) -> Result<()> {
    store.remove(API_KEY_KEY)
}

/// Read a key from `input`, persist it, and return it.
///
/// An empty answer is a config error: the pipeline cannot run without a key.
pub fn prompt_api_key(
    store: &dyn KeyValueStore,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<String> {
    write!(output, "Please enter your OpenAI API key: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let key = line.trim();
    if key.is_empty() {
        return Err(AffError::Config("No OpenAI API key provided".to_string()));
    }

    save_api_key(store, key)?;
    Ok(key.to_string())
}

/// Explicit key → stored key → interactive prompt (persisted).
pub fn resolve_api_key(
    explicit: Option<&str>,
    store: &dyn KeyValueStore,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<String> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    if let Some(key) = load_api_key(store)? {
        return Ok(key);
    }
    prompt_api_key(store, input, output)
}
