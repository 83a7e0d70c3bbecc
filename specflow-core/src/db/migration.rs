//! Migration utilities for moving tables between backends
//!
//! Also provides import/export of a pretty-printed JSON snapshot, which is
//! handy for backups and for inspecting state by hand.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use super::traits::KeyValueBackend;
use super::TABLE_KEYS;

/// Copies the persisted tables from one backend to another
///
/// # Returns
/// The number of tables copied
pub fn copy_tables(source: &dyn KeyValueBackend, destination: &dyn KeyValueBackend) -> Result<usize> {
    let mut entries = Vec::new();
    for key in TABLE_KEYS {
        if let Some(value) = source
            .get(key)
            .with_context(|| format!("Failed to read {} from {} backend", key, source.backend_type()))?
        {
            entries.push((key, value));
        }
    }

    destination
        .set_many(&entries)
        .with_context(|| format!("Failed to write to {} backend", destination.backend_type()))?;

    Ok(entries.len())
}

/// Exports the persisted tables to a JSON file
///
/// Values are embedded as JSON rather than as escaped strings.
pub fn export_to_json<P: AsRef<Path>>(source: &dyn KeyValueBackend, json_path: P) -> Result<usize> {
    let mut document = Map::new();
    for key in TABLE_KEYS {
        if let Some(raw) = source.get(key)? {
            let value: Value = serde_json::from_str(&raw)
                .with_context(|| format!("Stored value for {} is not valid JSON", key))?;
            document.insert(key.to_string(), value);
        }
    }

    let count = document.len();
    let json = serde_json::to_string_pretty(&Value::Object(document))
        .context("Failed to serialize export")?;
    fs::write(&json_path, json)
        .with_context(|| format!("Failed to write export to {:?}", json_path.as_ref()))?;

    Ok(count)
}

/// Imports tables from a JSON file written by [`export_to_json`]
///
/// Unknown keys in the file are ignored.
pub fn import_from_json<P: AsRef<Path>>(destination: &dyn KeyValueBackend, json_path: P) -> Result<usize> {
    let content = fs::read_to_string(&json_path)
        .with_context(|| format!("Failed to read import file {:?}", json_path.as_ref()))?;
    let document: Map<String, Value> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse import file {:?}", json_path.as_ref()))?;

    let mut entries = Vec::new();
    for key in TABLE_KEYS {
        if let Some(value) = document.get(key) {
            entries.push((key, serde_json::to_string(value)?));
        }
    }

    destination.set_many(&entries)?;
    Ok(entries.len())
}
