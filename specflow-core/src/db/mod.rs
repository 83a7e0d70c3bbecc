//! Persistence layer for SpecFlow
//!
//! This module provides a trait-based abstraction over key/value storage,
//! so stores can run against a JSON file, SQLite or an in-memory map while
//! keeping the same table layout.

mod json_backend;
mod memory_backend;
mod migration;
mod sqlite_backend;
mod traits;

pub use json_backend::JsonFileBackend;
pub use memory_backend::MemoryBackend;
pub use migration::{copy_tables, export_to_json, import_from_json};
pub use sqlite_backend::SqliteBackend;
pub use traits::{BackendType, KeyValueBackend};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Ordered sequence of requirements
pub const REQUIREMENTS_KEY: &str = "specflow_requirements";
/// Next requirement id
pub const NEXT_ID_KEY: &str = "specflow_next_id";
/// Map of requirement id to ordered versions
pub const VERSION_HISTORY_KEY: &str = "specflow_version_history";
/// Next version id
pub const NEXT_VERSION_ID_KEY: &str = "specflow_next_version_id";

/// Every table a store persists
pub const TABLE_KEYS: [&str; 4] = [
    REQUIREMENTS_KEY,
    NEXT_ID_KEY,
    VERSION_HISTORY_KEY,
    NEXT_VERSION_ID_KEY,
];

/// Path value that selects the in-memory backend
pub const MEMORY_PATH: &str = ":memory:";

/// Creates a backend based on the file extension or explicit type
pub fn create_backend(path: &Path, backend_type: Option<BackendType>) -> Result<Arc<dyn KeyValueBackend>> {
    let bt = backend_type.unwrap_or_else(|| {
        if path.as_os_str() == MEMORY_PATH {
            return BackendType::Memory;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("db") | Some("sqlite") | Some("sqlite3") => BackendType::Sqlite,
            _ => BackendType::Json, // Default to JSON
        }
    });

    match bt {
        BackendType::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendType::Json => Ok(Arc::new(JsonFileBackend::new(path))),
        BackendType::Sqlite => Ok(Arc::new(SqliteBackend::new(path)?)),
    }
}

/// Reads and decodes a JSON value stored under `key`
pub fn read_json<T: DeserializeOwned>(backend: &dyn KeyValueBackend, key: &str) -> Result<Option<T>> {
    match backend.get(key)? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse stored value for {}", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Encodes a value the way stores persist it
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize to JSON")
}
