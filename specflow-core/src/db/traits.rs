//! Persistence backend traits
//!
//! Stores persist their tables as JSON strings under fixed keys. Any backend
//! that can hold string values by key can carry them.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Types of persistence backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Process-local map, lost on exit
    Memory,
    /// Single JSON object file
    Json,
    /// SQLite key/value table
    Sqlite,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Memory => write!(f, "Memory"),
            BackendType::Json => write!(f, "JSON"),
            BackendType::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Core trait for key/value persistence backends
///
/// The design philosophy is:
/// - values are opaque strings; stores own the encoding
/// - `set_many` is the unit of atomicity for writes spanning two tables
///   (a table and its id counter); backends that can should make it atomic
pub trait KeyValueBackend: Send + Sync {
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Returns the path backing this store, if any
    fn path(&self) -> Option<&Path> {
        None
    }

    /// Reads a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes several values together
    fn set_many(&self, entries: &[(&str, String)]) -> Result<()>;

    /// Removes a value; absent keys are ignored
    fn remove(&self, key: &str) -> Result<()>;

    /// Lists all keys in ascending order
    fn keys(&self) -> Result<Vec<String>>;

    /// Writes a single value
    fn set(&self, key: &str, value: String) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    /// Returns true if the key holds a value
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}
