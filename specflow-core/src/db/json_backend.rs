//! JSON file storage backend
//!
//! Stores every key in a single JSON object file. Writes hold an exclusive
//! lock on a sibling `.lock` file, reads a shared one, so two processes
//! pointed at the same file don't interleave their read-modify-write cycles.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use super::traits::{BackendType, KeyValueBackend};

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(100);

type Entries = BTreeMap<String, String>;

/// JSON file backend implementation
pub struct JsonFileBackend {
    file_path: PathBuf,
    lock_file_path: PathBuf,
}

impl JsonFileBackend {
    /// Creates a new JSON backend for the given file path
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let lock_file_path = file_path.with_extension("json.lock");
        Self {
            file_path,
            lock_file_path,
        }
    }

    /// Acquire an exclusive lock for writing
    /// Returns the lock file handle which must be held during the operation
    fn acquire_write_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        self.wait_for(|| FileExt::try_lock_exclusive(&lock_file))?;
        Ok(lock_file)
    }

    /// Acquire a shared lock for reading; no lock file means no writer yet
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        self.wait_for(|| FileExt::try_lock_shared(&lock_file))?;
        Ok(Some(lock_file))
    }

    fn wait_for<F>(&self, mut try_lock: F) -> Result<()>
    where
        F: FnMut() -> std::io::Result<()>,
    {
        let start = Instant::now();
        loop {
            match try_lock() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        anyhow::bail!(
                            "Timeout waiting for file lock - another process may be writing: {:?}",
                            self.file_path
                        );
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    fn read_entries(&self) -> Result<Entries> {
        if !self.file_path.exists() {
            return Ok(Entries::new());
        }
        let file = File::open(&self.file_path)
            .with_context(|| format!("Failed to open file: {:?}", self.file_path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse JSON from {:?}", self.file_path))
    }

    fn write_entries(&self, entries: &Entries) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.file_path, json)
            .with_context(|| format!("Failed to write {:?}", self.file_path))
    }

    /// Reload, apply, save, all under the exclusive lock
    fn update_atomically<F>(&self, update_fn: F) -> Result<()>
    where
        F: FnOnce(&mut Entries),
    {
        let mut lock_file = self.acquire_write_lock()?;
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        let mut entries = self.read_entries()?;
        update_fn(&mut entries);
        self.write_entries(&entries)?;
        debug!(path = ?self.file_path, keys = entries.len(), "Persisted JSON store");

        // Lock is released when lock_file is dropped
        Ok(())
    }
}

impl KeyValueBackend for JsonFileBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Json
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.file_path)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let _lock = self.acquire_read_lock()?;
        Ok(self.read_entries()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        self.update_atomically(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), value.clone());
            }
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update_atomically(|map| {
            map.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        let _lock = self.acquire_read_lock()?;
        Ok(self.read_entries()?.into_keys().collect())
    }
}
