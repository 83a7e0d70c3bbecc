//! Version store: append-only snapshot log per requirement
//!
//! Lists are keyed by requirement id but hold no reference to the entity
//! table; deleting a requirement leaves its versions in place.

use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::db::{encode_json, read_json, KeyValueBackend, NEXT_VERSION_ID_KEY, VERSION_HISTORY_KEY};
use crate::error::SyncResult;
use crate::models::Version;

/// First version id handed out
pub const FIRST_VERSION_ID: u64 = 1;

#[derive(Debug, Clone, Default)]
struct VersionLog {
    history: BTreeMap<String, Vec<Version>>,
    next_id: u64,
}

pub struct VersionStore {
    backend: Arc<dyn KeyValueBackend>,
    log: Mutex<VersionLog>,
}

impl VersionStore {
    /// Loads the log from `backend`; absent tables start empty
    pub fn open(backend: Arc<dyn KeyValueBackend>) -> Result<Self> {
        let history = read_json(backend.as_ref(), VERSION_HISTORY_KEY)?.unwrap_or_default();
        let next_id = read_json(backend.as_ref(), NEXT_VERSION_ID_KEY)?.unwrap_or(FIRST_VERSION_ID);

        Ok(Self {
            backend,
            log: Mutex::new(VersionLog { history, next_id }),
        })
    }

    /// Drops every version and restarts the counter
    pub fn reset(&self) -> Result<()> {
        let mut log = self.lock();
        let empty = VersionLog {
            history: BTreeMap::new(),
            next_id: FIRST_VERSION_ID,
        };
        self.persist(&empty)?;
        *log = empty;
        Ok(())
    }

    /// Append-ordered copy of the versions for `requirement_id`
    pub fn history(&self, requirement_id: &str) -> Vec<Version> {
        self.lock()
            .history
            .get(requirement_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Id the next commit will receive
    pub fn next_id(&self) -> u64 {
        self.lock().next_id
    }

    /// Appends a snapshot. The title is trimmed, the description kept verbatim.
    pub fn commit(&self, requirement_id: &str, title: &str, description: &str) -> SyncResult<Version> {
        let mut log = self.lock();
        let mut next = log.clone();

        let version = Version {
            id: next.next_id.to_string(),
            requirement_id: requirement_id.to_string(),
            title: title.trim().to_string(),
            description: description.to_string(),
            timestamp: Utc::now(),
        };
        next.next_id += 1;
        next.history
            .entry(requirement_id.to_string())
            .or_default()
            .push(version.clone());

        self.persist(&next)?;
        *log = next;
        debug!(requirement_id, version_id = %version.id, "Committed version");
        Ok(version)
    }

    fn persist(&self, log: &VersionLog) -> Result<()> {
        self.backend.set_many(&[
            (VERSION_HISTORY_KEY, encode_json(&log.history)?),
            (NEXT_VERSION_ID_KEY, encode_json(&log.next_id)?),
        ])
    }

    fn lock(&self) -> MutexGuard<'_, VersionLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A requirement's versions in append order, as shown to a user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionHistory {
    versions: Vec<Version>,
}

impl VersionHistory {
    pub fn new(versions: Vec<Version>) -> Self {
        Self { versions }
    }

    /// The last appended version; timestamps are not consulted
    pub fn latest(&self) -> Option<&Version> {
        self.versions.last()
    }

    pub fn is_latest(&self, index: usize) -> bool {
        index + 1 == self.versions.len()
    }

    /// One-based label, `v1` for the first commit
    pub fn label(index: usize) -> String {
        format!("v{}", index + 1)
    }

    pub fn push(&mut self, version: Version) {
        self.versions.push(version);
    }

    pub fn find(&self, version_id: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.id == version_id)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Version> {
        self.versions.iter()
    }

    pub fn as_slice(&self) -> &[Version] {
        &self.versions
    }
}

impl From<Vec<Version>> for VersionHistory {
    fn from(versions: Vec<Version>) -> Self {
        Self::new(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;
    use crate::entity_store::tests::ReadOnlyBackend;
    use crate::error::SyncError;
    use chrono::Duration;

    #[test]
    fn test_commit_appends_and_trims_title() {
        let store = VersionStore::open(Arc::new(MemoryBackend::new())).unwrap();
        assert!(store.history("1").is_empty());

        let v1 = store.commit("1", "  Login  ", " keep spaces ").unwrap();
        assert_eq!(v1.id, "1");
        assert_eq!(v1.title, "Login");
        assert_eq!(v1.description, " keep spaces ");
        assert_eq!(v1.requirement_id, "1");
    }

    #[test]
    fn test_version_ids_are_global() {
        let store = VersionStore::open(Arc::new(MemoryBackend::new())).unwrap();
        let a = store.commit("1", "a", "").unwrap();
        let b = store.commit("2", "b", "").unwrap();
        let c = store.commit("1", "c", "").unwrap();
        assert_eq!((a.id.as_str(), b.id.as_str(), c.id.as_str()), ("1", "2", "3"));

        let titles: Vec<String> = store.history("1").into_iter().map(|v| v.title).collect();
        assert_eq!(titles, vec!["a", "c"]);
    }

    #[test]
    fn test_log_survives_restart() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = VersionStore::open(backend.clone()).unwrap();
            store.commit("4", "first", "").unwrap();
            store.commit("4", "second", "").unwrap();
        }

        let reopened = VersionStore::open(backend).unwrap();
        assert_eq!(reopened.history("4").len(), 2);
        assert_eq!(reopened.next_id(), 3);
    }

    #[test]
    fn test_failed_persist_appends_nothing() {
        let store = VersionStore::open(Arc::new(ReadOnlyBackend(MemoryBackend::new()))).unwrap();
        let err = store.commit("1", "x", "").unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(store.history("1").is_empty());
        assert_eq!(store.next_id(), 1);
    }

    #[test]
    fn test_latest_ignores_timestamps() {
        let now = Utc::now();
        let older = Version {
            id: "2".to_string(),
            requirement_id: "1".to_string(),
            title: "appended last".to_string(),
            description: String::new(),
            timestamp: now - Duration::hours(1),
        };
        let newer = Version {
            id: "1".to_string(),
            title: "appended first".to_string(),
            timestamp: now,
            ..older.clone()
        };

        let history = VersionHistory::new(vec![newer, older]);
        assert_eq!(history.latest().unwrap().title, "appended last");
        assert!(history.is_latest(1));
        assert!(!history.is_latest(0));
        assert_eq!(VersionHistory::label(0), "v1");
        assert_eq!(history.find("1").unwrap().title, "appended first");
    }
}
