//! Entity store: the durable table of requirements
//!
//! Every mutation runs on a copy of the table, persists the copy and only
//! then replaces the in-memory table, all under one mutex. A failed write
//! therefore leaves both the backend and memory as they were.

use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::db::{encode_json, read_json, KeyValueBackend, NEXT_ID_KEY, REQUIREMENTS_KEY};
use crate::error::{SyncError, SyncResult};
use crate::models::{
    seed_requirements, NewRequirement, Requirement, RequirementPatch, RequirementUpdate, Status,
    Version, DEFAULT_STATUS, DEFAULT_TITLE,
};

/// First id handed out after the seeded rows
pub const FIRST_REQUIREMENT_ID: u64 = 5;

#[derive(Debug, Clone)]
struct EntityTable {
    requirements: Vec<Requirement>,
    next_id: u64,
}

impl EntityTable {
    fn seeded() -> Self {
        Self {
            requirements: seed_requirements(),
            next_id: FIRST_REQUIREMENT_ID,
        }
    }

    fn find_mut(&mut self, id: &str) -> SyncResult<&mut Requirement> {
        self.requirements
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }
}

pub struct EntityStore {
    backend: Arc<dyn KeyValueBackend>,
    table: Mutex<EntityTable>,
}

impl EntityStore {
    /// Loads the table from `backend`, seeding it on first run
    pub fn open(backend: Arc<dyn KeyValueBackend>) -> Result<Self> {
        let requirements = match read_json::<Vec<Requirement>>(backend.as_ref(), REQUIREMENTS_KEY)? {
            Some(requirements) => requirements,
            None => {
                let seeded = seed_requirements();
                backend.set(REQUIREMENTS_KEY, encode_json(&seeded)?)?;
                info!(rows = seeded.len(), "Seeded requirements table");
                seeded
            }
        };

        let next_id = match read_json::<u64>(backend.as_ref(), NEXT_ID_KEY)? {
            Some(next_id) => next_id,
            None => {
                backend.set(NEXT_ID_KEY, encode_json(&FIRST_REQUIREMENT_ID)?)?;
                FIRST_REQUIREMENT_ID
            }
        };

        Ok(Self {
            backend,
            table: Mutex::new(EntityTable {
                requirements,
                next_id,
            }),
        })
    }

    /// Restores the seed rows and counter
    pub fn reset(&self) -> Result<()> {
        let mut table = self.lock();
        let seeded = EntityTable::seeded();
        self.persist(&seeded, true)?;
        *table = seeded;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id the next create will receive
    pub fn next_id(&self) -> u64 {
        self.lock().next_id
    }

    pub fn list(&self) -> Vec<Requirement> {
        self.lock().requirements.clone()
    }

    pub fn get(&self, id: &str) -> SyncResult<Requirement> {
        self.lock()
            .requirements
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    /// Appends a requirement, filling omitted or empty fields with defaults.
    ///
    /// `drift` receives the resolved status and returns the value to store.
    pub fn create<D>(&self, draft: NewRequirement, drift: D) -> SyncResult<Requirement>
    where
        D: FnOnce(Status) -> Status,
    {
        let title = draft
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let description = draft.description.unwrap_or_default();
        let status = draft
            .status
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Status::from(DEFAULT_STATUS));
        let status = drift(status);

        self.mutate(true, |table| {
            let requirement = Requirement {
                id: table.next_id.to_string(),
                title,
                description,
                status,
            };
            table.next_id += 1;
            table.requirements.push(requirement.clone());
            debug!(requirement_id = %requirement.id, "Created requirement");
            Ok(requirement)
        })
    }

    /// Shallow merge of `update`; the stored status is always replaced.
    ///
    /// `drift` is only consulted for a non-empty status.
    pub fn update<D>(&self, id: &str, update: RequirementUpdate, drift: D) -> SyncResult<Requirement>
    where
        D: FnOnce(Status) -> Status,
    {
        self.mutate(false, |table| {
            let requirement = table.find_mut(id)?;
            let status = if update.status.is_empty() {
                update.status
            } else {
                drift(update.status)
            };
            if let Some(title) = update.title {
                requirement.title = title;
            }
            if let Some(description) = update.description {
                requirement.description = description;
            }
            requirement.status = status;
            Ok(requirement.clone())
        })
    }

    /// Shallow merge without drift and without touching omitted fields
    pub fn patch(&self, id: &str, patch: RequirementPatch) -> SyncResult<Requirement> {
        self.mutate(false, |table| {
            let requirement = table.find_mut(id)?;
            patch.apply_to(requirement);
            Ok(requirement.clone())
        })
    }

    /// Overwrites title and description from a snapshot; status is untouched
    pub fn apply_snapshot(&self, id: &str, version: &Version) -> SyncResult<Requirement> {
        self.mutate(false, |table| {
            let requirement = table.find_mut(id)?;
            requirement.title = version.title.clone();
            requirement.description = version.description.clone();
            Ok(requirement.clone())
        })
    }

    pub fn delete(&self, id: &str) -> SyncResult<()> {
        self.mutate(false, |table| {
            let index = table
                .requirements
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
            table.requirements.remove(index);
            Ok(())
        })
    }

    fn mutate<R, F>(&self, persist_counter: bool, apply: F) -> SyncResult<R>
    where
        F: FnOnce(&mut EntityTable) -> SyncResult<R>,
    {
        let mut table = self.lock();
        let mut next = table.clone();
        let result = apply(&mut next)?;
        self.persist(&next, persist_counter)?;
        *table = next;
        Ok(result)
    }

    fn persist(&self, table: &EntityTable, persist_counter: bool) -> Result<()> {
        let mut entries = vec![(REQUIREMENTS_KEY, encode_json(&table.requirements)?)];
        if persist_counter {
            entries.push((NEXT_ID_KEY, encode_json(&table.next_id)?));
        }
        self.backend.set_many(&entries)?;
        debug!(rows = table.requirements.len(), "Persisted requirements table");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, EntityTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
