//! Requirements API
//!
//! The asynchronous surface callers use. Each operation is one independent
//! channel call wrapping one store operation.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::channel::{ChannelPolicy, DriftSite, UnreliableChannel};
use crate::config::SpecFlowConfig;
use crate::criteria::{self, AcceptanceCriteria};
use crate::db::{create_backend, KeyValueBackend};
use crate::entity_store::EntityStore;
use crate::error::SyncResult;
use crate::models::{NewRequirement, Requirement, RequirementPatch, RequirementUpdate, Version};
use crate::version_store::VersionStore;

pub struct RequirementsApi {
    channel: UnreliableChannel,
    entities: EntityStore,
    versions: VersionStore,
    backend: Arc<dyn KeyValueBackend>,
}

impl RequirementsApi {
    /// Opens both stores on `backend`, seeding on first run
    pub fn open(backend: Arc<dyn KeyValueBackend>, policy: ChannelPolicy) -> Result<Self> {
        let entities = EntityStore::open(Arc::clone(&backend)).context("Failed to open requirements table")?;
        let versions = VersionStore::open(Arc::clone(&backend)).context("Failed to open version history")?;
        info!(
            backend = %backend.backend_type(),
            requirements = entities.len(),
            "Opened requirements API"
        );

        Ok(Self {
            channel: UnreliableChannel::new(policy),
            entities,
            versions,
            backend,
        })
    }

    /// Opens the backend at `path` using the config's storage and channel settings
    pub fn from_config(config: &SpecFlowConfig, path: &Path) -> Result<Self> {
        let backend = create_backend(path, config.storage.backend)?;
        Self::open(backend, config.channel.clone())
    }

    pub fn channel(&self) -> &UnreliableChannel {
        &self.channel
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueBackend> {
        &self.backend
    }

    /// Restores seed data and clears version history, bypassing the channel
    pub fn reset(&self) -> Result<()> {
        self.entities.reset()?;
        self.versions.reset()?;
        info!("Reset stores to seed data");
        Ok(())
    }

    /// All requirements; a transient failure yields an empty list
    pub async fn list_requirements(&self) -> Vec<Requirement> {
        match self.channel.execute("list", || Ok(self.entities.list())).await {
            Ok(requirements) => requirements,
            Err(e) => {
                warn!(error = %e, "Listing requirements failed, showing none");
                Vec::new()
            }
        }
    }

    pub async fn get_requirement(&self, id: &str) -> SyncResult<Requirement> {
        self.channel.execute("get", || self.entities.get(id)).await
    }

    pub async fn create_requirement(&self, draft: NewRequirement) -> SyncResult<Requirement> {
        self.channel
            .execute("create", || {
                self.entities
                    .create(draft, |status| self.channel.drift(status, DriftSite::Create))
            })
            .await
    }

    pub async fn update_requirement(&self, id: &str, update: RequirementUpdate) -> SyncResult<Requirement> {
        self.channel
            .execute("update", || {
                self.entities
                    .update(id, update, |status| self.channel.drift(status, DriftSite::Update))
            })
            .await
    }

    pub async fn delete_requirement(&self, id: &str) -> SyncResult<()> {
        self.channel.execute("delete", || self.entities.delete(id)).await
    }

    /// Criteria for the requirement's title as stored when the call lands
    pub async fn generate_acceptance_criteria(&self, id: &str) -> SyncResult<AcceptanceCriteria> {
        self.channel
            .execute("generate", || {
                let requirement = self.entities.get(id)?;
                Ok(criteria::generate(&requirement))
            })
            .await
    }

    /// Versions in append order; a transient failure yields an empty list
    pub async fn get_version_history(&self, requirement_id: &str) -> Vec<Version> {
        match self
            .channel
            .execute("history", || Ok(self.versions.history(requirement_id)))
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(requirement_id, error = %e, "Loading version history failed, showing none");
                Vec::new()
            }
        }
    }

    pub async fn commit_version(&self, requirement_id: &str, title: &str, description: &str) -> SyncResult<Version> {
        self.channel
            .execute("commit", || self.versions.commit(requirement_id, title, description))
            .await
    }

    /// Copies the snapshot's title and description onto the requirement.
    /// History is left as it is; no version is added or removed.
    pub async fn restore_version(&self, requirement_id: &str, version: &Version) -> SyncResult<Requirement> {
        self.channel
            .execute("restore", || self.entities.apply_snapshot(requirement_id, version))
            .await
    }

    pub async fn auto_save_requirement(&self, id: &str, patch: RequirementPatch) -> SyncResult<Requirement> {
        self.channel
            .execute("autosave", || self.entities.patch(id, patch))
            .await
    }
}
