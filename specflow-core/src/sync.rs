//! Synchronization controller
//!
//! Holds the local view a UI renders from: the requirement list, the selected
//! requirement with its unsaved edits (the draft), its version history and
//! any generated acceptance criteria. Three writers compete for the selected
//! requirement:
//!
//! - manual save, issued immediately from the draft
//! - autosave, a trailing-edge debounce armed by every draft edit and keyed
//!   by the requirement id at arm time
//! - restore, which copies a version onto the requirement and then pushes it
//!   through the update path with the draft's status
//!
//! Calls complete in whatever order the channel delivers them. Results replace
//! whole records in the list. Results for a requirement that is no longer
//! selected still update the list but never the draft, versions or criteria.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::api::RequirementsApi;
use crate::config::AutosaveConfig;
use crate::criteria::AcceptanceCriteria;
use crate::debounce::Debouncer;
use crate::error::{SyncError, SyncResult};
use crate::models::{NewRequirement, Requirement, RequirementPatch, RequirementUpdate, Status, Version};
use crate::version_store::VersionHistory;

/// Quiet period after the last edit before autosave fires
pub const AUTOSAVE_DELAY: Duration = Duration::from_millis(3000);

/// Title of requirements created from the controller
pub const NEW_REQUIREMENT_TITLE: &str = "New Requirement";

/// How write results that arrive out of order are applied to the view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOrdering {
    /// Every result is applied as it arrives; the last to arrive is shown
    #[default]
    LastResponseWins,
    /// A result is dropped if a later-issued write for the same requirement
    /// has already been applied
    SequenceGuarded,
}

/// Which writer issued a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    ManualSave,
    Autosave,
    Restore,
}

/// Local, unsaved edit state of the selected requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub requirement_id: String,
    pub title: String,
    pub description: String,
    pub status: Status,
}

impl From<&Requirement> for Draft {
    fn from(requirement: &Requirement) -> Self {
        Self {
            requirement_id: requirement.id.clone(),
            title: requirement.title.clone(),
            description: requirement.description.clone(),
            status: requirement.status.clone(),
        }
    }
}

/// Per-requirement issue numbers for write calls
#[derive(Debug, Default)]
struct WriteSequencer {
    issued: HashMap<String, u64>,
    applied: HashMap<String, u64>,
}

impl WriteSequencer {
    fn issue(&mut self, id: &str) -> u64 {
        let seq = self.issued.entry(id.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    fn forget(&mut self, id: &str) {
        self.issued.remove(id);
        self.applied.remove(id);
    }

    fn accept(&mut self, id: &str, seq: u64, ordering: WriteOrdering) -> bool {
        let applied = self.applied.entry(id.to_string()).or_insert(0);
        match ordering {
            WriteOrdering::LastResponseWins => {
                *applied = (*applied).max(seq);
                true
            }
            WriteOrdering::SequenceGuarded if seq >= *applied => {
                *applied = seq;
                true
            }
            WriteOrdering::SequenceGuarded => false,
        }
    }
}

#[derive(Debug, Default)]
struct ViewState {
    requirements: Vec<Requirement>,
    selected: Option<String>,
    draft: Option<Draft>,
    versions: VersionHistory,
    criteria: Option<AcceptanceCriteria>,
    last_saved: Option<DateTime<Utc>>,
    last_error: Option<String>,
    sequencer: WriteSequencer,
    in_flight: usize,
}

impl ViewState {
    fn is_selected(&self, id: &str) -> bool {
        self.selected.as_deref() == Some(id)
    }

    fn replace(&mut self, record: Requirement) {
        if let Some(existing) = self.requirements.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        }
    }

    fn clear_selection(&mut self) {
        self.selected = None;
        self.draft = None;
        self.versions = VersionHistory::default();
        self.criteria = None;
        self.last_saved = None;
    }
}

struct Inner {
    api: Arc<RequirementsApi>,
    debouncer: Debouncer,
    autosave_delay: Duration,
    ordering: WriteOrdering,
    state: Mutex<ViewState>,
}

/// Cheap to clone; clones share the same view
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

impl SyncController {
    pub fn new(api: Arc<RequirementsApi>) -> Self {
        Self::with_settings(api, AUTOSAVE_DELAY, WriteOrdering::default())
    }

    pub fn from_config(api: Arc<RequirementsApi>, config: &AutosaveConfig) -> Self {
        Self::with_settings(api, config.delay(), config.write_ordering)
    }

    pub fn with_settings(api: Arc<RequirementsApi>, autosave_delay: Duration, ordering: WriteOrdering) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                debouncer: Debouncer::new(),
                autosave_delay,
                ordering,
                state: Mutex::new(ViewState::default()),
            }),
        }
    }

    pub fn api(&self) -> &Arc<RequirementsApi> {
        &self.inner.api
    }

    pub fn requirements(&self) -> Vec<Requirement> {
        self.lock().requirements.clone()
    }

    pub fn requirement(&self, id: &str) -> Option<Requirement> {
        self.lock().requirements.iter().find(|r| r.id == id).cloned()
    }

    pub fn selected_id(&self) -> Option<String> {
        self.lock().selected.clone()
    }

    pub fn draft(&self) -> Option<Draft> {
        self.lock().draft.clone()
    }

    pub fn versions(&self) -> VersionHistory {
        self.lock().versions.clone()
    }

    /// Criteria generated for the selected requirement, if any
    pub fn acceptance_criteria(&self) -> Option<AcceptanceCriteria> {
        let state = self.lock();
        state
            .criteria
            .clone()
            .filter(|c| state.is_selected(&c.requirement_id))
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.lock().last_saved
    }

    /// Message of the last failed user-initiated operation
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    /// Number of write calls issued and not yet settled
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn autosave_pending(&self, id: &str) -> bool {
        self.inner.debouncer.is_armed(id)
    }

    /// True when no autosave is armed or running and no write is in flight
    pub fn is_idle(&self) -> bool {
        self.inner.debouncer.is_idle() && self.in_flight() == 0
    }

    /// Reloads the list. A transient failure leaves it empty.
    pub async fn refresh(&self) -> usize {
        let requirements = self.inner.api.list_requirements().await;
        let count = requirements.len();
        self.lock().requirements = requirements;
        count
    }

    /// Selects a requirement from the list and loads its version history.
    ///
    /// Pending autosaves for the previous selection are left to fire.
    pub async fn select(&self, id: &str) -> SyncResult<()> {
        {
            let mut state = self.lock();
            let record = state
                .requirements
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
            state.clear_selection();
            state.selected = Some(id.to_string());
            state.draft = Some(Draft::from(&record));
        }
        debug!(requirement_id = id, "Selected requirement");

        let history = self.inner.api.get_version_history(id).await;
        let mut state = self.lock();
        if state.is_selected(id) {
            state.versions = VersionHistory::new(history);
        }
        Ok(())
    }

    /// Deselects without touching pending autosaves or in-flight calls
    pub fn close(&self) {
        self.lock().clear_selection();
    }

    /// Edits the draft title and re-arms its autosave.
    ///
    /// Returns false, leaving the draft alone, when nothing is selected or
    /// when called outside a Tokio runtime (autosave could not be scheduled).
    pub fn edit_title(&self, title: impl Into<String>) -> bool {
        let title = title.into();
        self.edit(|draft| draft.title = title)
    }

    /// Same contract as [`edit_title`](Self::edit_title)
    pub fn edit_description(&self, description: impl Into<String>) -> bool {
        let description = description.into();
        self.edit(|draft| draft.description = description)
    }

    /// Same contract as [`edit_title`](Self::edit_title)
    pub fn edit_status(&self, status: impl Into<Status>) -> bool {
        let status = status.into();
        self.edit(|draft| draft.status = status)
    }

    /// Saves the draft now
    pub async fn save(&self) -> SyncResult<Requirement> {
        let draft = self.draft().ok_or(SyncError::NothingSelected)?;
        let update = RequirementUpdate::full(draft.title.trim(), draft.description, draft.status);
        let id = draft.requirement_id;
        self.write(&id, WriteKind::ManualSave, self.inner.api.update_requirement(&id, update))
            .await
    }

    /// Creates a requirement with default content and selects it
    pub async fn create(&self) -> SyncResult<Requirement> {
        let draft = NewRequirement::new(NEW_REQUIREMENT_TITLE, "", "Draft");
        let created = match self.inner.api.create_requirement(draft).await {
            Ok(created) => created,
            Err(e) => return Err(self.record_error("create", e)),
        };
        info!(requirement_id = %created.id, "Created requirement");

        self.lock().requirements.push(created.clone());
        self.select(&created.id).await?;
        Ok(created)
    }

    /// Deletes a requirement, dropping it from the view and the selection.
    /// Its version history stays in the store.
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        if let Err(e) = self.inner.api.delete_requirement(id).await {
            return Err(self.record_error("delete", e));
        }
        self.inner.debouncer.cancel(id);

        let mut state = self.lock();
        state.sequencer.forget(id);
        state.requirements.retain(|r| r.id != id);
        if state.is_selected(id) {
            state.clear_selection();
        }
        info!(requirement_id = id, "Deleted requirement");
        Ok(())
    }

    /// Snapshots the draft's title and description, saved or not
    pub async fn commit_version(&self) -> SyncResult<Version> {
        let draft = self.draft().ok_or(SyncError::NothingSelected)?;
        let id = draft.requirement_id;

        let version = match self
            .inner
            .api
            .commit_version(&id, &draft.title, &draft.description)
            .await
        {
            Ok(version) => version,
            Err(e) => return Err(self.record_error("commit", e)),
        };

        let mut state = self.lock();
        if state.is_selected(&id) {
            state.versions.push(version.clone());
        }
        Ok(version)
    }

    /// Restores `version` onto the selected requirement.
    ///
    /// The draft's status at call time is carried into the follow-up update,
    /// so the stored status survives the restore.
    pub async fn restore_version(&self, version: &Version) -> SyncResult<Requirement> {
        let draft = self.draft().ok_or(SyncError::NothingSelected)?;
        let id = draft.requirement_id;
        let status = draft.status;

        let restored = self
            .write(&id, WriteKind::Restore, self.inner.api.restore_version(&id, version))
            .await?;

        let rearm = {
            let mut state = self.lock();
            match state.draft.as_mut() {
                Some(draft) if draft.requirement_id == id => {
                    draft.title = restored.title.clone();
                    draft.description = restored.description.clone();
                    Some(draft.clone())
                }
                _ => None,
            }
        };
        // The draft changed, so any autosave still pending for it must carry
        // the restored text rather than the edits made before the restore.
        if let Some(draft) = rearm {
            self.arm_autosave(draft);
        }

        let update = RequirementUpdate::full(restored.title, restored.description, status);
        self.write(&id, WriteKind::Restore, self.inner.api.update_requirement(&id, update))
            .await
    }

    /// Restores the last committed version, if there is one
    pub async fn restore_latest(&self) -> SyncResult<Option<Requirement>> {
        let latest = self.versions().latest().cloned();
        match latest {
            Some(version) => self.restore_version(&version).await.map(Some),
            None => Ok(None),
        }
    }

    /// Generates criteria for the selected requirement's stored title
    pub async fn generate_criteria(&self) -> SyncResult<AcceptanceCriteria> {
        let id = {
            let mut state = self.lock();
            state.criteria = None;
            state.selected.clone().ok_or(SyncError::NothingSelected)?
        };

        let generated = match self.inner.api.generate_acceptance_criteria(&id).await {
            Ok(generated) => generated,
            Err(e) => return Err(self.record_error("generate", e)),
        };

        let mut state = self.lock();
        if state.is_selected(&id) {
            state.criteria = Some(generated.clone());
        }
        Ok(generated)
    }

    fn edit<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut Draft),
    {
        if Handle::try_current().is_err() {
            warn!("Draft edit ignored outside an async runtime");
            return false;
        }
        let draft = {
            let mut state = self.lock();
            let Some(draft) = state.draft.as_mut() else {
                return false;
            };
            change(draft);
            draft.clone()
        };
        self.arm_autosave(draft)
    }

    fn arm_autosave(&self, draft: Draft) -> bool {
        let controller = self.clone();
        let id = draft.requirement_id.clone();
        self.inner
            .debouncer
            .arm(id, self.inner.autosave_delay, async move {
                // Failures are logged in `settle`; autosave has no caller to report to
                let _ = controller.autosave(draft).await;
            })
    }

    async fn autosave(&self, draft: Draft) -> SyncResult<Requirement> {
        let patch = RequirementPatch {
            title: Some(draft.title.trim().to_string()),
            description: Some(draft.description),
            status: Some(draft.status),
        };
        let id = draft.requirement_id;
        self.write(&id, WriteKind::Autosave, self.inner.api.auto_save_requirement(&id, patch))
            .await
    }

    /// Issues a write and applies its result. The sequence number is taken
    /// before the call is first polled, i.e. at issue time.
    async fn write<Fut>(&self, id: &str, kind: WriteKind, call: Fut) -> SyncResult<Requirement>
    where
        Fut: Future<Output = SyncResult<Requirement>>,
    {
        let seq = {
            let mut state = self.lock();
            state.in_flight += 1;
            state.sequencer.issue(id)
        };
        let result = call.await;
        self.settle(id, seq, kind, result)
    }

    fn settle(&self, id: &str, seq: u64, kind: WriteKind, result: SyncResult<Requirement>) -> SyncResult<Requirement> {
        let ordering = self.inner.ordering;
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);

        match &result {
            Ok(record) => {
                if state.sequencer.accept(id, seq, ordering) {
                    state.replace(record.clone());
                    if state.is_selected(id) && kind != WriteKind::Restore {
                        state.last_saved = Some(Utc::now());
                    }
                    debug!(requirement_id = id, seq, ?kind, "Applied write result");
                } else {
                    debug!(requirement_id = id, seq, ?kind, "Dropped stale write result");
                }
            }
            Err(e) if kind == WriteKind::Autosave => {
                warn!(requirement_id = id, seq, error = %e, "Auto-save failed");
            }
            Err(e) => {
                warn!(requirement_id = id, seq, ?kind, error = %e, "Write failed");
                state.last_error = Some(e.to_string());
            }
        }
        result
    }

    fn record_error(&self, op: &'static str, error: SyncError) -> SyncError {
        warn!(op, error = %error, "Operation failed");
        self.lock().last_error = Some(error.to_string());
        error
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelPolicy;
    use crate::db::MemoryBackend;
    use tokio::time::sleep;

    async fn controller_with(policy: ChannelPolicy, ordering: WriteOrdering) -> SyncController {
        let api = RequirementsApi::open(Arc::new(MemoryBackend::new()), policy).unwrap();
        let controller = SyncController::with_settings(Arc::new(api), AUTOSAVE_DELAY, ordering);
        controller.refresh().await;
        controller
    }

    async fn reliable_controller() -> SyncController {
        controller_with(ChannelPolicy::reliable(), WriteOrdering::LastResponseWins).await
    }

    fn stored(controller: &SyncController, id: &str) -> Requirement {
        controller.api().entities().get(id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_fires_after_last_edit() {
        let controller = reliable_controller().await;
        controller.select("1").await.unwrap();

        assert!(controller.edit_title("A"));
        sleep(Duration::from_secs(1)).await;
        controller.edit_title("  AB  ");
        sleep(Duration::from_secs(1)).await;
        controller.edit_description("details");
        assert!(controller.autosave_pending("1"));

        sleep(Duration::from_millis(2999)).await;
        assert_eq!(stored(&controller, "1").title, "User Authentication");

        sleep(Duration::from_millis(2)).await;
        let saved = stored(&controller, "1");
        assert_eq!(saved.title, "AB");
        assert_eq!(saved.description, "details");
        assert_eq!(saved.status.as_str(), "Completed");
        assert_eq!(controller.requirement("1").unwrap(), saved);
        assert!(controller.last_saved().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_edits_never_autosave_midstream() {
        let controller = reliable_controller().await;
        controller.select("2").await.unwrap();
        let calls_before = controller.api().channel().stats().calls;

        for i in 0..20 {
            controller.edit_description(format!("edit {}", i));
            sleep(Duration::from_millis(2500)).await;
        }
        assert_eq!(controller.api().channel().stats().calls, calls_before);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(controller.api().channel().stats().calls, calls_before + 1);
        assert_eq!(stored(&controller, "2").description, "edit 19");
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_change_keeps_pending_autosave() {
        let controller = reliable_controller().await;
        controller.select("1").await.unwrap();
        controller.edit_title("Changed");

        controller.select("2").await.unwrap();
        assert!(controller.autosave_pending("1"));
        assert_eq!(controller.draft().unwrap().requirement_id, "2");

        sleep(Duration::from_millis(3001)).await;
        assert_eq!(stored(&controller, "1").title, "Changed");
        assert_eq!(controller.requirement("1").unwrap().title, "Changed");
        // Draft of the new selection is untouched
        assert_eq!(controller.draft().unwrap().title, "Dashboard Analytics");
        assert!(controller.last_saved().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_without_selection_is_noop() {
        let controller = reliable_controller().await;
        assert!(!controller.edit_title("x"));
        assert!(matches!(controller.save().await, Err(SyncError::NothingSelected)));
        assert!(matches!(controller.commit_version().await, Err(SyncError::NothingSelected)));
        assert!(controller.select("404").await.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_save_replaces_record() {
        let controller = reliable_controller().await;
        controller.select("3").await.unwrap();
        controller.edit_status("Completed");
        controller.edit_title(" Export to PDF (A4) ");

        let saved = controller.save().await.unwrap();
        assert_eq!(saved.title, "Export to PDF (A4)");
        assert_eq!(saved.status.as_str(), "Completed");
        assert_eq!(controller.requirement("3").unwrap(), saved);
        assert!(controller.last_saved().is_some());
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_failure_is_reported() {
        let controller = controller_with(
            ChannelPolicy::reliable().with_failure_probability(1.0),
            WriteOrdering::LastResponseWins,
        )
        .await;
        // The failing list call leaves the view empty; seed it from the store
        controller.lock().requirements = controller.api().entities().list();
        controller.select("1").await.unwrap();
        controller.edit_title("never stored");

        let err = controller.save().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            controller.last_error().as_deref(),
            Some("Network error: Request failed. Please try again.")
        );
        assert_eq!(stored(&controller, "1").title, "User Authentication");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_carries_local_status_and_keeps_history() {
        let controller = reliable_controller().await;
        controller.select("1").await.unwrap();

        controller.edit_status("In Progress");
        let v1 = controller.commit_version().await.unwrap();
        controller.edit_title("Something else");
        controller.commit_version().await.unwrap();
        assert_eq!(controller.versions().len(), 2);

        let restored = controller.restore_version(&v1).await.unwrap();
        assert_eq!(restored.title, "User Authentication");
        assert_eq!(restored.status.as_str(), "In Progress");
        assert_eq!(controller.draft().unwrap().title, "User Authentication");
        assert_eq!(controller.api().versions().history("1").len(), 2);

        // The pending autosave now carries the restored text
        sleep(Duration::from_millis(3001)).await;
        let after = stored(&controller, "1");
        assert_eq!(after.title, "User Authentication");
        assert_eq!(after.status.as_str(), "In Progress");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_latest_uses_last_appended() {
        let controller = reliable_controller().await;
        controller.select("4").await.unwrap();
        assert!(controller.restore_latest().await.unwrap().is_none());

        controller.edit_title("Email v1");
        controller.commit_version().await.unwrap();
        controller.edit_title("Email v2");
        controller.commit_version().await.unwrap();
        controller.edit_title("Scratch");

        let restored = controller.restore_latest().await.unwrap().unwrap();
        assert_eq!(restored.title, "Email v2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_for_previous_selection_are_not_displayed() {
        let controller = controller_with(ChannelPolicy::fixed_latency(200), WriteOrdering::LastResponseWins).await;
        controller.select("1").await.unwrap();

        let commit = controller.commit_version();
        let switch = async {
            sleep(Duration::from_millis(10)).await;
            controller.select("2").await.unwrap();
        };
        let (committed, _) = tokio::join!(commit, switch);

        assert_eq!(committed.unwrap().requirement_id, "1");
        assert!(controller.versions().is_empty());
        assert_eq!(controller.api().versions().history("1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_selects_new_requirement() {
        let controller = reliable_controller().await;
        let created = controller.create().await.unwrap();

        assert_eq!(created.id, "5");
        assert_eq!(created.title, NEW_REQUIREMENT_TITLE);
        assert_eq!(controller.selected_id().as_deref(), Some("5"));
        assert_eq!(controller.requirements().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_clears_selection_and_pending_autosave() {
        let controller = reliable_controller().await;
        controller.select("2").await.unwrap();
        controller.edit_title("doomed");

        controller.delete("2").await.unwrap();
        assert!(controller.selected_id().is_none());
        assert!(!controller.autosave_pending("2"));
        assert!(controller.requirement("2").is_none());

        let err = controller.delete("2").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(controller.last_error().unwrap().contains("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_criteria_discarded_on_selection_change() {
        let controller = reliable_controller().await;
        controller.select("1").await.unwrap();

        let generated = controller.generate_criteria().await.unwrap();
        assert_eq!(controller.acceptance_criteria(), Some(generated));

        controller.select("2").await.unwrap();
        assert!(controller.acceptance_criteria().is_none());
    }

    async fn race_two_saves(controller: &SyncController) -> Vec<&'static str> {
        let settled = Mutex::new(Vec::new());
        let first = async {
            controller.edit_title("A");
            controller.save().await.unwrap();
            settled.lock().unwrap().push("A");
        };
        let second = async {
            sleep(Duration::from_millis(10)).await;
            controller.edit_title("B");
            controller.save().await.unwrap();
            settled.lock().unwrap().push("B");
        };
        tokio::join!(first, second);
        settled.into_inner().unwrap()
    }

    fn racy_policy(seed: u64) -> ChannelPolicy {
        ChannelPolicy::default()
            .with_failure_probability(0.0)
            .with_drift(0.0, 0.0)
            .with_seed(seed)
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_response_wins_follows_completion_order() {
        for seed in 0..12 {
            let controller = controller_with(racy_policy(seed), WriteOrdering::LastResponseWins).await;
            controller.select("1").await.unwrap();

            let order = race_two_saves(&controller).await;
            let last = *order.last().unwrap();
            assert_eq!(stored(&controller, "1").title, last, "seed {}", seed);
            assert_eq!(controller.requirement("1").unwrap().title, last, "seed {}", seed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_guard_shows_last_issued_write() {
        let mut saw_reordering = false;
        for seed in 0..12 {
            let controller = controller_with(racy_policy(seed), WriteOrdering::SequenceGuarded).await;
            controller.select("1").await.unwrap();

            let order = race_two_saves(&controller).await;
            saw_reordering |= order == vec!["B", "A"];
            // The store still holds whichever landed last
            assert_eq!(stored(&controller, "1").title, *order.last().unwrap());
            assert_eq!(controller.requirement("1").unwrap().title, "B", "seed {}", seed);
        }
        assert!(saw_reordering);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_save_races_in_flight_autosave() {
        let mut outcomes = Vec::new();
        for seed in 0..16 {
            let controller = controller_with(racy_policy(seed), WriteOrdering::LastResponseWins).await;
            controller.select("1").await.unwrap();

            controller.edit_title("auto");
            sleep(AUTOSAVE_DELAY + Duration::from_millis(1)).await;
            assert!(!controller.autosave_pending("1"));
            assert_eq!(controller.in_flight(), 1, "seed {}", seed);

            // Manual save of a different title while the autosave is in flight
            controller.edit_title("manual");
            controller.inner.debouncer.cancel("1");
            controller.save().await.unwrap();
            let last = if controller.in_flight() > 0 { "auto" } else { "manual" };

            while !controller.is_idle() {
                sleep(Duration::from_millis(50)).await;
            }
            assert_eq!(stored(&controller, "1").title, last, "seed {}", seed);
            assert_eq!(controller.requirement("1").unwrap().title, last, "seed {}", seed);
            outcomes.push(last);
        }
        assert!(outcomes.contains(&"auto"));
        assert!(outcomes.contains(&"manual"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_failure_is_logged_only() {
        let controller = controller_with(
            ChannelPolicy::reliable().with_failure_probability(1.0),
            WriteOrdering::LastResponseWins,
        )
        .await;
        controller.lock().requirements = controller.api().entities().list();
        controller.select("1").await.unwrap();
        let before = stored(&controller, "1");

        assert!(controller.edit_title("lost"));
        sleep(AUTOSAVE_DELAY + Duration::from_millis(1)).await;

        assert_eq!(stored(&controller, "1"), before);
        assert_eq!(controller.requirement("1").unwrap(), before);
        assert!(controller.last_error().is_none());
        assert_eq!(controller.in_flight(), 0);
        assert!(controller.is_idle());
        // list, history and the autosave itself
        assert_eq!(controller.api().channel().stats().failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_leaves_view_unchanged() {
        let controller = controller_with(
            ChannelPolicy::reliable().with_failure_probability(1.0),
            WriteOrdering::LastResponseWins,
        )
        .await;
        controller.lock().requirements = controller.api().entities().list();
        let before = controller.requirements();

        let err = controller.create().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            controller.last_error().as_deref(),
            Some(crate::error::NETWORK_ERROR_MESSAGE)
        );
        assert_eq!(controller.requirements(), before);
        assert!(controller.selected_id().is_none());
        assert_eq!(controller.api().entities().len(), 4);
        assert_eq!(controller.api().entities().next_id(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_idle_until_fired_autosave_settles() {
        let controller = controller_with(ChannelPolicy::fixed_latency(200), WriteOrdering::LastResponseWins).await;
        controller.select("2").await.unwrap();
        assert!(controller.is_idle());

        controller.edit_description("pending");
        assert!(!controller.is_idle());

        sleep(AUTOSAVE_DELAY + Duration::from_millis(50)).await;
        assert!(!controller.autosave_pending("2"));
        assert!(!controller.is_idle());

        sleep(Duration::from_millis(200)).await;
        assert!(controller.is_idle());
        assert_eq!(stored(&controller, "2").description, "pending");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_forgets_write_sequence() {
        let controller = reliable_controller().await;
        controller.select("3").await.unwrap();
        controller.save().await.unwrap();
        assert!(controller.lock().sequencer.issued.contains_key("3"));

        controller.delete("3").await.unwrap();
        let state = controller.lock();
        assert!(!state.sequencer.issued.contains_key("3"));
        assert!(!state.sequencer.applied.contains_key("3"));
    }

    #[test]
    fn test_edit_outside_runtime_is_refused() {
        let api = RequirementsApi::open(Arc::new(MemoryBackend::new()), ChannelPolicy::reliable()).unwrap();
        let controller = SyncController::new(Arc::new(api));
        let record = controller.api().entities().get("1").unwrap();
        {
            let mut state = controller.lock();
            state.requirements = vec![record.clone()];
            state.selected = Some(record.id.clone());
            state.draft = Some(Draft::from(&record));
        }

        assert!(!controller.edit_title("offline"));
        assert_eq!(controller.draft().unwrap().title, "User Authentication");
        assert!(!controller.autosave_pending("1"));
    }
}
