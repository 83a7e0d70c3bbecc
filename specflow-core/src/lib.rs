pub mod api;
pub mod channel;
pub mod config;
pub mod criteria;
pub mod db;
pub mod debounce;
pub mod entity_store;
pub mod error;
pub mod models;
pub mod sync;
pub mod version_store;

// Re-export commonly used types
pub use api::RequirementsApi;
pub use channel::{ChannelPolicy, ChannelStats, DriftSite, UnreliableChannel};
pub use config::{get_config_path, get_default_data_path, AutosaveConfig, SpecFlowConfig, StorageConfig};
pub use criteria::AcceptanceCriteria;
pub use db::{create_backend, BackendType, KeyValueBackend};
pub use debounce::Debouncer;
pub use entity_store::EntityStore;
pub use error::{SyncError, SyncResult, NETWORK_ERROR_MESSAGE};
pub use models::{
    NewRequirement, Requirement, RequirementPatch, RequirementUpdate, Status, StatusTone, Version,
    DEFAULT_STATUS, DEFAULT_TITLE, KNOWN_STATUSES,
};
pub use sync::{Draft, SyncController, WriteKind, WriteOrdering, AUTOSAVE_DELAY};
pub use version_store::{VersionHistory, VersionStore};
