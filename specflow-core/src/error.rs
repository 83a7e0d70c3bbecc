//! Error taxonomy for the synchronization path

use thiserror::Error;

/// Message carried by every simulated transport failure
pub const NETWORK_ERROR_MESSAGE: &str = "Network error: Request failed. Please try again.";

/// Errors returned by store operations routed through the channel
#[derive(Error, Debug)]
pub enum SyncError {
    /// The channel's failure trial fired; the operation was never evaluated
    #[error("Network error: Request failed. Please try again.")]
    TransientNetworkFailure,

    /// The referenced id is absent from the store
    #[error("Requirement with id {0} not found")]
    NotFound(String),

    /// A controller operation that needs a selected requirement ran without one
    #[error("No requirement is selected")]
    NothingSelected,

    /// The persistence backend rejected a write; in-memory state is unchanged
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SyncError {
    /// True for failures a caller may retry without side effects
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TransientNetworkFailure)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
