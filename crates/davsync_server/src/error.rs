//! Error types for the sync server.

use crate::store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Every admission slot stayed busy for the whole retry budget.
    #[error("admission timeout: no free slot for {resource} after {attempts} attempts")]
    AdmissionTimeout {
        /// Resource the caller tried to reach.
        resource: String,
        /// Number of scan rounds performed.
        attempts: u32,
    },

    /// Malformed collection identifier or request path.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The backing store failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The client token cannot be resolved against the change log.
    #[error("resync required: {0}")]
    ResyncRequired(String),

    /// No collection with this identifier.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Configuration rejected at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidIdentifier(_)
                | ServerError::ResyncRequired(_)
                | ServerError::CollectionNotFound(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::AdmissionTimeout { .. }
                | ServerError::StoreUnavailable(_)
                | ServerError::InvalidConfig(_)
                | ServerError::Io(_)
        )
    }
}
