//! Persistence errors.

use crate::verification::VerificationStatus;
use thiserror::Error;

/// Persistence layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Record key.
        id: String,
    },

    /// Status change rejected by the lifecycle rules.
    #[error("verification {id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        /// Verification ID.
        id: String,
        /// Status found in the store.
        from: VerificationStatus,
        /// Requested status.
        to: VerificationStatus,
    },

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Result alias for persistence operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Build a `NotFound` for a verification ID.
    #[must_use]
    pub fn verification_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "verification",
            id: id.to_string(),
        }
    }

    /// Whether this is a `NotFound` error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
