//! Error types for scoring-worker.

use crate::provider::ProviderError;
use crate::storage::StorageError;
use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Provider access failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Persistence failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Message bus failure.
    #[error("message bus error: {0}")]
    Bus(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
