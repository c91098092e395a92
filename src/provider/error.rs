//! Provider access errors.

use thiserror::Error;

/// Errors from the provider access client.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials rejected or the auth response carried an error.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The search returned no company for the tax ID.
    #[error("company not found")]
    CompanyNotFound {
        /// Tax ID that was searched.
        tax_id: String,
    },

    /// Every attempt failed.
    #[error("all {attempts} attempts failed for {operation}. Errors: [{}]", .failures.join("; "))]
    Exhausted {
        /// Operation name (endpoint or `search`).
        operation: String,
        /// Number of counted attempts.
        attempts: u32,
        /// One message per failure, in order.
        failures: Vec<String>,
    },

    /// The client is misconfigured.
    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    /// Whether this is the non-retryable "no such company" outcome.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::CompanyNotFound { .. })
    }
}

/// Transport-level failure (connection, timeout, body read).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self(e.to_string())
    }
}
