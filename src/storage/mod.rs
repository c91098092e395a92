//! Persistence for verifications, category links and cached content.
//!
//! Two traits split the schema along its consumers:
//!
//! - [`VerificationStore`]: lifecycle rows and category links, used by the
//!   engine, the dispatcher and the recovery sweep.
//! - [`ContentStore`]: the write-once content table behind
//!   [`crate::cache::ContentCache`].
//!
//! [`PgStore`] implements both against Postgres; [`MemoryStore`] implements
//! both in process with the same atomicity guarantees.

mod error;
mod memory;
mod postgres;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::verification::{CategoryResult, NewVerification, Verification, VerificationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable verification lifecycle state.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Insert a `CREATED` record unless one with the same ID exists.
    ///
    /// Returns `None` when the ID is already taken.
    async fn create(&self, new: &NewVerification) -> StorageResult<Option<Verification>>;

    /// Load a verification by ID.
    async fn get(&self, id: &str) -> StorageResult<Verification>;

    /// Move to `to`, failing unless the current status is a legal predecessor.
    async fn transition(&self, id: &str, to: VerificationStatus) -> StorageResult<()>;

    /// Record the resolved company and move `SEARCHING → PROCESSING` atomically.
    async fn mark_processing(&self, id: &str, company_id: &str) -> StorageResult<()>;

    /// Link `category` to `digest`, replacing any previous link.
    async fn upsert_result(&self, id: &str, category: &str, digest: &str) -> StorageResult<()>;

    /// All category links of a verification.
    async fn results(&self, id: &str) -> StorageResult<Vec<CategoryResult>>;

    /// Atomically claim one non-terminal verification last updated before
    /// `cutoff`, stamping it with `claimant`.
    ///
    /// Concurrent claimants never receive the same record.
    async fn claim_stale(
        &self,
        claimant: &str,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Option<Verification>>;
}

/// Write-once content table keyed by hex digest.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Whether content with this digest exists.
    async fn contains(&self, digest: &str) -> StorageResult<bool>;

    /// Insert unless present. Returns `true` if this call wrote the row.
    ///
    /// Racing writers of the same digest must all succeed.
    async fn insert_if_absent(&self, digest: &str, data: &[u8]) -> StorageResult<bool>;

    /// Load content by digest.
    async fn load(&self, digest: &str) -> StorageResult<Option<Vec<u8>>>;
}
