//! In-process store with the same atomicity as the Postgres store.
//!
//! Every operation runs inside one mutex critical section, which stands in
//! for row locks: a claim marks the record before the lock is released, so a
//! second claimant never sees it as stale.

use super::{ContentStore, StorageError, StorageResult, VerificationStore};
use crate::verification::{CategoryResult, NewVerification, Verification, VerificationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct State {
    verifications: HashMap<String, Verification>,
    results: HashMap<(String, String), CategoryResult>,
    content: HashMap<String, Vec<u8>>,
    content_writes: u64,
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, bypassing the lifecycle rules.
    ///
    /// Used to stage records left behind by a previous process.
    pub fn seed(&self, verification: Verification) {
        self.inner
            .lock()
            .verifications
            .insert(verification.id.clone(), verification);
    }

    /// Number of physical content writes performed.
    #[must_use]
    pub fn content_writes(&self) -> u64 {
        self.inner.lock().content_writes
    }

    /// Number of distinct content entries.
    #[must_use]
    pub fn content_len(&self) -> usize {
        self.inner.lock().content.len()
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn create(&self, new: &NewVerification) -> StorageResult<Option<Verification>> {
        let mut state = self.inner.lock();
        if state.verifications.contains_key(&new.id) {
            return Ok(None);
        }
        let verification = Verification::created(new.clone(), Utc::now());
        state
            .verifications
            .insert(verification.id.clone(), verification.clone());
        Ok(Some(verification))
    }

    async fn get(&self, id: &str) -> StorageResult<Verification> {
        self.inner
            .lock()
            .verifications
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::verification_not_found(id))
    }

    async fn transition(&self, id: &str, to: VerificationStatus) -> StorageResult<()> {
        let mut state = self.inner.lock();
        let record = state
            .verifications
            .get_mut(id)
            .ok_or_else(|| StorageError::verification_not_found(id))?;
        if !record.status.can_transition_to(to) {
            return Err(StorageError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to,
            });
        }
        record.status = to;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_processing(&self, id: &str, company_id: &str) -> StorageResult<()> {
        let mut state = self.inner.lock();
        let record = state
            .verifications
            .get_mut(id)
            .ok_or_else(|| StorageError::verification_not_found(id))?;
        if record.status != VerificationStatus::Searching {
            return Err(StorageError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to: VerificationStatus::Processing,
            });
        }
        record.company_id = Some(company_id.to_string());
        record.status = VerificationStatus::Processing;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_result(&self, id: &str, category: &str, digest: &str) -> StorageResult<()> {
        let mut state = self.inner.lock();
        if !state.verifications.contains_key(id) {
            return Err(StorageError::verification_not_found(id));
        }
        state.results.insert(
            (id.to_string(), category.to_string()),
            CategoryResult {
                verification_id: id.to_string(),
                category: category.to_string(),
                digest: digest.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn results(&self, id: &str) -> StorageResult<Vec<CategoryResult>> {
        let state = self.inner.lock();
        let mut results: Vec<_> = state
            .results
            .values()
            .filter(|r| r.verification_id == id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(results)
    }

    async fn claim_stale(
        &self,
        claimant: &str,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Option<Verification>> {
        let mut state = self.inner.lock();
        let Some(id) = state
            .verifications
            .values()
            .filter(|v| !v.status.is_terminal() && v.updated_at < cutoff)
            .min_by_key(|v| v.updated_at)
            .map(|v| v.id.clone())
        else {
            return Ok(None);
        };

        let now = Utc::now();
        let record = state
            .verifications
            .get_mut(&id)
            .ok_or_else(|| StorageError::verification_not_found(&id))?;
        record.claimed_by = Some(claimant.to_string());
        record.claimed_at = Some(now);
        record.updated_at = now;
        Ok(Some(record.clone()))
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn contains(&self, digest: &str) -> StorageResult<bool> {
        Ok(self.inner.lock().content.contains_key(digest))
    }

    async fn insert_if_absent(&self, digest: &str, data: &[u8]) -> StorageResult<bool> {
        let mut state = self.inner.lock();
        if state.content.contains_key(digest) {
            return Ok(false);
        }
        state.content.insert(digest.to_string(), data.to_vec());
        state.content_writes += 1;
        Ok(true)
    }

    async fn load(&self, digest: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().content.get(digest).cloned())
    }
}
