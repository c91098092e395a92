//! Content-addressed cache for fetched payloads.
//!
//! Payloads are keyed by the SHA-256 of their exact bytes, so identical
//! payloads (repeat lookups of the same company) are stored once and shared by
//! every category link that points at them.
//!
//! ```text
//! store(bytes)
//!      │
//!      ▼
//! digest = SHA-256(bytes)
//!      │
//!      ▼
//! ┌─────────────────────┐
//! │ Check LRU of known  │── HIT ──► return digest
//! └─────────┬───────────┘
//!          MISS
//!           ▼
//! ┌─────────────────────┐
//! │ store.contains()    │── YES ──► remember, return digest
//! └─────────┬───────────┘
//!           NO
//!           ▼
//!  store.insert_if_absent() ──► remember, return digest
//! ```

use crate::storage::{ContentStore, StorageError, StorageResult};
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Default number of digests remembered as already stored.
const DEFAULT_KNOWN_CAPACITY: usize = 10_000;

/// SHA-256 digest identifying a cached payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Hash `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form (64 characters), as stored in the database.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; 32];
        hex::decode_to_slice(s, &mut raw)
            .map_err(|e| StorageError::Corrupt(format!("bad digest {s:?}: {e}")))?;
        Ok(Self(raw))
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Stores answered from the in-process set of known digests.
    pub hits: u64,
    /// Stores that had to consult the backing store.
    pub misses: u64,
    /// Stores that physically wrote new content.
    pub writes: u64,
}

impl CacheStats {
    /// Share of stores that turned out to be duplicates, as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn dedup_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            ((total - self.writes) as f64 / total as f64) * 100.0
        }
    }
}

/// Deduplicating front for a [`ContentStore`].
#[derive(Clone)]
pub struct ContentCache {
    store: Arc<dyn ContentStore>,
    known: Arc<Mutex<LruCache<ContentDigest, ()>>>,
    stats: Arc<Mutex<CacheStats>>,
}

impl ContentCache {
    /// Create a cache over `store` with the default known-digest capacity.
    #[must_use]
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self::with_capacity(store, DEFAULT_KNOWN_CAPACITY)
    }

    /// Create a cache remembering up to `capacity` stored digests.
    #[must_use]
    pub fn with_capacity(store: Arc<dyn ContentStore>, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            known: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Digest of `bytes`. Pure and deterministic.
    #[must_use]
    pub fn compute_hash(bytes: &[u8]) -> ContentDigest {
        ContentDigest::of(bytes)
    }

    /// Store `bytes` unless identical content is already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub async fn store(&self, bytes: &[u8]) -> StorageResult<ContentDigest> {
        let digest = Self::compute_hash(bytes);

        if self.known.lock().get(&digest).is_some() {
            self.stats.lock().hits += 1;
            debug!(digest = %digest, "Content already known");
            return Ok(digest);
        }
        self.stats.lock().misses += 1;

        let key = digest.to_hex();
        if self.store.contains(&key).await? {
            debug!(digest = %digest, "Content already stored");
        } else if self.store.insert_if_absent(&key, bytes).await? {
            self.stats.lock().writes += 1;
            debug!(digest = %digest, bytes = bytes.len(), "Content stored");
        }

        self.known.lock().put(digest, ());
        Ok(digest)
    }

    /// Load content by digest.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is stored under `digest`.
    pub async fn fetch(&self, digest: &ContentDigest) -> StorageResult<Vec<u8>> {
        let key = digest.to_hex();
        self.store
            .load(&key)
            .await?
            .ok_or(StorageError::NotFound {
                entity: "content",
                id: key,
            })
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}
