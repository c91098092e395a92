//! Per-verification state machine.
//!
//! ```text
//! CREATED ─► SEARCHING ─► search_company ─┬─ found ─► PROCESSING (+company_id)
//!                                         ├─ none ──► COMPANY_NOT_FOUND
//!                                         └─ error ─► ERROR
//!
//! PROCESSING ─► fetch every category concurrently
//!                  │  each branch: fetch ─► envelope ─► cache ─► link
//!                  ▼
//!              all branches done ─► COMPLETED
//! ```
//!
//! A run starts from whatever status the record is in, so the recovery sweep
//! resumes work through the same entry point as a fresh trigger.

use crate::cache::ContentCache;
use crate::catalog::{self, CategorySpec};
use crate::error::{Error, Result};
use crate::provider::CompanyDataSource;
use crate::storage::{StorageError, VerificationStore};
use crate::verification::{Verification, VerificationStatus};
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Wrapper persisted for every category, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Category name.
    #[serde(rename = "type")]
    pub category: String,
    /// Provider company ID.
    pub company_id: String,
    /// RFC 3339 UTC timestamp.
    pub processed_at: String,
    /// `completed` or `error`.
    pub status: String,
    /// Provider payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultEnvelope {
    /// Status of an envelope carrying data.
    pub const COMPLETED: &'static str = "completed";
    /// Status of an envelope carrying a failure.
    pub const ERROR: &'static str = "error";

    fn completed(category: &str, company_id: &str, data: serde_json::Value) -> Self {
        Self {
            category: category.to_string(),
            company_id: company_id.to_string(),
            processed_at: now_rfc3339(),
            status: Self::COMPLETED.to_string(),
            data: Some(data),
            error: None,
        }
    }

    fn failed(category: &str, company_id: &str, reason: String) -> Self {
        Self {
            category: category.to_string(),
            company_id: company_id.to_string(),
            processed_at: now_rfc3339(),
            status: Self::ERROR.to_string(),
            data: None,
            error: Some(reason),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Category counts of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorySummary {
    /// Categories stored with data.
    pub fetched: usize,
    /// Categories stored as error envelopes.
    pub failed: usize,
    /// Requested names not in the catalog.
    pub skipped: usize,
}

/// How a run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every category was attempted and the record is `COMPLETED`.
    Completed(CategorySummary),
    /// The record is `COMPANY_NOT_FOUND`.
    CompanyNotFound,
    /// The record was already terminal; nothing was done.
    AlreadyTerminal(VerificationStatus),
}

/// Drives one verification from its current status to a terminal one.
#[derive(Clone)]
pub struct VerificationEngine {
    source: Arc<dyn CompanyDataSource>,
    store: Arc<dyn VerificationStore>,
    cache: ContentCache,
}

impl VerificationEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        source: Arc<dyn CompanyDataSource>,
        store: Arc<dyn VerificationStore>,
        cache: ContentCache,
    ) -> Self {
        Self {
            source,
            store,
            cache,
        }
    }

    /// Run `verification` to completion.
    ///
    /// # Errors
    ///
    /// Returns the provider error when the company lookup fails (the record is
    /// moved to `ERROR`), or a storage error when state could not be
    /// persisted (the record is left for recovery).
    ///
    /// A run whose snapshot is stale, because another run finished the record
    /// first, ends as [`RunOutcome::AlreadyTerminal`].
    pub async fn process(&self, verification: &Verification) -> Result<RunOutcome> {
        info!(
            verification_id = %verification.id,
            inn = %verification.tax_id,
            status = %verification.status,
            "Processing verification"
        );
        match self.advance(verification).await {
            Err(Error::Storage(StorageError::InvalidTransition { from, to, .. }))
                if from.is_terminal() =>
            {
                info!(
                    verification_id = %verification.id,
                    status = %from,
                    attempted = %to,
                    "Verification finished elsewhere"
                );
                Ok(RunOutcome::AlreadyTerminal(from))
            }
            other => other,
        }
    }

    async fn advance(&self, verification: &Verification) -> Result<RunOutcome> {
        let id = verification.id.as_str();

        let company_id = match verification.status {
            status if status.is_terminal() => {
                debug!(verification_id = id, %status, "Verification already finished");
                return Ok(RunOutcome::AlreadyTerminal(status));
            }
            VerificationStatus::Created => {
                self.store
                    .transition(id, VerificationStatus::Searching)
                    .await?;
                match self.resolve_company(verification).await? {
                    Some(company_id) => company_id,
                    None => return Ok(RunOutcome::CompanyNotFound),
                }
            }
            VerificationStatus::Searching => match self.resolve_company(verification).await? {
                Some(company_id) => company_id,
                None => return Ok(RunOutcome::CompanyNotFound),
            },
            _ => verification.company_id.clone().ok_or_else(|| {
                StorageError::Corrupt(format!("verification {id} is processing without a company"))
            })?,
        };

        let summary = self
            .fetch_categories(id, &company_id, &verification.requested_categories)
            .await?;

        self.store
            .transition(id, VerificationStatus::Completed)
            .await?;
        info!(
            verification_id = id,
            fetched = summary.fetched,
            failed = summary.failed,
            skipped = summary.skipped,
            "Verification completed"
        );
        Ok(RunOutcome::Completed(summary))
    }

    /// Search for the company. `None` means not found and the record is
    /// already `COMPANY_NOT_FOUND`.
    async fn resolve_company(&self, verification: &Verification) -> Result<Option<String>> {
        let id = verification.id.as_str();
        match self.source.search_company(&verification.tax_id).await {
            Ok(company) => {
                self.store.mark_processing(id, &company.company_id).await?;
                info!(verification_id = id, company_id = %company.company_id, "Company resolved");
                Ok(Some(company.company_id))
            }
            Err(e) if e.is_not_found() => {
                warn!(verification_id = id, inn = %verification.tax_id, "Company not found");
                self.store
                    .transition(id, VerificationStatus::CompanyNotFound)
                    .await?;
                Ok(None)
            }
            Err(e) => {
                error!(verification_id = id, error = %e, "Company search failed");
                match self.store.transition(id, VerificationStatus::Error).await {
                    Err(store_err @ StorageError::InvalidTransition { from, .. })
                        if from.is_terminal() =>
                    {
                        Err(store_err.into())
                    }
                    Err(store_err) => {
                        error!(verification_id = id, error = %store_err, "Failed to record ERROR status");
                        Err(e.into())
                    }
                    Ok(()) => Err(e.into()),
                }
            }
        }
    }

    async fn fetch_categories(
        &self,
        id: &str,
        company_id: &str,
        requested: &[String],
    ) -> Result<CategorySummary> {
        let mut summary = CategorySummary::default();
        let mut specs: Vec<&'static CategorySpec> = Vec::new();
        for name in requested {
            match catalog::lookup(name) {
                Some(spec) if specs.iter().any(|s| s.name == spec.name) => {
                    debug!(verification_id = id, category = spec.name, "Duplicate category ignored");
                }
                Some(spec) => specs.push(spec),
                None => {
                    warn!(verification_id = id, category = %name, "Unknown category, skipping");
                    summary.skipped += 1;
                }
            }
        }

        let outcomes = join_all(
            specs
                .iter()
                .map(|spec| self.fetch_and_store(id, company_id, spec)),
        )
        .await;

        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(true) => summary.fetched += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Fetch one category and persist its envelope. `Ok(false)` means the
    /// fetch failed and an error envelope was stored instead.
    async fn fetch_and_store(
        &self,
        id: &str,
        company_id: &str,
        spec: &CategorySpec,
    ) -> Result<bool> {
        let (envelope, fetched) = match self.source.fetch_category(company_id, spec).await {
            Ok(data) => (ResultEnvelope::completed(spec.name, company_id, data), true),
            Err(e) => {
                warn!(verification_id = id, category = spec.name, error = %e, "Category fetch failed");
                (ResultEnvelope::failed(spec.name, company_id, e.to_string()), false)
            }
        };

        let bytes = serde_json::to_vec(&envelope)?;
        let digest = self.cache.store(&bytes).await.map_err(|e| {
            error!(verification_id = id, category = spec.name, error = %e, "Failed to cache result");
            Error::from(e)
        })?;
        self.store
            .upsert_result(id, spec.name, &digest.to_hex())
            .await?;
        debug!(verification_id = id, category = spec.name, digest = %digest, "Category stored");
        Ok(fetched)
    }
}
