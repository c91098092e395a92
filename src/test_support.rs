//! Shared fakes for unit tests.

use crate::catalog::CategorySpec;
use crate::provider::{CompanyDataSource, CompanyIdentity, ProviderError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Provider that knows every tax ID except `unknown`, answers after `delay`
/// and tracks how many calls overlap.
#[derive(Default)]
pub(crate) struct GaugedSource {
    pub delay: Duration,
    pub unknown: Option<&'static str>,
    pub searches: AtomicUsize,
    pub fetches: AtomicUsize,
    pub current: AtomicUsize,
    pub peak: AtomicUsize,
}

impl GaugedSource {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    async fn busy(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompanyDataSource for GaugedSource {
    async fn search_company(&self, tax_id: &str) -> Result<CompanyIdentity, ProviderError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        if self.unknown == Some(tax_id) {
            return Err(ProviderError::CompanyNotFound {
                tax_id: tax_id.to_string(),
            });
        }
        Ok(CompanyIdentity {
            company_id: format!("company-{tax_id}"),
            tax_number: tax_id.to_string(),
            ..CompanyIdentity::default()
        })
    }

    async fn fetch_category(
        &self,
        company_id: &str,
        category: &CategorySpec,
    ) -> Result<serde_json::Value, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "companyId": company_id, "category": category.name }))
    }
}
