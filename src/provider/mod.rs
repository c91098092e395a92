//! Access to the credit-information provider.
//!
//! ```text
//! search_company / fetch_category
//!          │
//!          ▼
//!   ensure session ──(none)──► authenticate (under session lock)
//!          │
//!          ▼
//!   POST with accessKey ──► 2xx ──► decode ──► result
//!          │
//!          ├── 401 (first) ──► refresh session, retry at once
//!          └── other failure ──► sleep retry_delay, next attempt
//!                                        │
//!                                   budget spent ──► Exhausted
//! ```

mod client;
mod error;
mod transport;
mod types;

pub use client::{ProviderClient, Session};
pub use error::{ProviderError, TransportError};
pub use transport::{HttpReply, ReqwestTransport, Transport, ACCESS_KEY_HEADER};
pub use types::{CompanyIdentity, FoundationDate};

use crate::catalog::CategorySpec;
use async_trait::async_trait;

/// Source of company data used by the verification engine.
#[async_trait]
pub trait CompanyDataSource: Send + Sync {
    /// Resolve a tax ID to a company.
    async fn search_company(&self, tax_id: &str) -> Result<CompanyIdentity, ProviderError>;

    /// Fetch one category of data for a resolved company.
    async fn fetch_category(
        &self,
        company_id: &str,
        category: &CategorySpec,
    ) -> Result<serde_json::Value, ProviderError>;
}
