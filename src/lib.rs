//! # scoring-worker
//!
//! Background worker that verifies companies against an external
//! credit-information provider.
//!
//! A `verification.create` message names a company tax ID and the data
//! categories wanted. The worker resolves the company, fetches every category
//! concurrently, stores each payload in a content-addressed cache linked to the
//! verification, and publishes `verification.completed` when done.
//!
//! ```text
//! bus ──► Dispatcher ──► VerificationEngine ──► ProviderClient (HTTPS)
//!            ▲                   │
//!            │                   ├──► ContentCache ──► ContentStore
//!     RecoverySweep              └──► VerificationStore
//!            │                                    │
//!            └──────── claim stale rows ◄─────────┘
//! ```
//!
//! Verifications survive restarts: anything left in a non-terminal status is
//! claimed by the [`recovery::RecoverySweep`] on the next startup and run again
//! through the same path.

pub mod bus;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod provider;
pub mod recovery;
pub mod storage;
pub mod verification;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use cache::{ContentCache, ContentDigest};
pub use config::WorkerConfig;
pub use dispatcher::Dispatcher;
pub use engine::{RunOutcome, VerificationEngine};
pub use error::{Error, Result};
pub use provider::{ProviderClient, ProviderError};
pub use recovery::RecoverySweep;
pub use verification::{Verification, VerificationStatus};
pub use worker::{Worker, WorkerBuilder};
