//! Startup sweep that picks up verifications a previous process left behind.
//!
//! ```text
//! cutoff = now - stale_after
//! loop {
//!     claim_stale(instance_id, cutoff)
//!        ├─ Some(v) ─► dispatcher.dispatch(v)
//!        ├─ None ────► done
//!        └─ Err ─────► log, sleep claim_retry_delay, try again
//! }
//! ```
//!
//! A claim stamps `updated_at`, which moves the record past the cutoff, so the
//! same sweep never sees it twice and a concurrent instance skips it. The
//! worker fixes the cutoff with [`RecoverySweep::with_cutoff`] before it
//! subscribes to triggers, so records created by live intake are never
//! considered stale.

use crate::dispatcher::{shutdown_signalled, Dispatcher};
use crate::storage::VerificationStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Totals for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Records claimed and dispatched.
    pub claimed: usize,
    /// Claim attempts that failed.
    pub claim_errors: usize,
}

/// Claims and re-dispatches stale verifications.
pub struct RecoverySweep {
    store: Arc<dyn VerificationStore>,
    dispatcher: Dispatcher,
    instance_id: String,
    stale_after: Duration,
    cutoff: Option<DateTime<Utc>>,
    claim_retry_delay: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RecoverySweep {
    /// Create a sweep claiming on behalf of `instance_id`.
    #[must_use]
    pub fn new(
        store: Arc<dyn VerificationStore>,
        dispatcher: Dispatcher,
        instance_id: impl Into<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            instance_id: instance_id.into(),
            stale_after: Duration::ZERO,
            cutoff: None,
            claim_retry_delay: Duration::from_secs(5),
            shutdown,
        }
    }

    /// Only claim records untouched for at least `stale_after`.
    #[must_use]
    pub const fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Claim only records last updated before `cutoff`. Overrides
    /// `stale_after`.
    #[must_use]
    pub fn with_cutoff(mut self, cutoff: DateTime<Utc>) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    /// Cutoff for a sweep starting now: `now - stale_after`.
    #[must_use]
    pub fn cutoff_from(stale_after: Duration) -> DateTime<Utc> {
        let stale_after =
            chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::zero());
        Utc::now() - stale_after
    }

    /// Wait this long after a failed claim.
    #[must_use]
    pub const fn with_claim_retry_delay(mut self, delay: Duration) -> Self {
        self.claim_retry_delay = delay;
        self
    }

    /// Instance ID stamped on claimed records.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Claim until nothing stale remains or shutdown is signalled.
    ///
    /// Returns the dispatched runs alongside the totals; callers that need the
    /// runs finished await the handles.
    pub async fn run(mut self) -> (SweepStats, Vec<JoinHandle<()>>) {
        let cutoff = self
            .cutoff
            .unwrap_or_else(|| Self::cutoff_from(self.stale_after));
        info!(instance_id = %self.instance_id, %cutoff, "Starting recovery sweep");

        let mut stats = SweepStats::default();
        let mut runs = Vec::new();

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.store.claim_stale(&self.instance_id, cutoff).await {
                Ok(Some(verification)) => {
                    info!(
                        verification_id = %verification.id,
                        status = %verification.status,
                        "Recovered stale verification"
                    );
                    stats.claimed += 1;
                    runs.push(self.dispatcher.dispatch(verification));
                }
                Ok(None) => break,
                Err(e) => {
                    stats.claim_errors += 1;
                    error!(error = %e, "Failed to claim stale verification");
                    tokio::select! {
                        () = tokio::time::sleep(self.claim_retry_delay) => {}
                        () = shutdown_signalled(&mut self.shutdown) => break,
                    }
                }
            }
        }

        info!(
            claimed = stats.claimed,
            claim_errors = stats.claim_errors,
            "Recovery sweep finished"
        );
        (stats, runs)
    }
}
