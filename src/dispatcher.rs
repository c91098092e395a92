//! Bounded-concurrency driver for verification runs.
//!
//! Every trigger, fresh or recovered, becomes one task. The task waits for a
//! slot, runs the engine, releases the slot and publishes the completion.
//! Slots are semaphore permits owned by the task, so they are returned on
//! every exit path including panics and cancellation.

use crate::bus::{MessageBus, VerificationCompleted, VerificationRequest};
use crate::engine::{RunOutcome, VerificationEngine};
use crate::provider::ProviderError;
use crate::storage::VerificationStore;
use crate::verification::{NewVerification, Verification};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default global ceiling on concurrently running verifications.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Resolve once `shutdown` reads `true`. Never resolves if the sender is gone
/// without having signalled.
pub(crate) async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Spawns verification runs under a global concurrency ceiling.
#[derive(Clone)]
pub struct Dispatcher {
    engine: VerificationEngine,
    store: Arc<dyn VerificationStore>,
    bus: Arc<dyn MessageBus>,
    slots: Arc<Semaphore>,
    ceiling: usize,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    /// Create a dispatcher allowing `concurrency` runs at once (at least one).
    #[must_use]
    pub fn new(
        engine: VerificationEngine,
        store: Arc<dyn VerificationStore>,
        bus: Arc<dyn MessageBus>,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let ceiling = concurrency.max(1);
        Self {
            engine,
            store,
            bus,
            slots: Arc::new(Semaphore::new(ceiling)),
            ceiling,
            shutdown,
        }
    }

    /// Configured ceiling.
    #[must_use]
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Slots not currently held by a run.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Handle a fresh trigger: create the record and dispatch it.
    ///
    /// Returns `None` when nothing was dispatched: the ID already exists
    /// (redelivery) or the record could not be created, in which case an
    /// `ERROR` completion is published.
    pub async fn accept(&self, request: VerificationRequest) -> Option<JoinHandle<()>> {
        let id = request.verification_id.clone();
        let new = NewVerification::from(request);

        match self.store.create(&new).await {
            Ok(Some(verification)) => {
                info!(verification_id = %id, inn = %verification.tax_id, "Verification created");
                Some(self.dispatch(verification))
            }
            Ok(None) => {
                info!(verification_id = %id, "Verification already exists, ignoring trigger");
                None
            }
            Err(e) => {
                error!(verification_id = %id, error = %e, "Failed to create verification");
                let event = VerificationCompleted::failed(&id, e.to_string());
                publish(self.bus.as_ref(), &event).await;
                None
            }
        }
    }

    /// Run `verification` in its own task once a slot is free.
    #[must_use = "the handle is the only way to await the run"]
    pub fn dispatch(&self, verification: Verification) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let bus = Arc::clone(&self.bus);
        let slots = Arc::clone(&self.slots);
        let mut shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let id = verification.id.clone();

            let permit = tokio::select! {
                biased;
                () = shutdown_signalled(&mut shutdown) => {
                    info!(verification_id = %id, "Shutdown before start, leaving for recovery");
                    return;
                }
                permit = slots.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            debug!(verification_id = %id, "Slot acquired");

            let result = tokio::select! {
                biased;
                () = shutdown_signalled(&mut shutdown) => {
                    info!(verification_id = %id, "Shutdown during run, leaving for recovery");
                    return;
                }
                result = engine.process(&verification) => result,
            };
            drop(permit);

            let event = match result {
                Ok(RunOutcome::Completed(_)) => VerificationCompleted::completed(&id),
                Ok(RunOutcome::CompanyNotFound) => {
                    let reason = ProviderError::CompanyNotFound {
                        tax_id: verification.tax_id.clone(),
                    };
                    VerificationCompleted::failed(&id, reason.to_string())
                }
                Ok(RunOutcome::AlreadyTerminal(status)) => {
                    debug!(verification_id = %id, %status, "Nothing to report");
                    return;
                }
                Err(e) => {
                    warn!(verification_id = %id, error = %e, "Verification failed");
                    VerificationCompleted::failed(&id, e.to_string())
                }
            };
            publish(bus.as_ref(), &event).await;
        })
    }
}

async fn publish(bus: &dyn MessageBus, event: &VerificationCompleted) {
    if let Err(e) = bus.publish_completed(event).await {
        error!(verification_id = %event.verification_id, error = %e, "Failed to publish completion");
    }
}
