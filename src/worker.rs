//! Worker assembly and main loop.
//!
//! [`WorkerBuilder`] connects the production collaborators (Postgres, the
//! provider over HTTPS, NATS). [`Worker::from_parts`] accepts any
//! implementations, which is how the end-to-end tests run it in memory.

use crate::bus::{MessageBus, NatsBus};
use crate::cache::ContentCache;
use crate::config::WorkerConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::VerificationEngine;
use crate::error::{Error, Result};
use crate::provider::{CompanyDataSource, ProviderClient};
use crate::recovery::{RecoverySweep, SweepStats};
use crate::storage::{ContentStore, PgStore, VerificationStore};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Builder for a production worker.
pub struct WorkerBuilder {
    config: WorkerConfig,
}

impl WorkerBuilder {
    /// Create a builder with the given configuration.
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    /// Connect every collaborator and create the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a connection fails.
    pub async fn build(self) -> Result<Worker> {
        info!("Building scoring-worker with config: {:?}", self.config);
        self.config.validate()?;

        let store = Arc::new(
            PgStore::connect(&self.config.database.url, self.config.database.max_connections)
                .await?,
        );
        store.ensure_schema().await?;

        let provider = Arc::new(ProviderClient::new(&self.config.provider)?);
        let bus = Arc::new(NatsBus::connect(&self.config.bus).await?);

        let parts = WorkerParts {
            store: store.clone(),
            content: store,
            source: provider,
            bus,
        };
        Ok(Worker::from_parts(self.config, parts))
    }
}

/// Collaborators a worker runs against.
pub struct WorkerParts {
    /// Verification lifecycle storage.
    pub store: Arc<dyn VerificationStore>,
    /// Content table behind the cache.
    pub content: Arc<dyn ContentStore>,
    /// Provider of company data.
    pub source: Arc<dyn CompanyDataSource>,
    /// Trigger intake and completion publishing.
    pub bus: Arc<dyn MessageBus>,
}

/// Cloneable handle that stops a running worker.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// An assembled worker.
pub struct Worker {
    config: WorkerConfig,
    instance_id: String,
    store: Arc<dyn VerificationStore>,
    bus: Arc<dyn MessageBus>,
    dispatcher: Dispatcher,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Worker {
    /// Assemble a worker from explicit collaborators.
    #[must_use]
    pub fn from_parts(config: WorkerConfig, parts: WorkerParts) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = VerificationEngine::new(
            parts.source,
            Arc::clone(&parts.store),
            ContentCache::new(parts.content),
        );
        let dispatcher = Dispatcher::new(
            engine,
            Arc::clone(&parts.store),
            Arc::clone(&parts.bus),
            config.worker_concurrency,
            shutdown_rx.clone(),
        );

        Self {
            config,
            instance_id: format!("scoring-worker-{}", uuid::Uuid::new_v4()),
            store: parts.store,
            bus: parts.bus,
            dispatcher,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// ID stamped on records this worker claims during recovery.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The dispatcher driving this worker's runs.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle that stops [`Worker::run`] from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Request the worker to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the recovery sweep and the intake loop until shutdown.
    ///
    /// In-flight runs are abandoned on shutdown and left for the next sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus subscription fails or ends unexpectedly.
    pub async fn run(&mut self) -> Result<()> {
        info!(instance_id = %self.instance_id, "Starting scoring-worker");
        // Fixed before intake opens so fresh triggers are never swept.
        let cutoff = RecoverySweep::cutoff_from(self.config.recovery.stale_after());
        let mut requests = self.bus.subscribe_requests().await?;

        let recovery = self.start_recovery(cutoff);
        let mut runs: Vec<JoinHandle<()>> = Vec::new();

        info!(
            concurrency = self.dispatcher.ceiling(),
            "Worker running, waiting for verification requests"
        );
        let outcome = loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break Ok(());
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    self.shutdown();
                    break Ok(());
                }
                request = requests.recv() => match request {
                    Some(request) => {
                        runs.retain(|run| !run.is_finished());
                        if let Some(run) = self.dispatcher.accept(request).await {
                            runs.push(run);
                        }
                    }
                    None => {
                        warn!("Request stream closed");
                        self.shutdown();
                        break Err(Error::Bus("request stream closed".into()));
                    }
                },
            }
        };

        if let Some(recovery) = recovery {
            match recovery.await {
                Ok((stats, recovered)) => {
                    log_sweep(&stats);
                    runs.extend(recovered);
                }
                Err(e) => warn!(error = %e, "Recovery task failed"),
            }
        }
        join_all(runs).await;
        if let Err(e) = self.bus.flush().await {
            error!(error = %e, "Failed to flush completions");
        }

        info!("Worker shutdown complete");
        outcome
    }

    fn start_recovery(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Option<JoinHandle<(SweepStats, Vec<JoinHandle<()>>)>> {
        if !self.config.recovery.enabled {
            info!("Recovery sweep disabled");
            return None;
        }
        let sweep = RecoverySweep::new(
            Arc::clone(&self.store),
            self.dispatcher.clone(),
            self.instance_id.clone(),
            self.shutdown_rx.clone(),
        )
        .with_cutoff(cutoff)
        .with_claim_retry_delay(self.config.recovery.claim_retry_delay());
        Some(tokio::spawn(sweep.run()))
    }
}

fn log_sweep(stats: &SweepStats) {
    if stats.claim_errors > 0 {
        warn!(
            claimed = stats.claimed,
            claim_errors = stats.claim_errors,
            "Recovery sweep hit claim errors"
        );
    }
}
