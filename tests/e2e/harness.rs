//! Test harness that runs a complete worker in process.
//!
//! The `TestHarness` wires a [`Worker`] to an in-memory store, the channel
//! bus and a [`MockProvider`], then drives it through the bus the same way
//! production traffic would.

use super::mock_provider::MockProvider;
use scoring_worker::bus::{ChannelBus, VerificationCompleted, VerificationRequest};
use scoring_worker::config::WorkerConfig;
use scoring_worker::engine::ResultEnvelope;
use scoring_worker::storage::{MemoryStore, VerificationStore};
use scoring_worker::worker::{ShutdownHandle, WorkerParts};
use scoring_worker::{ContentCache, ContentDigest, ProviderClient, Verification, Worker};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// How long to wait for a completion before failing.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for test harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Worker error
    #[error("Worker error: {0}")]
    Worker(#[from] scoring_worker::Error),

    /// No completion arrived in time
    #[error("Timed out waiting for a completion")]
    Timeout,

    /// The worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Join(String),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// A running worker plus handles on everything around it.
pub struct TestHarness {
    /// Store the worker persists into.
    pub store: MemoryStore,
    /// Bus the worker listens on.
    pub bus: Arc<ChannelBus>,
    /// Simulated provider.
    pub provider: Arc<MockProvider>,
    completions: broadcast::Receiver<VerificationCompleted>,
    shutdown: ShutdownHandle,
    task: JoinHandle<scoring_worker::Result<()>>,
}

impl TestHarness {
    /// Worker configuration used by the harness.
    #[must_use]
    pub fn config() -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.worker_concurrency = 4;
        config.provider.base_url = "https://provider.test".to_string();
        config.provider.username = "svc".to_string();
        // base64("secret")
        config.provider.password = "c2VjcmV0".to_string();
        config.provider.retry_attempts = 1;
        config.provider.retry_delay_ms = 1;
        config
    }

    /// Start a worker with an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider client cannot be created.
    pub async fn setup() -> Result<Self> {
        Self::setup_with(MemoryStore::new(), Arc::new(MockProvider::new())).await
    }

    /// Start a worker over a pre-populated store and a prepared provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider client cannot be created.
    pub async fn setup_with(store: MemoryStore, provider: Arc<MockProvider>) -> Result<Self> {
        let config = Self::config();
        let client = ProviderClient::with_transport(&config.provider, provider.clone())
            .map_err(scoring_worker::Error::from)?;
        let bus = Arc::new(ChannelBus::new());
        let completions = bus.completions();

        let parts = WorkerParts {
            store: Arc::new(store.clone()),
            content: Arc::new(store.clone()),
            source: Arc::new(client),
            bus: bus.clone(),
        };
        let mut worker = Worker::from_parts(config, parts);
        let shutdown = worker.shutdown_handle();
        info!(instance_id = worker.instance_id(), "Starting test worker");
        let task = tokio::spawn(async move { worker.run().await });

        Ok(Self {
            store,
            bus,
            provider,
            completions,
            shutdown,
            task,
        })
    }

    /// Publish a trigger.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is no longer listening.
    pub async fn trigger(&self, id: &str, inn: &str, categories: &[&str]) -> Result<()> {
        let request = VerificationRequest {
            verification_id: id.to_string(),
            inn: inn.to_string(),
            requested_types: categories.iter().map(ToString::to_string).collect(),
            author_email: "analyst@example.com".to_string(),
        };
        self.bus.send_request(request).await?;
        Ok(())
    }

    /// Wait for the next completion event.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Timeout`] if none arrives in time.
    pub async fn next_completion(&mut self) -> Result<VerificationCompleted> {
        tokio::time::timeout(COMPLETION_TIMEOUT, self.completions.recv())
            .await
            .map_err(|_| HarnessError::Timeout)?
            .map_err(|_| HarnessError::Timeout)
    }

    /// Whether no further completion arrives within `window`.
    pub async fn stays_quiet(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.completions.recv())
            .await
            .is_err()
    }

    /// Current state of a verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the verification does not exist.
    pub async fn verification(&self, id: &str) -> Result<Verification> {
        Ok(self.store.get(id).await.map_err(scoring_worker::Error::from)?)
    }

    /// Decoded result envelopes of a verification, by category.
    ///
    /// # Errors
    ///
    /// Returns an error if a link or its content cannot be read.
    pub async fn envelopes(&self, id: &str) -> Result<HashMap<String, ResultEnvelope>> {
        let cache = ContentCache::new(Arc::new(self.store.clone()));
        let mut out = HashMap::new();
        for result in self
            .store
            .results(id)
            .await
            .map_err(scoring_worker::Error::from)?
        {
            let digest: ContentDigest = result
                .digest
                .parse()
                .map_err(scoring_worker::Error::from)?;
            let bytes = cache
                .fetch(&digest)
                .await
                .map_err(scoring_worker::Error::from)?;
            let envelope = serde_json::from_slice(&bytes).map_err(scoring_worker::Error::from)?;
            out.insert(result.category, envelope);
        }
        Ok(out)
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns the worker's own error, or an error if its task failed.
    pub async fn teardown(self) -> Result<()> {
        self.shutdown.shutdown();
        self.task
            .await
            .map_err(|e| HarnessError::Join(e.to_string()))??;
        Ok(())
    }
}
