//! NATS-backed bus.

use super::{decode_request, MessageBus, VerificationCompleted, VerificationRequest, INTAKE_CAPACITY};
use crate::config::BusConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bus over a NATS connection.
pub struct NatsBus {
    client: async_nats::Client,
    request_subject: String,
    completion_subject: String,
}

impl NatsBus {
    /// Connect to the server named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(config: &BusConfig) -> Result<Self> {
        info!(url = %config.url, "Connecting to NATS");
        let client = async_nats::connect(config.url.as_str())
            .await
            .map_err(|e| Error::Bus(format!("failed to connect to {}: {e}", config.url)))?;
        Ok(Self {
            client,
            request_subject: config.request_subject.clone(),
            completion_subject: config.completion_subject.clone(),
        })
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn subscribe_requests(&self) -> Result<mpsc::Receiver<VerificationRequest>> {
        let mut subscriber = self
            .client
            .subscribe(self.request_subject.clone())
            .await
            .map_err(|e| Error::Bus(format!("failed to subscribe: {e}")))?;
        info!(subject = %self.request_subject, "Subscribed to verification requests");

        let (tx, rx) = mpsc::channel(INTAKE_CAPACITY);
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                if let Some(request) = decode_request(&message.payload) {
                    debug!(verification_id = %request.verification_id, "Received trigger");
                    if tx.send(request).await.is_err() {
                        break;
                    }
                }
            }
            warn!("Request subscription ended");
        });
        Ok(rx)
    }

    async fn publish_completed(&self, event: &VerificationCompleted) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(self.completion_subject.clone(), payload.into())
            .await
            .map_err(|e| Error::Bus(format!("failed to publish completion: {e}")))?;
        debug!(verification_id = %event.verification_id, "Published completion");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| Error::Bus(format!("failed to flush: {e}")))
    }
}
