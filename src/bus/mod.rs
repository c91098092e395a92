//! Message bus: inbound triggers and outbound completion events.
//!
//! Subjects and payloads:
//!
//! | Subject                  | Direction | Payload                    |
//! |--------------------------|-----------|----------------------------|
//! | `verification.create`    | in        | [`VerificationRequest`]    |
//! | `verification.completed` | out       | [`VerificationCompleted`]  |
//!
//! [`NatsBus`] talks to a NATS server. [`ChannelBus`] keeps everything in
//! process and is what the tests drive.

mod channel;
mod nats;

pub use channel::ChannelBus;
pub use nats::NatsBus;

use crate::error::Result;
use crate::verification::NewVerification;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Capacity of the intake channel between a bus and the worker.
pub const INTAKE_CAPACITY: usize = 256;

/// "Start verification" trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// Caller-supplied verification ID.
    pub verification_id: String,
    /// Company tax ID.
    pub inn: String,
    /// Requested category names.
    #[serde(default)]
    pub requested_types: Vec<String>,
    /// Requester contact.
    #[serde(default)]
    pub author_email: String,
}

impl From<VerificationRequest> for NewVerification {
    fn from(request: VerificationRequest) -> Self {
        Self {
            id: request.verification_id,
            tax_id: request.inn,
            requested_categories: request.requested_types,
            author_email: request.author_email,
        }
    }
}

/// Final status reported on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    /// Every requested category was attempted.
    Completed,
    /// The run failed; see `error`.
    Error,
}

/// Completion event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCompleted {
    /// Verification ID.
    pub verification_id: String,
    /// Outcome.
    pub status: CompletionStatus,
    /// Failure detail, empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl VerificationCompleted {
    /// Successful completion.
    #[must_use]
    pub fn completed(verification_id: impl Into<String>) -> Self {
        Self {
            verification_id: verification_id.into(),
            status: CompletionStatus::Completed,
            error: String::new(),
        }
    }

    /// Failed completion.
    #[must_use]
    pub fn failed(verification_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            verification_id: verification_id.into(),
            status: CompletionStatus::Error,
            error: error.into(),
        }
    }
}

/// Transport for triggers and completion events.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Start receiving triggers. Malformed messages never reach the receiver.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    async fn subscribe_requests(&self) -> Result<mpsc::Receiver<VerificationRequest>>;

    /// Publish a completion event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be sent.
    async fn publish_completed(&self, event: &VerificationCompleted) -> Result<()>;

    /// Wait until every published event has been handed to the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered events could not be sent.
    async fn flush(&self) -> Result<()>;
}

/// Decode a trigger payload, logging and dropping anything malformed.
#[must_use]
pub fn decode_request(payload: &[u8]) -> Option<VerificationRequest> {
    match serde_json::from_slice::<VerificationRequest>(payload) {
        Ok(request) if request.verification_id.is_empty() || request.inn.is_empty() => {
            warn!("Dropping trigger without verification_id or inn");
            None
        }
        Ok(request) => Some(request),
        Err(e) => {
            warn!(error = %e, "Dropping malformed trigger");
            None
        }
    }
}
