//! In-process bus.

use super::{decode_request, MessageBus, VerificationCompleted, VerificationRequest, INTAKE_CAPACITY};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc};

/// Capacity of the completion broadcast.
const COMPLETION_CAPACITY: usize = 256;

/// Bus backed by tokio channels.
///
/// Triggers go through an mpsc channel with a single subscriber; completions
/// are broadcast to every [`ChannelBus::completions`] receiver.
pub struct ChannelBus {
    requests_tx: mpsc::Sender<VerificationRequest>,
    requests_rx: Mutex<Option<mpsc::Receiver<VerificationRequest>>>,
    completed_tx: broadcast::Sender<VerificationCompleted>,
    flushes: AtomicUsize,
}

impl ChannelBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(INTAKE_CAPACITY);
        let (completed_tx, _) = broadcast::channel(COMPLETION_CAPACITY);
        Self {
            requests_tx,
            requests_rx: Mutex::new(Some(requests_rx)),
            completed_tx,
            flushes: AtomicUsize::new(0),
        }
    }

    /// Deliver a trigger.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriber has gone away.
    pub async fn send_request(&self, request: VerificationRequest) -> Result<()> {
        self.requests_tx
            .send(request)
            .await
            .map_err(|_| Error::Bus("request channel closed".into()))
    }

    /// Deliver a raw trigger payload. Returns `false` if it was dropped as
    /// malformed.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriber has gone away.
    pub async fn send_raw(&self, payload: &[u8]) -> Result<bool> {
        match decode_request(payload) {
            Some(request) => self.send_request(request).await.map(|()| true),
            None => Ok(false),
        }
    }

    /// Number of times the bus was flushed.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Receive every completion published from now on.
    #[must_use]
    pub fn completions(&self) -> broadcast::Receiver<VerificationCompleted> {
        self.completed_tx.subscribe()
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for ChannelBus {
    async fn subscribe_requests(&self) -> Result<mpsc::Receiver<VerificationRequest>> {
        self.requests_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Bus("requests already subscribed".into()))
    }

    async fn publish_completed(&self, event: &VerificationCompleted) -> Result<()> {
        // No receivers is not an error; nobody is listening yet.
        let _ = self.completed_tx.send(event.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // Broadcast sends are immediate; only the call is recorded.
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
