//! HTTP transport used by the provider client.
//!
//! The client only needs "POST JSON, get status and body back", so that is the
//! whole trait. Production uses [`ReqwestTransport`]; tests script replies.

use super::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Header carrying the session token.
pub const ACCESS_KEY_HEADER: &str = "accessKey";

/// Raw HTTP reply.
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Bytes,
}

impl HttpReply {
    /// Build a reply.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body as lossy UTF-8, for error messages.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends JSON POST requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url`, adding the `accessKey` header when given.
    ///
    /// Non-2xx statuses are replies, not errors.
    async fn post_json(
        &self,
        url: &str,
        access_key: Option<&str>,
        body: Bytes,
    ) -> Result<HttpReply, TransportError>;
}

/// [`Transport`] over a `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        access_key: Option<&str>,
        body: Bytes,
    ) -> Result<HttpReply, TransportError> {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = access_key {
            request = request.header(ACCESS_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpReply { status, body })
    }
}
