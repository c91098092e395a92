//! Authenticated, retrying client for the provider API.

use super::error::{ProviderError, TransportError};
use super::transport::{HttpReply, ReqwestTransport, Transport};
use super::types::{
    AuthRequest, AuthResponse, CompanyIdentity, CompanyInformationRequest,
    CompanyInformationResponse, SearchCompanyParameters, SearchCompanyRequest,
    SearchCompanyResponse,
};
use super::CompanyDataSource;
use crate::catalog::CategorySpec;
use crate::config::ProviderConfig;
use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// HTTP 401.
const UNAUTHORIZED: u16 = 401;

/// A bearer credential and the generation it was issued in.
#[derive(Debug, Clone)]
pub struct Session {
    /// Value sent in the `accessKey` header.
    pub token: Arc<str>,
    /// Incremented on every successful authentication.
    pub generation: u64,
}

#[derive(Default)]
struct SessionSlot {
    token: Option<Arc<str>>,
    generation: u64,
}

impl SessionSlot {
    fn current(&self) -> Option<Session> {
        self.token.as_ref().map(|token| Session {
            token: Arc::clone(token),
            generation: self.generation,
        })
    }

    fn install(&mut self, token: Arc<str>) -> Session {
        self.generation += 1;
        self.token = Some(Arc::clone(&token));
        Session {
            token,
            generation: self.generation,
        }
    }
}

/// How a successful HTTP reply is interpreted by one operation.
enum Verdict<T> {
    /// Usable result.
    Done(T),
    /// Counted as a failed attempt.
    Retry(String),
    /// Stop retrying.
    Fail(ProviderError),
}

/// Client settings resolved from [`ProviderConfig`].
#[derive(Clone)]
struct Settings {
    base_url: String,
    username: String,
    password: String,
    api_version: String,
    language: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

/// Client for the credit-information provider.
///
/// All concurrent calls share one session. Authentication runs while holding
/// the session lock, so any number of simultaneous 401 responses against the
/// same session generation trigger a single refresh.
pub struct ProviderClient {
    transport: Arc<dyn Transport>,
    settings: Settings,
    session: Mutex<SessionSlot>,
}

impl ProviderClient {
    /// Create a client using HTTPS via `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is incomplete or the password is
    /// not valid base64.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let transport = ReqwestTransport::new(Duration::from_secs(config.timeout_secs))
            .map_err(|e| ProviderError::Config(format!("HTTP client: {e}")))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over an arbitrary transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is incomplete or the password is
    /// not valid base64.
    pub fn with_transport(
        config: &ProviderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ProviderError> {
        info!(
            base_url = %config.base_url,
            username = %config.username,
            password_set = !config.password.is_empty(),
            timeout_secs = config.timeout_secs,
            "Creating provider client"
        );

        if config.base_url.is_empty() {
            return Err(ProviderError::Config("base_url is empty".into()));
        }
        if config.username.is_empty() {
            return Err(ProviderError::Config("username is empty".into()));
        }
        if config.password.is_empty() {
            return Err(ProviderError::Config("password is empty".into()));
        }
        let password = base64::engine::general_purpose::STANDARD
            .decode(config.password.trim())
            .map_err(|e| ProviderError::Config(format!("password is not base64: {e}")))
            .and_then(|raw| {
                String::from_utf8(raw)
                    .map_err(|e| ProviderError::Config(format!("password is not UTF-8: {e}")))
            })?;

        Ok(Self {
            transport,
            settings: Settings {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                username: config.username.clone(),
                password,
                api_version: config.api_version.clone(),
                language: config.language.clone(),
                retry_attempts: config.retry_attempts,
                retry_delay: Duration::from_millis(config.retry_delay_ms),
            },
            session: Mutex::new(SessionSlot::default()),
        })
    }

    /// Obtain a fresh session, replacing any current one.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Auth`] if the provider rejects the credentials.
    pub async fn authenticate(&self) -> Result<Session, ProviderError> {
        let mut slot = self.session.lock().await;
        slot.token = None;
        let token = self.request_token().await?;
        Ok(slot.install(token))
    }

    /// Resolve a tax ID to the provider's company record.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::CompanyNotFound`] without retrying when the
    /// search matches nothing, or [`ProviderError::Exhausted`] when every
    /// attempt fails.
    pub async fn search_company(&self, tax_id: &str) -> Result<CompanyIdentity, ProviderError> {
        let body = encode(&SearchCompanyRequest {
            language: &self.settings.language,
            search_company_parameters: SearchCompanyParameters { tax_number: tax_id },
        })?;
        let url = format!(
            "{}/api/Search/SearchCompany?apiVersion={}",
            self.settings.base_url, self.settings.api_version
        );

        let company = self
            .call("Search/SearchCompany", &url, body, |raw| {
                let response: SearchCompanyResponse = match serde_json::from_slice(raw) {
                    Ok(response) => response,
                    Err(e) => return Verdict::Retry(format!("failed to decode search response: {e}")),
                };
                response.company_data_list.into_iter().next().map_or_else(
                    || {
                        Verdict::Fail(ProviderError::CompanyNotFound {
                            tax_id: tax_id.to_string(),
                        })
                    },
                    Verdict::Done,
                )
            })
            .await?;

        info!(inn = tax_id, company_id = %company.company_id, "Company found");
        Ok(company)
    }

    /// Fetch one category of company data. Returns the `data` member of the
    /// provider's reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Exhausted`] when every attempt fails.
    pub async fn fetch_category(
        &self,
        company_id: &str,
        category: &CategorySpec,
    ) -> Result<serde_json::Value, ProviderError> {
        let params = category.params();
        let body = encode(&CompanyInformationRequest {
            company_id,
            language: &self.settings.language,
            params: &params,
        })?;
        let url = format!(
            "{}/api/{}?apiVersion={}",
            self.settings.base_url, category.endpoint, self.settings.api_version
        );

        self.call(category.endpoint, &url, body, |raw| {
            match serde_json::from_slice::<CompanyInformationResponse>(raw) {
                Ok(response) => match response.error.filter(|e| !e.is_empty()) {
                    Some(error) => Verdict::Retry(format!("{} returned error: {error}", category.endpoint)),
                    None => Verdict::Done(response.data),
                },
                Err(e) => Verdict::Retry(format!(
                    "failed to decode {} response: {e}",
                    category.endpoint
                )),
            }
        })
        .await
    }

    /// Current session, authenticating first if there is none.
    async fn session(&self) -> Result<Session, ProviderError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.current() {
            return Ok(session);
        }
        let token = self.request_token().await?;
        Ok(slot.install(token))
    }

    /// Replace the session that produced a 401.
    ///
    /// If another caller already refreshed past `stale_generation`, its
    /// session is reused instead of authenticating again.
    async fn refresh(&self, stale_generation: u64) -> Result<Session, ProviderError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.current() {
            if session.generation != stale_generation {
                debug!(generation = session.generation, "Session already refreshed");
                return Ok(session);
            }
        }
        slot.token = None;
        let token = self.request_token().await?;
        Ok(slot.install(token))
    }

    /// Drop the session if it is still `generation`.
    async fn invalidate(&self, generation: u64) {
        let mut slot = self.session.lock().await;
        if slot.generation == generation {
            slot.token = None;
        }
    }

    async fn request_token(&self) -> Result<Arc<str>, ProviderError> {
        let body = encode(&AuthRequest {
            username: &self.settings.username,
            password: &self.settings.password,
        })?;
        let url = format!("{}/api/Authorization/GetAccessKey", self.settings.base_url);

        let reply = self
            .transport
            .post_json(&url, None, body)
            .await
            .map_err(|e| ProviderError::Auth(format!("failed to send auth request: {e}")))?;
        if reply.status != 200 {
            return Err(ProviderError::Auth(format!(
                "status {}: {}",
                reply.status,
                reply.body_text()
            )));
        }

        let response: AuthResponse = serde_json::from_slice(&reply.body)
            .map_err(|e| ProviderError::Auth(format!("failed to decode auth response: {e}")))?;
        if let Some(error) = response.error.filter(|e| !e.is_empty()) {
            return Err(ProviderError::Auth(error));
        }
        if response.access_key.is_empty() {
            return Err(ProviderError::Auth("empty access key".into()));
        }

        info!("Authenticated with provider");
        Ok(Arc::from(response.access_key))
    }

    /// Run one operation under the retry policy.
    ///
    /// The first 401 of an operation refreshes the session and repeats the
    /// request without spending an attempt; a second 401 is an ordinary
    /// failure.
    async fn call<T, F>(
        &self,
        operation: &str,
        url: &str,
        body: Bytes,
        decode: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn(&[u8]) -> Verdict<T> + Send + Sync,
        T: Send,
    {
        let max_attempts = self.settings.retry_attempts.saturating_add(1);
        let mut failures = Vec::new();
        let mut attempt = 0u32;
        let mut reauthenticated = false;
        let mut free_retry = false;

        loop {
            if !free_retry {
                if attempt >= max_attempts {
                    break;
                }
                if attempt > 0 {
                    info!(operation, attempt, "Retrying request");
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                attempt += 1;
            }
            free_retry = false;

            let session = match self.session().await {
                Ok(session) => session,
                Err(e) => {
                    failures.push(e.to_string());
                    continue;
                }
            };

            let reply = match self
                .transport
                .post_json(url, Some(&session.token), body.clone())
                .await
            {
                Ok(reply) => reply,
                Err(TransportError(e)) => {
                    failures.push(format!("failed to send request for {operation}: {e}"));
                    continue;
                }
            };

            match reply {
                HttpReply { status: UNAUTHORIZED, .. } => {
                    failures.push("token expired (401)".to_string());
                    if reauthenticated {
                        self.invalidate(session.generation).await;
                        continue;
                    }
                    reauthenticated = true;
                    warn!(operation, "Session rejected, re-authenticating");
                    match self.refresh(session.generation).await {
                        Ok(_) => free_retry = true,
                        Err(e) => failures.push(format!("failed to re-authenticate: {e}")),
                    }
                }
                HttpReply { status, .. } if !(200..300).contains(&status) => {
                    failures.push(format!(
                        "request {operation} failed with status {status}: {}",
                        reply.body_text()
                    ));
                }
                HttpReply { body, .. } => match decode(&body) {
                    Verdict::Done(value) => return Ok(value),
                    Verdict::Retry(message) => failures.push(message),
                    Verdict::Fail(error) => return Err(error),
                },
            }
        }

        warn!(operation, attempts = attempt, "All retry attempts failed");
        Err(ProviderError::Exhausted {
            operation: operation.to_string(),
            attempts: attempt,
            failures,
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Bytes, ProviderError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ProviderError::Config(format!("failed to encode request: {e}")))
}

#[async_trait]
impl CompanyDataSource for ProviderClient {
    async fn search_company(&self, tax_id: &str) -> Result<CompanyIdentity, ProviderError> {
        Self::search_company(self, tax_id).await
    }

    async fn fetch_category(
        &self,
        company_id: &str,
        category: &CategorySpec,
    ) -> Result<serde_json::Value, ProviderError> {
        Self::fetch_category(self, company_id, category).await
    }
}
