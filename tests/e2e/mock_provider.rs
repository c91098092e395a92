//! Simulated provider API behind the client's `Transport` seam.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use scoring_worker::provider::{HttpReply, Transport, TransportError};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Password the simulated provider accepts.
pub const PASSWORD: &str = "secret";

/// In-process stand-in for the provider's HTTP API.
#[derive(Default)]
pub struct MockProvider {
    /// Tax ID to company ID.
    companies: Mutex<HashMap<String, String>>,
    /// Endpoints that answer 500.
    failing: Mutex<HashSet<String>>,
    /// Currently valid access key.
    token: Mutex<Option<String>>,
    /// Reject the next data request with 401 and revoke the key.
    expire_next: AtomicBool,
    issued: AtomicUsize,
    /// Successful authentications.
    pub auth_calls: AtomicUsize,
    /// Search requests received.
    pub search_calls: AtomicUsize,
    /// Category requests received.
    pub category_calls: AtomicUsize,
}

impl MockProvider {
    /// Provider that knows `1234567890` as `c-1001`.
    #[must_use]
    pub fn new() -> Self {
        let provider = Self::default();
        provider.add_company("1234567890", "c-1001");
        provider
    }

    /// Register a company.
    pub fn add_company(&self, tax_id: &str, company_id: &str) {
        self.companies
            .lock()
            .insert(tax_id.to_string(), company_id.to_string());
    }

    /// Make `endpoint` (e.g. `CompanyInformation/Activities`) fail.
    pub fn fail_endpoint(&self, endpoint: &str) {
        self.failing.lock().insert(endpoint.to_string());
    }

    /// Expire the session on the next data request.
    pub fn expire_session(&self) {
        self.expire_next.store(true, Ordering::SeqCst);
    }

    fn authenticate(&self, body: &Value) -> HttpReply {
        if body["password"] != PASSWORD {
            return reply(200, &json!({ "accessKey": "", "error": "invalid credentials" }));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("key-{n}");
        *self.token.lock() = Some(token.clone());
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        reply(200, &json!({ "accessKey": token }))
    }

    fn authorized(&self, access_key: Option<&str>) -> bool {
        let mut token = self.token.lock();
        if self.expire_next.swap(false, Ordering::SeqCst) {
            *token = None;
            return false;
        }
        token.is_some() && token.as_deref() == access_key
    }

    fn search(&self, body: &Value) -> HttpReply {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let tax_id = body["searchCompanyParameters"]["taxNumber"]
            .as_str()
            .unwrap_or_default();
        let list: Vec<Value> = self
            .companies
            .lock()
            .get(tax_id)
            .map(|company_id| json!({ "companyId": company_id, "taxNumber": tax_id }))
            .into_iter()
            .collect();
        reply(200, &json!({ "companyDataList": list }))
    }

    fn category(&self, endpoint: &str, body: &Value) -> HttpReply {
        self.category_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(endpoint) {
            return HttpReply::new(500, "internal error");
        }
        reply(
            200,
            &json!({ "data": { "endpoint": endpoint, "companyId": body["companyId"] } }),
        )
    }
}

fn reply(status: u16, body: &Value) -> HttpReply {
    HttpReply::new(status, body.to_string())
}

#[async_trait]
impl Transport for MockProvider {
    async fn post_json(
        &self,
        url: &str,
        access_key: Option<&str>,
        body: Bytes,
    ) -> Result<HttpReply, TransportError> {
        let endpoint = url
            .split_once("/api/")
            .map(|(_, rest)| rest.split('?').next().unwrap_or(rest))
            .ok_or_else(|| TransportError(format!("unexpected url {url}")))?;
        let body: Value = serde_json::from_slice(&body)
            .map_err(|e| TransportError(format!("bad request body: {e}")))?;

        if endpoint == "Authorization/GetAccessKey" {
            return Ok(self.authenticate(&body));
        }
        if !self.authorized(access_key) {
            return Ok(HttpReply::new(401, "Unauthorized"));
        }
        if endpoint == "Search/SearchCompany" {
            return Ok(self.search(&body));
        }
        Ok(self.category(endpoint, &body))
    }
}
