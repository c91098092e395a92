//! Wire types for the provider API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct AuthRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthResponse {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchCompanyRequest<'a> {
    pub language: &'a str,
    pub search_company_parameters: SearchCompanyParameters<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchCompanyParameters<'a> {
    pub tax_number: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchCompanyResponse {
    #[serde(default)]
    pub company_data_list: Vec<CompanyIdentity>,
}

/// Company record returned by the provider's search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyIdentity {
    /// Provider-internal company ID used by every category endpoint.
    pub company_id: String,
    /// Registered name.
    pub company_name: String,
    /// Tax number (INN).
    pub tax_number: String,
    /// State registration number (OGRN).
    pub registration_number: String,
    /// Statistical number (OKPO).
    pub statistical_number: String,
    /// Legal form.
    pub legal_form: String,
    /// Registration status.
    pub status: String,
    /// Legal address.
    pub address_legal: String,
    /// Country name.
    pub country: String,
    /// Date of the most recent balance sheet.
    pub last_balance_date: String,
    /// Foundation date.
    pub foundation_date_float: FoundationDate,
}

/// Partially known date as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoundationDate {
    /// Year.
    pub year: i32,
    /// Month, zero if unknown.
    pub month: u32,
    /// Day, zero if unknown.
    pub day: u32,
    /// Formatted date.
    pub date: String,
}

/// Body of every category request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompanyInformationRequest<'a> {
    pub company_id: &'a str,
    pub language: &'a str,
    #[serde(flatten)]
    pub params: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompanyInformationResponse {
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}
