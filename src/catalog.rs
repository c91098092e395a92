//! Category name to provider operation table.
//!
//! The set of categories is closed. Names are matched case-insensitively;
//! anything not listed here is skipped by the engine.

use serde_json::{json, Map, Value};

/// One fetchable category of company data.
#[derive(Debug)]
pub struct CategorySpec {
    /// Canonical lowercase category name, stored as `data_type`.
    pub name: &'static str,
    /// Provider endpoint path below `/api/`.
    pub endpoint: &'static str,
    params: fn() -> Map<String, Value>,
}

impl CategorySpec {
    /// Extra request members for this category, merged into the request body.
    #[must_use]
    pub fn params(&self) -> Map<String, Value> {
        (self.params)()
    }
}

/// Every known category.
pub static CATEGORIES: &[CategorySpec] = &[
    CategorySpec {
        name: "basic_information",
        endpoint: "CompanyInformation/GetBasicInformation",
        params: no_params,
    },
    CategorySpec {
        name: "activities",
        endpoint: "CompanyInformation/Activities",
        params: no_params,
    },
    CategorySpec {
        name: "addresses_by_credinform",
        endpoint: "CompanyInformation/GetAddressesByCredinform",
        params: no_params,
    },
    CategorySpec {
        name: "addresses_by_unified_state_register",
        endpoint: "CompanyInformation/GetAddressesByUnifiedStateRegister",
        params: no_params,
    },
    CategorySpec {
        name: "affiliated_companies",
        endpoint: "CompanyInformation/AffiliatedCompanies",
        params: affiliated_companies_params,
    },
    CategorySpec {
        name: "arbitrage_statistics",
        endpoint: "CompanyInformation/ArbitrageStatistics",
        params: arbitrage_statistics_params,
    },
];

/// Find a category by name, ignoring case and surrounding whitespace.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static CategorySpec> {
    let name = name.trim();
    CATEGORIES
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

fn no_params() -> Map<String, Value> {
    Map::new()
}

fn affiliated_companies_params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert(
        "affiliationTypes".to_string(),
        json!([
            "ByManagementOrShareholdersNaturalPersons",
            "ByLiquidatorOrBankruptcyAdministrator",
            "UnderAdministrationOfTheCompany",
            "ByManagingLegalPersons",
            "ByShareholdersLegalPersons"
        ]),
    );
    params
}

fn arbitrage_statistics_params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert(
        "lastCaseChangeDateRange".to_string(),
        json!({ "from": "2025-01-01T00:00:00" }),
    );
    params.insert(
        "arbitrageSideCommonType".to_string(),
        json!(["Claimant", "Defendant", "ThirdPartiesAndOthers"]),
    );
    params
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup_ignores_case() {
        let spec = lookup("Basic_Information").expect("known");
        assert_eq!(spec.name, "basic_information");
        assert_eq!(spec.endpoint, "CompanyInformation/GetBasicInformation");
        assert!(lookup(" ACTIVITIES ").is_some());
    }

    #[test]
    fn test_unknown_category() {
        assert!(lookup("credit_rating").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_names_are_unique_and_lowercase() {
        let names: HashSet<_> = CATEGORIES.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), CATEGORIES.len());
        assert!(CATEGORIES.iter().all(|c| c.name == c.name.to_lowercase()));
    }

    #[test]
    fn test_params() {
        assert!(lookup("activities").expect("known").params().is_empty());

        let affiliated = lookup("affiliated_companies").expect("known").params();
        assert_eq!(affiliated["affiliationTypes"].as_array().map(Vec::len), Some(5));

        let arbitrage = lookup("arbitrage_statistics").expect("known").params();
        assert_eq!(arbitrage["lastCaseChangeDateRange"]["from"], "2025-01-01T00:00:00");
        assert_eq!(arbitrage["arbitrageSideCommonType"].as_array().map(Vec::len), Some(3));
    }
}
