//! Verification records and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a verification.
///
/// ```text
/// CREATED ──► SEARCHING ──► PROCESSING ──► COMPLETED
///                 │
///                 ├──► COMPANY_NOT_FOUND
///                 └──► ERROR
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Record exists, nothing has run yet.
    Created,
    /// Company lookup in progress.
    Searching,
    /// Company resolved, categories being fetched.
    Processing,
    /// Every requested category was attempted.
    Completed,
    /// The provider knows no company with this tax ID.
    CompanyNotFound,
    /// Company lookup failed.
    Error,
}

impl VerificationStatus {
    /// Statuses a run can be left in when the process dies.
    pub const NON_TERMINAL: [Self; 3] = [Self::Created, Self::Searching, Self::Processing];

    /// Database/wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Searching => "SEARCHING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::CompanyNotFound => "COMPANY_NOT_FOUND",
            Self::Error => "ERROR",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::CompanyNotFound | Self::Error)
    }

    /// Statuses from which `self` may be entered.
    #[must_use]
    pub const fn predecessors(self) -> &'static [Self] {
        match self {
            Self::Created => &[],
            Self::Searching => &[Self::Created],
            Self::Processing | Self::CompanyNotFound | Self::Error => &[Self::Searching],
            Self::Completed => &[Self::Processing],
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        next.predecessors().contains(&self)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown verification status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for VerificationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "SEARCHING" => Ok(Self::Searching),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "COMPANY_NOT_FOUND" => Ok(Self::CompanyNotFound),
            "ERROR" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Input for creating a verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVerification {
    /// Caller-supplied unique ID.
    pub id: String,
    /// Company tax identifier (INN).
    pub tax_id: String,
    /// Requested category names, as received.
    pub requested_categories: Vec<String>,
    /// Requester contact.
    pub author_email: String,
}

/// A persisted verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Caller-supplied unique ID.
    pub id: String,
    /// Company tax identifier (INN).
    pub tax_id: String,
    /// Provider company ID, set once the lookup succeeds.
    pub company_id: Option<String>,
    /// Current lifecycle status.
    pub status: VerificationStatus,
    /// Requested category names.
    pub requested_categories: Vec<String>,
    /// Requester contact.
    pub author_email: String,
    /// Instance that last claimed the record during recovery.
    pub claimed_by: Option<String>,
    /// When the record was last claimed.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Verification {
    /// Build a fresh `CREATED` record.
    #[must_use]
    pub fn created(new: NewVerification, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            tax_id: new.tax_id,
            company_id: None,
            status: VerificationStatus::Created,
            requested_categories: new.requested_categories,
            author_email: new.author_email,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Link between a verification category and a cached payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryResult {
    /// Owning verification.
    pub verification_id: String,
    /// Category name.
    pub category: String,
    /// Hex digest of the stored envelope.
    pub digest: String,
    /// When the link was written.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use VerificationStatus::*;
        assert!(Created.can_transition_to(Searching));
        assert!(Searching.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Searching.can_transition_to(CompanyNotFound));
        assert!(Searching.can_transition_to(Error));
    }

    #[test]
    fn test_no_backwards_or_terminal_exit() {
        use VerificationStatus::*;
        assert!(!Processing.can_transition_to(Searching));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Error.can_transition_to(Searching));
        assert!(!Processing.can_transition_to(Error));
        assert!(!Created.can_transition_to(Processing));
        assert!(!Created.can_transition_to(Created));
    }

    #[test]
    fn test_terminal_statuses() {
        for status in VerificationStatus::NON_TERMINAL {
            assert!(!status.is_terminal());
        }
        assert!(VerificationStatus::Completed.is_terminal());
        assert!(VerificationStatus::CompanyNotFound.is_terminal());
        assert!(VerificationStatus::Error.is_terminal());
    }

    #[test]
    fn test_status_string_form() {
        let status: VerificationStatus = "COMPANY_NOT_FOUND".parse().expect("known status");
        assert_eq!(status, VerificationStatus::CompanyNotFound);
        assert_eq!(status.to_string(), "COMPANY_NOT_FOUND");
        assert!("IN_PROCESS".parse::<VerificationStatus>().is_err());
    }
}
