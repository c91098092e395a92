//! Verification scenarios driven through the bus.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{MockProvider, TestHarness};
use chrono::{Duration as ChronoDuration, Utc};
use scoring_worker::bus::CompletionStatus;
use scoring_worker::engine::ResultEnvelope;
use scoring_worker::storage::MemoryStore;
use scoring_worker::verification::NewVerification;
use scoring_worker::{Verification, VerificationStatus};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// A company with two categories runs to completion.
#[tokio::test]
async fn test_verification_completes() {
    let mut harness = TestHarness::setup().await.expect("Failed to setup harness");

    harness
        .trigger("v-1", "1234567890", &["basic_information", "activities"])
        .await
        .unwrap();
    let event = harness.next_completion().await.unwrap();

    assert_eq!(event.verification_id, "v-1");
    assert_eq!(event.status, CompletionStatus::Completed);
    assert!(event.error.is_empty());

    let verification = harness.verification("v-1").await.unwrap();
    assert_eq!(verification.status, VerificationStatus::Completed);
    assert_eq!(verification.company_id.as_deref(), Some("c-1001"));

    let envelopes = harness.envelopes("v-1").await.unwrap();
    assert_eq!(envelopes.len(), 2);
    let basic = &envelopes["basic_information"];
    assert_eq!(basic.status, ResultEnvelope::COMPLETED);
    assert_eq!(basic.company_id, "c-1001");
    assert_eq!(
        basic.data.as_ref().unwrap()["endpoint"],
        "CompanyInformation/GetBasicInformation"
    );

    tokio_test::assert_ok!(harness.teardown().await);
}

/// An unknown tax ID ends in COMPANY_NOT_FOUND and an ERROR event.
#[tokio::test]
async fn test_company_not_found() {
    let mut harness = TestHarness::setup().await.expect("Failed to setup harness");

    harness
        .trigger("v-404", "0000000000", &["basic_information"])
        .await
        .unwrap();
    let event = harness.next_completion().await.unwrap();

    assert_eq!(event.status, CompletionStatus::Error);
    assert_eq!(event.error, "company not found");
    let verification = harness.verification("v-404").await.unwrap();
    assert_eq!(verification.status, VerificationStatus::CompanyNotFound);
    assert!(verification.company_id.is_none());
    assert_eq!(harness.provider.search_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.provider.category_calls.load(Ordering::SeqCst), 0);

    tokio_test::assert_ok!(harness.teardown().await);
}

/// A failing category is stored as an error envelope; the run still completes.
#[tokio::test]
async fn test_failing_category_is_recorded() {
    let provider = Arc::new(MockProvider::new());
    provider.fail_endpoint("CompanyInformation/Activities");
    let mut harness = TestHarness::setup_with(MemoryStore::new(), provider)
        .await
        .expect("Failed to setup harness");

    harness
        .trigger("v-2", "1234567890", &["basic_information", "activities", "credit_rating"])
        .await
        .unwrap();
    let event = harness.next_completion().await.unwrap();
    assert_eq!(event.status, CompletionStatus::Completed);

    let envelopes = harness.envelopes("v-2").await.unwrap();
    assert_eq!(envelopes.len(), 2, "unknown category is skipped");
    let activities = &envelopes["activities"];
    assert_eq!(activities.status, ResultEnvelope::ERROR);
    assert!(activities.error.as_deref().unwrap().contains("status 500"));
    // One initial attempt plus one retry.
    assert_eq!(harness.provider.category_calls.load(Ordering::SeqCst), 3);

    tokio_test::assert_ok!(harness.teardown().await);
}

/// An expired session is renewed once and the run carries on.
#[tokio::test]
async fn test_session_expiry_is_recovered() {
    let mut harness = TestHarness::setup().await.expect("Failed to setup harness");

    harness
        .trigger("v-3", "1234567890", &["basic_information"])
        .await
        .unwrap();
    harness.next_completion().await.unwrap();
    assert_eq!(harness.provider.auth_calls.load(Ordering::SeqCst), 1);

    harness.provider.expire_session();
    harness
        .trigger("v-4", "1234567890", &["activities"])
        .await
        .unwrap();
    let event = harness.next_completion().await.unwrap();

    assert_eq!(event.status, CompletionStatus::Completed);
    assert_eq!(harness.provider.auth_calls.load(Ordering::SeqCst), 2);

    tokio_test::assert_ok!(harness.teardown().await);
}

/// A redelivered trigger does not start a second run.
#[tokio::test]
async fn test_redelivered_trigger_is_ignored() {
    let mut harness = TestHarness::setup().await.expect("Failed to setup harness");

    harness
        .trigger("v-5", "1234567890", &["activities"])
        .await
        .unwrap();
    harness.next_completion().await.unwrap();

    harness
        .trigger("v-5", "1234567890", &["activities"])
        .await
        .unwrap();
    harness
        .trigger("v-6", "1234567890", &["activities"])
        .await
        .unwrap();
    let next = harness.next_completion().await.unwrap();

    assert_eq!(next.verification_id, "v-6");
    assert_eq!(harness.provider.search_calls.load(Ordering::SeqCst), 2);

    tokio_test::assert_ok!(harness.teardown().await);
}

/// Malformed payloads are dropped before they reach the worker.
#[tokio::test]
async fn test_malformed_trigger_is_dropped() {
    let mut harness = TestHarness::setup().await.expect("Failed to setup harness");

    assert!(!harness.bus.send_raw(b"{\"inn\": 42}").await.unwrap());
    assert!(harness
        .bus
        .send_raw(br#"{"verification_id":"v-7","inn":"1234567890","requested_types":["activities"]}"#)
        .await
        .unwrap());

    let event = harness.next_completion().await.unwrap();
    assert_eq!(event.verification_id, "v-7");
    assert_eq!(event.status, CompletionStatus::Completed);

    tokio_test::assert_ok!(harness.teardown().await);
}

fn left_behind(id: &str, status: VerificationStatus, company_id: Option<&str>) -> Verification {
    let mut verification = Verification::created(
        NewVerification {
            id: id.to_string(),
            tax_id: "1234567890".to_string(),
            requested_categories: vec!["basic_information".to_string(), "activities".to_string()],
            author_email: "analyst@example.com".to_string(),
        },
        Utc::now() - ChronoDuration::minutes(30),
    );
    verification.status = status;
    verification.company_id = company_id.map(ToString::to_string);
    verification
}

/// Work left behind by a previous process is finished at startup.
#[tokio::test]
async fn test_startup_recovery_resumes_stale_work() {
    let store = MemoryStore::new();
    store.seed(left_behind("v-stale-1", VerificationStatus::Processing, Some("c-1001")));
    store.seed(left_behind("v-stale-2", VerificationStatus::Searching, None));
    store.seed(left_behind("v-finished", VerificationStatus::Completed, Some("c-1001")));

    let mut harness = TestHarness::setup_with(store, Arc::new(MockProvider::new()))
        .await
        .expect("Failed to setup harness");

    let mut finished = vec![
        harness.next_completion().await.unwrap().verification_id,
        harness.next_completion().await.unwrap().verification_id,
    ];
    finished.sort();
    assert_eq!(finished, ["v-stale-1", "v-stale-2"]);

    // Only the record without a company had to be searched.
    assert_eq!(harness.provider.search_calls.load(Ordering::SeqCst), 1);
    for id in ["v-stale-1", "v-stale-2"] {
        let verification = harness.verification(id).await.unwrap();
        assert_eq!(verification.status, VerificationStatus::Completed);
        assert!(verification.claimed_by.is_some());
        assert_eq!(harness.envelopes(id).await.unwrap().len(), 2);
    }
    let untouched = harness.verification("v-finished").await.unwrap();
    assert!(untouched.claimed_by.is_none());

    tokio_test::assert_ok!(harness.teardown().await);
}

/// A trigger arriving while the startup sweep runs is processed only once.
#[tokio::test]
async fn test_trigger_at_startup_is_not_swept() {
    let mut harness = TestHarness::setup().await.expect("Failed to setup harness");

    harness
        .trigger("v-1", "1234567890", &["basic_information", "activities"])
        .await
        .unwrap();
    let event = harness.next_completion().await.unwrap();

    assert_eq!(event.verification_id, "v-1");
    assert_eq!(event.status, CompletionStatus::Completed);
    assert!(event.error.is_empty());
    assert!(harness.stays_quiet(Duration::from_millis(300)).await);

    let verification = harness.verification("v-1").await.unwrap();
    assert!(verification.claimed_by.is_none());
    assert_eq!(harness.provider.search_calls.load(Ordering::SeqCst), 1);

    tokio_test::assert_ok!(harness.teardown().await);
}

/// Completions are flushed before the worker returns.
#[tokio::test]
async fn test_shutdown_flushes_completions() {
    let mut harness = TestHarness::setup().await.expect("Failed to setup harness");
    let bus = harness.bus.clone();

    harness
        .trigger("v-1", "1234567890", &["activities"])
        .await
        .unwrap();
    harness.next_completion().await.unwrap();
    assert_eq!(bus.flushes(), 0);

    tokio_test::assert_ok!(harness.teardown().await);
    assert_eq!(bus.flushes(), 1);
}
