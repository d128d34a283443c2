//! Events flowing from the bus through to the transport and attempt log
#![allow(clippy::unwrap_used)]

mod support;

use std::time::Duration;

use herald_consumer::{CircuitOpenPolicy, EventFamily};
use herald_delivery::transport::Scripted;
use pretty_assertions::assert_eq;
use support::Pipeline;

const USER_REGISTERED: &str =
    r#"{"eventType":"UserRegistered","userId":"u1","email":"a@b.com","verificationToken":"t1"}"#;

const APPLICATION_SUBMITTED: &str = r#"{
    "eventType": "APPLICATION_SUBMITTED",
    "applicationId": "app-7",
    "jobId": 42,
    "jobTitle": "Rust Engineer",
    "companyName": "Acme",
    "userId": "u2",
    "applicantName": "Grace",
    "applicantEmail": "grace@example.com"
}"#;

#[tokio::test]
async fn user_registration_is_delivered_and_acknowledged() {
    let pipeline = Pipeline::start(&[EventFamily::UserRegistered], CircuitOpenPolicy::Acknowledge);

    pipeline.publish("user-events", USER_REGISTERED);
    pipeline.until(|p| p.bus.stats().acked == 1).await;

    let sent = pipeline.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient(), "a@b.com");
    assert_eq!(
        sent[0].subject(),
        "Verify Your Email Address - Welcome to JobHub!"
    );

    let entries = pipeline.store.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].succeeded);
    assert_eq!(entries[0].correlation_id, "u1");
    assert_eq!(pipeline.bus.stats().nacked, 0);

    pipeline.stop().await;
}

#[tokio::test]
async fn application_submission_is_delivered() {
    let pipeline = Pipeline::start(
        &[EventFamily::UserRegistered, EventFamily::ApplicationSubmitted],
        CircuitOpenPolicy::Acknowledge,
    );

    pipeline.publish("application-events", APPLICATION_SUBMITTED);
    pipeline.until(|p| p.bus.stats().acked == 1).await;

    let sent = pipeline.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient(), "grace@example.com");
    assert_eq!(
        sent[0].subject(),
        "🎉 Application Submitted! Rust Engineer at Acme"
    );
    assert!(sent[0].body().contains("/my-applications/app-7"));
    assert_eq!(pipeline.store.entries()[0].correlation_id, "u2");

    pipeline.stop().await;
}

#[tokio::test]
async fn failing_provider_leads_to_redelivery_then_dead_letter() {
    let pipeline = Pipeline::start_with(
        herald_delivery::TestTransport::failing(),
        &[EventFamily::UserRegistered],
        CircuitOpenPolicy::Redeliver,
    );

    pipeline.publish("user-events", USER_REGISTERED);
    pipeline
        .dead_letters
        .wait_for_count(1, Duration::from_secs(5))
        .await
        .unwrap();

    let letter = &pipeline.dead_letters.letters()[0];
    assert_eq!(letter.topic, "user-events");
    assert_eq!(letter.deliveries, 4);
    assert_eq!(letter.payload_lossy(), USER_REGISTERED);

    // One log entry per delivery
    let entries = pipeline.store.entries();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|entry| !entry.succeeded));
    assert!(entries.iter().all(|entry| entry.correlation_id == "u1"));

    let stats = pipeline.bus.stats();
    assert_eq!(stats.acked, 0);
    assert_eq!(stats.nacked, 4);
    assert_eq!(stats.redelivered, 3);

    pipeline.stop().await;
}

#[tokio::test]
async fn transient_failure_recovers_on_redelivery() {
    let transport = herald_delivery::TestTransport::new().with_script([
        Scripted::Temporary("busy".to_string()),
        Scripted::Temporary("busy".to_string()),
        Scripted::Temporary("busy".to_string()),
    ]);
    let pipeline = Pipeline::start_with(
        transport,
        &[EventFamily::UserRegistered],
        CircuitOpenPolicy::Acknowledge,
    );

    pipeline.publish("user-events", USER_REGISTERED);
    pipeline.until(|p| p.bus.stats().acked == 1).await;

    assert_eq!(pipeline.transport.calls(), 4);
    let entries = pipeline.store.entries();
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].succeeded);
    assert!(entries[1].succeeded);
    assert!(pipeline.dead_letters.is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn truncated_json_is_acknowledged_without_dispatch() {
    let pipeline = Pipeline::start(&[EventFamily::UserRegistered], CircuitOpenPolicy::Acknowledge);

    pipeline.publish("user-events", r#"{"eventType":"UserRegistered","userId":"#);
    pipeline.until(|p| p.bus.stats().acked == 1).await;

    assert_eq!(pipeline.transport.calls(), 0);
    assert!(pipeline.store.is_empty());
    assert!(pipeline.dead_letters.is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn open_breaker_skips_and_acknowledges() {
    let pipeline = Pipeline::start(&[EventFamily::UserRegistered], CircuitOpenPolicy::Acknowledge);
    for _ in 0..5 {
        pipeline.breaker.record_failure();
    }

    pipeline.publish("user-events", USER_REGISTERED);
    pipeline.until(|p| p.bus.stats().acked == 1).await;

    assert_eq!(pipeline.transport.calls(), 0);
    let entries = pipeline.store.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].error_detail.as_deref(), Some("circuit open"));

    pipeline.stop().await;
}

#[tokio::test]
async fn identical_events_are_not_deduplicated() {
    let pipeline = Pipeline::start(&[EventFamily::UserRegistered], CircuitOpenPolicy::Acknowledge);

    pipeline.publish("user-events", USER_REGISTERED);
    pipeline.publish("user-events", USER_REGISTERED);
    pipeline.until(|p| p.bus.stats().acked == 2).await;

    let entries = pipeline.store.for_correlation("u1");
    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].id, entries[1].id);
    assert_eq!(pipeline.transport.sent().len(), 2);

    pipeline.stop().await;
}
