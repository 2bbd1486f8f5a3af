//! Serialization of model calls and client retry behavior.

mod support;

use scripture_insights::clients::{ChatRequest, InferenceBackend, LocalClient};
use scripture_insights::{InferenceGateway, InsightAggregator, InsightError, InsightKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use support::{scripted, spawn_mock_llm, test_config, well_formed_insight};

#[tokio::test]
async fn concurrent_requests_never_overlap_at_the_model() {
    let mock = spawn_mock_llm(
        Duration::from_millis(50),
        scripted(well_formed_insight("One at a time.")),
    )
    .await;
    let aggregator = Arc::new(InsightAggregator::from_config(&test_config(&mock.url)).unwrap());

    let mut handles = Vec::new();
    for topic in ["grace", "faith", "hope", "love"] {
        let aggregator = aggregator.clone();
        handles.push(tokio::spawn(async move {
            aggregator.insights_for(InsightKind::Topic, topic, None).await
        }));
    }
    for handle in handles {
        let (_, outcome) = handle.await.unwrap().unwrap();
        assert_eq!(outcome.insights().unwrap().summary, "One at a time.");
    }

    assert_eq!(mock.call_count(), 4);
    assert_eq!(mock.max_concurrency(), 1);
    assert!(!aggregator.gateway().is_busy());
}

#[tokio::test]
async fn verse_normalization_shares_the_lock() {
    let mock = spawn_mock_llm(
        Duration::from_millis(30),
        scripted(well_formed_insight("Shared.")),
    )
    .await;
    let aggregator = Arc::new(InsightAggregator::from_config(&test_config(&mock.url)).unwrap());

    let a = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.insights_for(InsightKind::Verse, "jn3.16", None).await })
    };
    let b = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.insights_for(InsightKind::Topic, "grace", None).await })
    };
    let (prepared, _) = a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(prepared.request.reference_or_text, "John 3:16");
    assert_eq!(mock.call_count(), 3);
    assert_eq!(mock.max_concurrency(), 1);
}

#[tokio::test]
async fn waiting_past_lock_timeout_reports_busy() {
    let mock = spawn_mock_llm(
        Duration::from_millis(300),
        scripted(well_formed_insight("Slow.")),
    )
    .await;
    let mut config = test_config(&mock.url);
    config.llm.lock_timeout_ms = Some(50);
    let gateway = Arc::new(InferenceGateway::from_config(&config).unwrap());

    let first = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            gateway
                .complete(&ChatRequest::new("insight", "system", "first"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = gateway
        .complete(&ChatRequest::new("insight", "system", "second"))
        .await;

    assert!(matches!(second, Err(InsightError::UpstreamUnavailable { .. })));
    assert!(first.await.unwrap().is_ok());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mock = spawn_mock_llm(
        Duration::ZERO,
        Arc::new(move |_: &str, _: &str| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                (503, "loading model".to_string())
            } else {
                (200, "John 3:16".to_string())
            }
        }),
    )
    .await;
    let mut config = test_config(&mock.url);
    config.llm.max_retries = 2;
    let client = LocalClient::new(&config.llm).unwrap();

    let reply = client
        .complete(&ChatRequest::new("normalize", "system", "jn3.16"))
        .await
        .unwrap();

    assert_eq!(reply, "John 3:16");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let mock = spawn_mock_llm(
        Duration::ZERO,
        Arc::new(|_: &str, _: &str| (400, "bad request".to_string())),
    )
    .await;
    let mut config = test_config(&mock.url);
    config.llm.max_retries = 3;
    let client = LocalClient::new(&config.llm).unwrap();

    let err = client
        .complete(&ChatRequest::new("insight", "system", "grace"))
        .await
        .unwrap_err();

    assert!(matches!(err, InsightError::UpstreamUnavailable { .. }));
    assert_eq!(mock.call_count(), 1);
}
