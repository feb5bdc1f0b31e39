//! Failover and circuit breaker behaviour of the send paths.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use failover_gateway::config::{MessagingConfig, StorageConfig};
use failover_gateway::endpoint::Connector;
use failover_gateway::messaging::{Message, MessageSender};
use failover_gateway::resilience::{CircuitState, FailoverError};
use failover_gateway::storage::{BlobReader, BlobRecord, BlobWriter};
use failover_gateway::transport::memory::{MemorySubscriptionReceiver, MemoryRegistry};
use failover_gateway::transport::SubscriptionReceiver;

mod common;

const TIMEOUT: Duration = Duration::from_secs(2);

fn sender(registry: &Arc<MemoryRegistry>) -> MessageSender {
    MessageSender::new(&MessagingConfig::default(), &Connector::new(registry.clone()), TIMEOUT)
}

fn listen(registry: &MemoryRegistry, namespace: &str) -> MemorySubscriptionReceiver {
    let config = MessagingConfig::default();
    registry
        .namespace(namespace)
        .subscription_receiver(&config.topic, &config.subscription)
}

async fn next_message(receiver: &MemorySubscriptionReceiver) -> Option<Message> {
    let received = receiver.receive(Duration::from_millis(10)).await.unwrap()?;
    receiver.complete(received.lock_token).await.unwrap();
    Some(Message::decode(&received.message).unwrap())
}

#[tokio::test]
async fn test_healthy_primary_carries_traffic() {
    let registry = common::registry();
    let primary = listen(&registry, "primary");
    let secondary = listen(&registry, "secondary");
    let sender = sender(&registry);

    sender.send(&Message::new("hello")).await.unwrap();

    let delivered = next_message(&primary).await.unwrap();
    assert_eq!(delivered.sender, "primary");
    assert_eq!(delivered.body, "hello");
    assert!(next_message(&secondary).await.is_none());
    assert_eq!(sender.breaker().unwrap().state, CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_skips_primary() {
    let registry = common::registry();
    let secondary = listen(&registry, "secondary");
    let sender = sender(&registry);
    registry.namespace("primary").set_available(false);

    sender.send(&Message::new("one")).await.unwrap();
    let primary_calls = registry.namespace("primary").operations();
    assert_eq!(primary_calls, 1);
    assert_eq!(sender.breaker().unwrap().state, CircuitState::Open);

    sender.send(&Message::new("two")).await.unwrap();
    assert_eq!(registry.namespace("primary").operations(), primary_calls);

    for body in ["one", "two"] {
        let delivered = next_message(&secondary).await.unwrap();
        assert_eq!(delivered.body, body);
        assert_eq!(delivered.sender, "secondary");
    }
}

#[tokio::test(start_paused = true)]
async fn test_probe_returns_to_primary() {
    let registry = common::registry();
    let primary = listen(&registry, "primary");
    let sender = sender(&registry);

    registry.namespace("primary").set_available(false);
    sender.send(&Message::new("during outage")).await.unwrap();
    registry.namespace("primary").set_available(true);

    // Still sticky on the secondary until the open duration passes.
    sender.send(&Message::new("sticky")).await.unwrap();
    assert!(next_message(&primary).await.is_none());

    tokio::time::advance(Duration::from_secs(10)).await;
    sender.send(&Message::new("probe")).await.unwrap();
    assert_eq!(sender.breaker().unwrap().state, CircuitState::Closed);
    assert_eq!(next_message(&primary).await.unwrap().body, "probe");

    sender.send(&Message::new("after")).await.unwrap();
    assert_eq!(next_message(&primary).await.unwrap().sender, "primary");
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_stays_on_secondary() {
    let registry = common::registry();
    let secondary = listen(&registry, "secondary");
    let sender = sender(&registry);
    registry.namespace("primary").set_available(false);

    sender.send(&Message::new("a")).await.unwrap();
    tokio::time::advance(Duration::from_secs(10)).await;
    sender.send(&Message::new("b")).await.unwrap();

    assert_eq!(sender.breaker().unwrap().state, CircuitState::Open);
    assert_eq!(registry.namespace("primary").operations(), 2);
    assert_eq!(next_message(&secondary).await.unwrap().body, "a");
    assert_eq!(next_message(&secondary).await.unwrap().body, "b");
}

#[tokio::test]
async fn test_both_endpoints_down_is_exhausted() {
    let registry = common::registry();
    let sender = sender(&registry);
    registry.namespace("primary").set_available(false);
    registry.namespace("secondary").set_available(false);

    let err = sender.send(&Message::new("lost")).await.unwrap_err();
    assert!(err.to_string().contains("all endpoints failed"));
}

#[tokio::test]
async fn test_http_primary_failure_uploads_to_secondary() {
    let calls = Arc::new(AtomicU32::new(0));
    let counted = calls.clone();
    let backend = common::start_programmable_backend(move || {
        let counted = counted.clone();
        async move {
            counted.fetch_add(1, Ordering::SeqCst);
            (503, "Service Unavailable".to_string())
        }
    })
    .await;

    let registry = common::registry();
    let config = StorageConfig {
        primary: format!("http://{}", backend),
        ..StorageConfig::default()
    };
    let connector = Connector::new(registry.clone());
    let writer = BlobWriter::new(&config, &connector, TIMEOUT);
    let reader = BlobReader::new(&config, &connector, TIMEOUT);

    writer.upload(&BlobRecord::new("c", "n", "kept")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.namespace("secondary").blob("c", "n").unwrap().written_by, "secondary");

    // The reader has no breaker: it asks the failing primary, then the secondary.
    let record = reader.get("c", "n").await.unwrap().unwrap();
    assert_eq!(record.body, "kept");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_no_secondary_propagates_primary_error() {
    let registry = common::registry();
    let config = MessagingConfig {
        secondary: None,
        ..MessagingConfig::default()
    };
    let sender = MessageSender::new(&config, &Connector::new(registry.clone()), TIMEOUT);
    registry.namespace("primary").set_available(false);

    let err = sender.send(&Message::new("x")).await.unwrap_err();
    assert!(matches!(
        err,
        failover_gateway::messaging::SendError::Failover(FailoverError::Primary(_))
    ));
    assert!(sender.breaker().is_none());
}
