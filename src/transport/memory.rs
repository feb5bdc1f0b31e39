//! In-process endpoint emulation for `memory://` connections.
//!
//! # Responsibilities
//! - Hold named namespaces, each standing in for one broker + blob account
//! - Fan topic messages out to every subscription on that topic
//! - Peek-lock deliveries with lock expiry, delivery counting and dead-lettering
//! - Blob containers with overwrite semantics
//! - Fault injection (`set_available`) and operation counting for tests
//!
//! # Design Decisions
//! - Namespaces are shared through the registry, so a sender and a receiver
//!   created from the same connection string see the same data
//! - The broker dead-letters a message once its delivery count would exceed
//!   `max_delivery_count`
//! - Time uses `tokio::time::Instant` so lock expiry follows paused test clocks

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::transport::{
    BlobClient, BrokeredMessage, LockToken, ReceivedMessage, SubscriptionReceiver, TopicSender,
    TransportError,
};

/// Reason recorded when the broker itself gives up on a message.
pub const MAX_DELIVERY_EXCEEDED: &str = "MaxDeliveryCountExceeded";

/// Broker behaviour shared by every namespace in a registry.
#[derive(Debug, Clone, Copy)]
pub struct NamespaceSettings {
    pub lock_duration: Duration,
    pub max_delivery_count: u32,
}

impl Default for NamespaceSettings {
    fn default() -> Self {
        Self {
            lock_duration: Duration::from_secs(30),
            max_delivery_count: 10,
        }
    }
}

/// Registry of named in-memory namespaces.
#[derive(Default)]
pub struct MemoryRegistry {
    namespaces: DashMap<String, Arc<MemoryNamespace>>,
    settings: NamespaceSettings,
}

impl MemoryRegistry {
    pub fn new(settings: NamespaceSettings) -> Self {
        Self {
            namespaces: DashMap::new(),
            settings,
        }
    }

    /// Get a namespace by name, creating it on first use.
    pub fn namespace(&self, name: &str) -> Arc<MemoryNamespace> {
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryNamespace::new(name, self.settings)))
            .clone()
    }
}

/// A message moved to a dead-letter queue.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message: BrokeredMessage,
    pub reason: String,
    pub delivery_count: u32,
}

/// A blob as stored in a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub content: Vec<u8>,
    pub written_by: String,
}

/// One emulated broker namespace + blob account.
pub struct MemoryNamespace {
    name: String,
    settings: NamespaceSettings,
    available: AtomicBool,
    operations: AtomicU64,
    client_seq: AtomicU64,
    /// (topic, subscription) → subscription queue.
    subscriptions: DashMap<(String, String), Arc<Subscription>>,
    containers: DashMap<String, HashMap<String, StoredBlob>>,
}

impl MemoryNamespace {
    fn new(name: &str, settings: NamespaceSettings) -> Self {
        Self {
            name: name.to_string(),
            settings,
            available: AtomicBool::new(true),
            operations: AtomicU64::new(0),
            client_seq: AtomicU64::new(1),
            subscriptions: DashMap::new(),
            containers: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the namespace offline (every call fails) or bring it back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        tracing::debug!(namespace = %self.name, available, "Namespace availability changed");
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of client calls that reached this namespace, failed or not.
    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TransportError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.is_available() {
            Ok(())
        } else {
            Err(TransportError::Unavailable(format!("namespace '{}' is offline", self.name)))
        }
    }

    fn next_client_id(&self, kind: &str) -> String {
        let seq = self.client_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", self.name, kind, seq)
    }

    /// Get or create a subscription on a topic.
    pub fn subscription(&self, topic: &str, subscription: &str) -> Arc<Subscription> {
        self.subscriptions
            .entry((topic.to_string(), subscription.to_string()))
            .or_insert_with(|| Arc::new(Subscription::new(self.settings)))
            .clone()
    }

    fn publish(&self, topic: &str, message: BrokeredMessage) {
        let targets: Vec<Arc<Subscription>> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.key().0 == topic)
            .map(|entry| entry.value().clone())
            .collect();

        if targets.is_empty() {
            tracing::debug!(namespace = %self.name, topic, "Topic has no subscriptions, message dropped");
        }
        for subscription in targets {
            subscription.enqueue(message.clone());
        }
    }

    pub fn topic_sender(self: &Arc<Self>, topic: &str) -> MemoryTopicSender {
        MemoryTopicSender {
            namespace: self.clone(),
            topic: topic.to_string(),
            client_id: self.next_client_id("sender"),
            closed: AtomicBool::new(false),
        }
    }

    pub fn subscription_receiver(
        self: &Arc<Self>,
        topic: &str,
        subscription: &str,
    ) -> MemorySubscriptionReceiver {
        MemorySubscriptionReceiver {
            namespace: self.clone(),
            subscription: self.subscription(topic, subscription),
            client_id: self.next_client_id("receiver"),
            closed: AtomicBool::new(false),
        }
    }

    pub fn blob_client(self: &Arc<Self>) -> MemoryBlobClient {
        MemoryBlobClient {
            namespace: self.clone(),
            client_id: self.next_client_id("blob"),
            closed: AtomicBool::new(false),
        }
    }

    /// Inspect a stored blob without going through a client.
    pub fn blob(&self, container: &str, name: &str) -> Option<StoredBlob> {
        self.containers
            .get(container)
            .and_then(|blobs| blobs.get(name).cloned())
    }

    /// Store a blob directly, creating the container if needed.
    pub fn put_blob(&self, container: &str, name: &str, content: Vec<u8>) {
        self.containers.entry(container.to_string()).or_default().insert(
            name.to_string(),
            StoredBlob {
                content,
                written_by: "seed".to_string(),
            },
        );
    }
}

struct Pending {
    message: BrokeredMessage,
    delivery_count: u32,
}

struct Locked {
    pending: Pending,
    until: Instant,
}

#[derive(Default)]
struct SubscriptionState {
    available: VecDeque<Pending>,
    locked: HashMap<LockToken, Locked>,
    dead_letters: Vec<DeadLetter>,
}

/// A peek-lock message queue fed by one topic.
pub struct Subscription {
    settings: NamespaceSettings,
    state: Mutex<SubscriptionState>,
    notify: Notify,
}

impl Subscription {
    fn new(settings: NamespaceSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(SubscriptionState::default()),
            notify: Notify::new(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SubscriptionState> {
        // A panic while holding the lock leaves the queues consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a message for delivery.
    pub fn enqueue(&self, message: BrokeredMessage) {
        self.lock_state().available.push_back(Pending {
            message,
            delivery_count: 0,
        });
        self.notify.notify_one();
    }

    /// Messages waiting for delivery plus those currently locked.
    pub fn active_count(&self) -> usize {
        let state = self.lock_state();
        state.available.len() + state.locked.len()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock_state().dead_letters.clone()
    }

    fn try_take(&self, now: Instant) -> Option<ReceivedMessage> {
        let mut state = self.lock_state();

        let expired: Vec<LockToken> = state
            .locked
            .iter()
            .filter(|(_, locked)| locked.until <= now)
            .map(|(token, _)| *token)
            .collect();
        for token in expired {
            if let Some(locked) = state.locked.remove(&token) {
                state.available.push_front(locked.pending);
            }
        }

        while let Some(mut pending) = state.available.pop_front() {
            pending.delivery_count += 1;
            if pending.delivery_count > self.settings.max_delivery_count {
                state.dead_letters.push(DeadLetter {
                    message: pending.message,
                    reason: MAX_DELIVERY_EXCEEDED.to_string(),
                    delivery_count: pending.delivery_count - 1,
                });
                continue;
            }

            let lock_token = LockToken(Uuid::new_v4());
            let received = ReceivedMessage {
                message: pending.message.clone(),
                lock_token,
                delivery_count: pending.delivery_count,
            };
            state.locked.insert(
                lock_token,
                Locked {
                    pending,
                    until: now + self.settings.lock_duration,
                },
            );
            return Some(received);
        }
        None
    }

    fn next_lock_expiry(&self) -> Option<Instant> {
        self.lock_state().locked.values().map(|locked| locked.until).min()
    }

    async fn receive(&self, max_wait: Duration) -> Option<ReceivedMessage> {
        let deadline = Instant::now() + max_wait;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            if let Some(received) = self.try_take(now) {
                return Some(received);
            }
            if now >= deadline {
                return None;
            }

            let wake_at = self
                .next_lock_expiry()
                .map_or(deadline, |expiry| expiry.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    fn settle(&self, lock_token: LockToken, dead_letter_reason: Option<&str>) -> Result<(), TransportError> {
        let mut state = self.lock_state();
        match state.locked.remove(&lock_token) {
            Some(locked) if locked.until > Instant::now() => {
                if let Some(reason) = dead_letter_reason {
                    state.dead_letters.push(DeadLetter {
                        message: locked.pending.message,
                        reason: reason.to_string(),
                        delivery_count: locked.pending.delivery_count,
                    });
                }
                Ok(())
            }
            Some(locked) => {
                state.available.push_front(locked.pending);
                drop(state);
                self.notify.notify_one();
                Err(TransportError::LockLost(format!("lock {} expired", lock_token)))
            }
            None => Err(TransportError::LockLost(format!(
                "lock {} is not held by this subscription",
                lock_token
            ))),
        }
    }
}

fn ensure_open(closed: &AtomicBool) -> Result<(), TransportError> {
    if closed.load(Ordering::SeqCst) {
        Err(TransportError::Closed)
    } else {
        Ok(())
    }
}

/// Topic sender bound to one namespace.
pub struct MemoryTopicSender {
    namespace: Arc<MemoryNamespace>,
    topic: String,
    client_id: String,
    closed: AtomicBool,
}

#[async_trait]
impl TopicSender for MemoryTopicSender {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn send(&self, message: BrokeredMessage) -> Result<(), TransportError> {
        ensure_open(&self.closed)?;
        self.namespace.check()?;
        self.namespace.publish(&self.topic, message);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Subscription receiver bound to one namespace.
pub struct MemorySubscriptionReceiver {
    namespace: Arc<MemoryNamespace>,
    subscription: Arc<Subscription>,
    client_id: String,
    closed: AtomicBool,
}

#[async_trait]
impl SubscriptionReceiver for MemorySubscriptionReceiver {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn receive(&self, max_wait: Duration) -> Result<Option<ReceivedMessage>, TransportError> {
        ensure_open(&self.closed)?;
        self.namespace.check()?;
        Ok(self.subscription.receive(max_wait).await)
    }

    async fn complete(&self, lock_token: LockToken) -> Result<(), TransportError> {
        ensure_open(&self.closed)?;
        self.namespace.check()?;
        self.subscription.settle(lock_token, None)
    }

    async fn dead_letter(&self, lock_token: LockToken, reason: &str) -> Result<(), TransportError> {
        ensure_open(&self.closed)?;
        self.namespace.check()?;
        self.subscription.settle(lock_token, Some(reason))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Blob client bound to one namespace.
pub struct MemoryBlobClient {
    namespace: Arc<MemoryNamespace>,
    client_id: String,
    closed: AtomicBool,
}

#[async_trait]
impl BlobClient for MemoryBlobClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn container_exists(&self, container: &str) -> Result<bool, TransportError> {
        ensure_open(&self.closed)?;
        self.namespace.check()?;
        Ok(self.namespace.containers.contains_key(container))
    }

    async fn create_container(&self, container: &str) -> Result<(), TransportError> {
        ensure_open(&self.closed)?;
        self.namespace.check()?;
        self.namespace.containers.entry(container.to_string()).or_default();
        Ok(())
    }

    async fn download(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>, TransportError> {
        ensure_open(&self.closed)?;
        self.namespace.check()?;
        Ok(self.namespace.blob(container, name).map(|blob| blob.content))
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        content: Vec<u8>,
        written_by: &str,
    ) -> Result<(), TransportError> {
        ensure_open(&self.closed)?;
        self.namespace.check()?;
        let mut blobs = self
            .namespace
            .containers
            .get_mut(container)
            .ok_or_else(|| TransportError::Protocol(format!("container '{}' not found", container)))?;
        blobs.insert(
            name.to_string(),
            StoredBlob {
                content,
                written_by: written_by.to_string(),
            },
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace(max_delivery_count: u32) -> Arc<MemoryNamespace> {
        let registry = MemoryRegistry::new(NamespaceSettings {
            lock_duration: Duration::from_secs(5),
            max_delivery_count,
        });
        registry.namespace("test")
    }

    #[tokio::test]
    async fn test_topic_fans_out_to_subscriptions() {
        let ns = namespace(10);
        let first = ns.subscription_receiver("orders", "a");
        let second = ns.subscription_receiver("orders", "b");
        let sender = ns.topic_sender("orders");

        sender.send(BrokeredMessage::new(b"hello".to_vec())).await.unwrap();

        let a = first.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        let b = second.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(a.message.body, b"hello");
        assert_eq!(b.message.message_id, a.message.message_id);
        assert_eq!(a.delivery_count, 1);
    }

    #[tokio::test]
    async fn test_complete_removes_message() {
        let ns = namespace(10);
        let receiver = ns.subscription_receiver("t", "s");
        ns.topic_sender("t").send(BrokeredMessage::new(vec![1])).await.unwrap();

        let received = receiver.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        receiver.complete(received.lock_token).await.unwrap();

        assert_eq!(ns.subscription("t", "s").active_count(), 0);
        assert!(matches!(
            receiver.complete(received.lock_token).await,
            Err(TransportError::LockLost(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_is_redelivered_with_higher_count() {
        let ns = namespace(10);
        let receiver = ns.subscription_receiver("t", "s");
        ns.topic_sender("t").send(BrokeredMessage::new(vec![1])).await.unwrap();

        let first = receiver.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(receiver.receive(Duration::from_millis(10)).await.unwrap().is_none());

        // Waits out the 5s lock and gets the same message again.
        let second = receiver.receive(Duration::from_secs(10)).await.unwrap().unwrap();
        assert_eq!(second.message.message_id, first.message.message_id);
        assert_eq!(second.delivery_count, 2);
        assert!(matches!(
            receiver.complete(first.lock_token).await,
            Err(TransportError::LockLost(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_broker_dead_letters_after_max_deliveries() {
        let ns = namespace(2);
        let receiver = ns.subscription_receiver("t", "s");
        ns.topic_sender("t").send(BrokeredMessage::new(vec![1])).await.unwrap();

        for _ in 0..2 {
            assert!(receiver.receive(Duration::from_secs(10)).await.unwrap().is_some());
        }
        assert!(receiver.receive(Duration::from_secs(10)).await.unwrap().is_none());

        let dead = ns.subscription("t", "s").dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, MAX_DELIVERY_EXCEEDED);
    }

    #[tokio::test]
    async fn test_offline_namespace_fails_calls() {
        let ns = namespace(10);
        let sender = ns.topic_sender("t");
        ns.set_available(false);

        assert!(matches!(
            sender.send(BrokeredMessage::new(vec![])).await,
            Err(TransportError::Unavailable(_))
        ));
        assert_eq!(ns.operations(), 1);
    }

    #[tokio::test]
    async fn test_closed_client_rejects_calls() {
        let ns = namespace(10);
        let blobs = ns.blob_client();
        blobs.close().await.unwrap();
        assert_eq!(blobs.create_container("c").await, Err(TransportError::Closed));
        assert_eq!(ns.operations(), 0);
    }

    #[tokio::test]
    async fn test_upload_requires_container() {
        let ns = namespace(10);
        let blobs = ns.blob_client();

        assert!(matches!(
            blobs.upload("c", "n", vec![1], "primary").await,
            Err(TransportError::Protocol(_))
        ));

        blobs.create_container("c").await.unwrap();
        blobs.upload("c", "n", vec![1], "primary").await.unwrap();
        blobs.upload("c", "n", vec![2], "secondary").await.unwrap();

        let stored = ns.blob("c", "n").unwrap();
        assert_eq!(stored.content, vec![2]);
        assert_eq!(stored.written_by, "secondary");
    }
}
