//! Endpoint client abstractions.
//!
//! # Data Flow
//! ```text
//! Connection identifier ("memory://primary", "http://host:port")
//!     → endpoint::connector (pick implementation by scheme)
//!     → memory.rs (in-process broker + blob namespaces)
//!     → http_blob.rs (remote blob store over HTTP)
//!     → Arc<dyn TopicSender | SubscriptionReceiver | BlobClient>
//! ```
//!
//! # Design Decisions
//! - One trait per client kind, object-safe via async-trait
//! - Every client can be closed; a closed client fails every call
//! - Lock loss is its own error so receivers can tell contention from failure

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod http_blob;
pub mod memory;

/// Errors raised by an endpoint client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be reached.
    #[error("endpoint unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The client handle was closed.
    #[error("client is closed")]
    Closed,

    /// The message lock expired or is owned by another consumer.
    #[error("message lock lost: {0}")]
    LockLost(String),

    /// The connection identifier cannot produce this kind of client.
    #[error("unsupported connection '{0}'")]
    Unsupported(String),

    /// The endpoint answered with an unexpected response.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Name of the out-of-band attribute carrying the logical message type.
pub const TYPE_PROPERTY: &str = "Type";

/// A message as carried on the wire: opaque body plus string attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokeredMessage {
    pub message_id: String,
    pub body: Vec<u8>,
    pub properties: HashMap<String, String>,
}

impl BrokeredMessage {
    /// Create a message with a fresh id and no properties.
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            body,
            properties: HashMap::new(),
        }
    }

    /// Attach a string attribute.
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }
}

/// Opaque token identifying one peek-locked delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(pub Uuid);

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message handed to a consumer under a lock.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message: BrokeredMessage,
    pub lock_token: LockToken,
    /// Number of times this message has been delivered, including this one.
    pub delivery_count: u32,
}

/// Publishes messages to one topic on one endpoint.
#[async_trait]
pub trait TopicSender: Send + Sync {
    /// Identity of this client, used for logging and stamping.
    fn client_id(&self) -> &str;

    async fn send(&self, message: BrokeredMessage) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Pulls messages from one subscription on one endpoint with peek-lock semantics.
#[async_trait]
pub trait SubscriptionReceiver: Send + Sync {
    fn client_id(&self) -> &str;

    /// Wait up to `max_wait` for the next message.
    async fn receive(&self, max_wait: Duration) -> Result<Option<ReceivedMessage>, TransportError>;

    /// Acknowledge a message, removing it from the subscription.
    async fn complete(&self, lock_token: LockToken) -> Result<(), TransportError>;

    /// Move a message to the subscription's dead-letter queue.
    async fn dead_letter(&self, lock_token: LockToken, reason: &str) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Reads and writes blobs on one storage endpoint.
#[async_trait]
pub trait BlobClient: Send + Sync {
    fn client_id(&self) -> &str;

    async fn container_exists(&self, container: &str) -> Result<bool, TransportError>;

    async fn create_container(&self, container: &str) -> Result<(), TransportError>;

    /// Download a blob; `None` when it does not exist.
    async fn download(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>, TransportError>;

    /// Upload (overwrite) a blob. `written_by` tags which endpoint role wrote it.
    async fn upload(
        &self,
        container: &str,
        name: &str,
        content: Vec<u8>,
        written_by: &str,
    ) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
