//! Endpoint identity and client lifecycle.
//!
//! # Data Flow
//! ```text
//! Connection identifier
//!     → connector.rs (ClientFactory per client kind)
//!     → slot.rs (lazily created, leased, retired handles)
//!     → resilience::failover / storage::reader / messaging::receiver
//! ```
//!
//! # Design Decisions
//! - Exactly two roles: primary and secondary
//! - Handles are never shared between components; each owns its slots

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::transport::{BlobClient, SubscriptionReceiver, TopicSender, TransportError};

pub mod connector;
pub mod slot;

pub use connector::Connector;
pub use slot::{EndpointLease, EndpointSlot};

/// Which of the two redundant endpoints a handle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    Primary,
    Secondary,
}

impl EndpointRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointRole::Primary => "primary",
            EndpointRole::Secondary => "secondary",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a client of kind `H` from a connection identifier.
pub trait ClientFactory<H: ?Sized>: Send + Sync {
    fn create(&self, connection: &str) -> Result<Arc<H>, TransportError>;
}

/// Closing hook shared by every client kind, so slots can retire any of them.
#[async_trait]
pub trait Retire: Send + Sync {
    async fn close_client(&self) -> Result<(), TransportError>;
}

#[async_trait]
impl Retire for dyn TopicSender {
    async fn close_client(&self) -> Result<(), TransportError> {
        self.close().await
    }
}

#[async_trait]
impl Retire for dyn SubscriptionReceiver {
    async fn close_client(&self) -> Result<(), TransportError> {
        self.close().await
    }
}

#[async_trait]
impl Retire for dyn BlobClient {
    async fn close_client(&self) -> Result<(), TransportError> {
        self.close().await
    }
}
