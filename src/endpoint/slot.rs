//! Swappable endpoint handle with scoped leases.
//!
//! # Responsibilities
//! - Hold at most one live client per (component, endpoint)
//! - Lazily create the client on first use
//! - Lend the client to callers for the duration of one call
//! - Retire (close) the client only once no call is using it
//!
//! # Design Decisions
//! - Leases are read guards; retirement takes the write lock, so no caller
//!   ever observes a handle mid-teardown
//! - Guards release on every exit path, including cancellation

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::endpoint::{ClientFactory, EndpointRole, Retire};
use crate::transport::TransportError;

/// One endpoint's connection identifier plus its current handle.
pub struct EndpointSlot<H: ?Sized> {
    role: EndpointRole,
    connection: String,
    factory: Arc<dyn ClientFactory<H>>,
    handle: Arc<RwLock<Option<Arc<H>>>>,
}

impl<H: ?Sized + Retire> EndpointSlot<H> {
    /// Create an empty slot; the client is built on first lease.
    pub fn new(role: EndpointRole, connection: &str, factory: Arc<dyn ClientFactory<H>>) -> Self {
        Self {
            role,
            connection: connection.to_string(),
            factory,
            handle: Arc::new(RwLock::new(None)),
        }
    }

    pub fn role(&self) -> EndpointRole {
        self.role
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Whether a live handle currently exists.
    pub async fn is_live(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Borrow the live handle, creating it if the slot is empty.
    pub async fn lease(&self) -> Result<EndpointLease<H>, TransportError> {
        let guard = self.handle.clone().read_owned().await;
        if let Ok(guard) = OwnedRwLockReadGuard::try_map(guard, Option::as_ref) {
            return Ok(EndpointLease { guard });
        }

        let mut guard = self.handle.clone().write_owned().await;
        self.fill(&mut guard)?;
        OwnedRwLockReadGuard::try_map(OwnedRwLockWriteGuard::downgrade(guard), Option::as_ref)
            .map(|guard| EndpointLease { guard })
            .map_err(|_| TransportError::Closed)
    }

    /// Make sure a live handle exists without using it.
    pub async fn ensure(&self) -> Result<(), TransportError> {
        let mut guard = self.handle.clone().write_owned().await;
        self.fill(&mut guard)
    }

    /// Take the handle out of the slot and close it.
    ///
    /// Waits for outstanding leases to be released first. Close failures are
    /// logged, never returned.
    pub async fn retire(&self) {
        let retired = self.handle.write().await.take();
        if let Some(client) = retired {
            if let Err(e) = client.close_client().await {
                tracing::warn!(endpoint = %self.role, error = %e, "Failed to close endpoint client");
            } else {
                tracing::debug!(endpoint = %self.role, "Endpoint client closed");
            }
        }
    }

    fn fill(&self, slot: &mut Option<Arc<H>>) -> Result<(), TransportError> {
        if slot.is_none() {
            let client = self.factory.create(&self.connection)?;
            tracing::debug!(endpoint = %self.role, connection = %self.connection, "Endpoint client created");
            *slot = Some(client);
        }
        Ok(())
    }
}

/// A borrowed endpoint handle. The slot cannot retire it while this exists.
pub struct EndpointLease<H: ?Sized> {
    guard: OwnedRwLockReadGuard<Option<Arc<H>>, Arc<H>>,
}

impl<H: ?Sized> EndpointLease<H> {
    pub fn client(&self) -> &H {
        &**self.guard
    }
}

impl<H: ?Sized> Deref for EndpointLease<H> {
    type Target = H;
    fn deref(&self) -> &Self::Target {
        self.client()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::connector::Connector;
    use crate::transport::memory::{MemoryRegistry, NamespaceSettings};
    use crate::transport::BlobClient;
    use std::time::Duration;

    fn slot() -> EndpointSlot<dyn BlobClient> {
        let connector = Arc::new(Connector::new(Arc::new(MemoryRegistry::new(NamespaceSettings::default()))));
        EndpointSlot::new(EndpointRole::Primary, "memory://primary", connector.blob_factory())
    }

    #[tokio::test]
    async fn test_lease_creates_once() {
        let slot = slot();
        assert!(!slot.is_live().await);

        let first = slot.lease().await.unwrap().client_id().to_string();
        let second = slot.lease().await.unwrap().client_id().to_string();
        assert_eq!(first, second);
        assert!(slot.is_live().await);
    }

    #[tokio::test]
    async fn test_retire_then_recreate() {
        let slot = slot();
        let first = slot.lease().await.unwrap().client_id().to_string();

        slot.retire().await;
        assert!(!slot.is_live().await);

        let second = slot.lease().await.unwrap().client_id().to_string();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_retire_waits_for_outstanding_lease() {
        let slot = Arc::new(slot());
        let lease = slot.lease().await.unwrap();

        let retiring = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.retire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!retiring.is_finished());

        // Still usable while leased.
        assert!(lease.create_container("c").await.is_ok());
        drop(lease);

        retiring.await.unwrap();
        assert!(!slot.is_live().await);
    }
}
