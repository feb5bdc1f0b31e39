//! Connection identifier parsing and client construction.
//!
//! # Responsibilities
//! - Parse connection identifiers by scheme
//! - Build topic senders, subscription receivers and blob clients
//! - Share `memory://` namespaces through one registry
//!
//! # Supported schemes
//! - `memory://<namespace>` — every client kind
//! - `http(s)://host[:port][/path]` — blob clients only

use std::sync::Arc;

use url::Url;

use crate::endpoint::ClientFactory;
use crate::transport::http_blob::HttpBlobClient;
use crate::transport::memory::MemoryRegistry;
use crate::transport::{BlobClient, SubscriptionReceiver, TopicSender, TransportError};

impl<H, F> ClientFactory<H> for F
where
    H: ?Sized,
    F: Fn(&str) -> Result<Arc<H>, TransportError> + Send + Sync,
{
    fn create(&self, connection: &str) -> Result<Arc<H>, TransportError> {
        self(connection)
    }
}

/// Where a connection identifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Memory(String),
    Http(Url),
}

impl Target {
    pub fn parse(connection: &str) -> Result<Self, TransportError> {
        let url = Url::parse(connection)
            .map_err(|e| TransportError::Unsupported(format!("{}: {}", connection, e)))?;

        match url.scheme() {
            "memory" => match url.host_str() {
                Some(name) if !name.is_empty() => Ok(Target::Memory(name.to_string())),
                _ => Err(TransportError::Unsupported(connection.to_string())),
            },
            "http" | "https" => Ok(Target::Http(url)),
            _ => Err(TransportError::Unsupported(connection.to_string())),
        }
    }
}

/// Creates endpoint clients for every component.
#[derive(Clone)]
pub struct Connector {
    memory: Arc<MemoryRegistry>,
}

impl Connector {
    pub fn new(memory: Arc<MemoryRegistry>) -> Self {
        Self { memory }
    }

    /// The registry backing `memory://` connections.
    pub fn memory(&self) -> &Arc<MemoryRegistry> {
        &self.memory
    }

    /// Factory for senders publishing to `topic`.
    pub fn topic_factory(&self, topic: &str) -> Arc<dyn ClientFactory<dyn TopicSender>> {
        let memory = self.memory.clone();
        let topic = topic.to_string();
        Arc::new(move |connection: &str| -> Result<Arc<dyn TopicSender>, TransportError> {
            match Target::parse(connection)? {
                Target::Memory(name) => Ok(Arc::new(memory.namespace(&name).topic_sender(&topic))),
                Target::Http(_) => Err(TransportError::Unsupported(connection.to_string())),
            }
        })
    }

    /// Factory for receivers listening on `topic`/`subscription`.
    pub fn subscription_factory(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Arc<dyn ClientFactory<dyn SubscriptionReceiver>> {
        let memory = self.memory.clone();
        let topic = topic.to_string();
        let subscription = subscription.to_string();
        Arc::new(move |connection: &str| -> Result<Arc<dyn SubscriptionReceiver>, TransportError> {
            match Target::parse(connection)? {
                Target::Memory(name) => Ok(Arc::new(
                    memory.namespace(&name).subscription_receiver(&topic, &subscription),
                )),
                Target::Http(_) => Err(TransportError::Unsupported(connection.to_string())),
            }
        })
    }

    /// Create the subscription on the endpoint ahead of any receiver, so
    /// messages published before a listener connects are retained.
    pub fn provision_subscription(
        &self,
        connection: &str,
        topic: &str,
        subscription: &str,
    ) -> Result<(), TransportError> {
        match Target::parse(connection)? {
            Target::Memory(name) => {
                self.memory.namespace(&name).subscription(topic, subscription);
                Ok(())
            }
            Target::Http(_) => Err(TransportError::Unsupported(connection.to_string())),
        }
    }

    /// Factory for blob clients.
    pub fn blob_factory(&self) -> Arc<dyn ClientFactory<dyn BlobClient>> {
        let memory = self.memory.clone();
        Arc::new(move |connection: &str| -> Result<Arc<dyn BlobClient>, TransportError> {
            match Target::parse(connection)? {
                Target::Memory(name) => Ok(Arc::new(memory.namespace(&name).blob_client())),
                Target::Http(url) => Ok(Arc::new(HttpBlobClient::new(url))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::NamespaceSettings;

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            Target::parse("memory://primary").unwrap(),
            Target::Memory("primary".to_string())
        );
        assert!(matches!(Target::parse("https://blobs.example.com"), Ok(Target::Http(_))));
        assert!(Target::parse("amqp://broker").is_err());
        assert!(Target::parse("not a url").is_err());
    }

    #[tokio::test]
    async fn test_provisioned_subscription_retains_messages() {
        let connector = Connector::new(Arc::new(MemoryRegistry::new(NamespaceSettings::default())));
        connector.provision_subscription("memory://primary", "t", "s").unwrap();
        assert!(connector.provision_subscription("http://127.0.0.1:1", "t", "s").is_err());

        let ns = connector.memory().namespace("primary");
        ns.topic_sender("t")
            .send(crate::transport::BrokeredMessage::new(b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(ns.subscription("t", "s").active_count(), 1);
    }

    #[test]
    fn test_http_rejected_for_messaging() {
        let connector = Connector::new(Arc::new(MemoryRegistry::new(NamespaceSettings::default())));
        let factory = connector.topic_factory("t");
        assert!(matches!(
            factory.create("http://localhost:1"),
            Err(TransportError::Unsupported(_))
        ));
        assert!(factory.create("memory://primary").is_ok());
    }

    #[test]
    fn test_memory_clients_share_namespace() {
        let connector = Connector::new(Arc::new(MemoryRegistry::new(NamespaceSettings::default())));
        let blobs = connector.blob_factory();
        let a = blobs.create("memory://shared").unwrap();
        let b = blobs.create("memory://shared").unwrap();
        assert_ne!(a.client_id(), b.client_id());
        assert!(a.client_id().starts_with("shared-blob-"));
        assert_eq!(connector.memory().namespace("shared").operations(), 0);
    }
}
