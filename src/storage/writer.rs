//! Blob uploads with primary/secondary failover.

use std::time::Duration;

use thiserror::Error;

use crate::config::StorageConfig;
use crate::endpoint::{Connector, EndpointRole, EndpointSlot};
use crate::resilience::circuit_breaker::BreakerSnapshot;
use crate::resilience::{FailoverError, FailoverSender};
use crate::storage::blob::BlobRecord;
use crate::transport::BlobClient;

const COMPONENT: &str = "blobs";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to encode blob: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Failover(#[from] FailoverError),
}

/// Writes [`BlobRecord`]s, creating the container on first use.
pub struct BlobWriter {
    inner: FailoverSender<dyn BlobClient>,
}

impl BlobWriter {
    pub fn new(config: &StorageConfig, connector: &Connector, timeout: Duration) -> Self {
        let factory = connector.blob_factory();
        let primary = EndpointSlot::new(EndpointRole::Primary, &config.primary, factory.clone());
        let secondary = config
            .secondary()
            .map(|connection| EndpointSlot::new(EndpointRole::Secondary, connection, factory));

        Self {
            inner: FailoverSender::new(COMPONENT, primary, secondary, config.breaker(), timeout),
        }
    }

    /// Upload `record`, overwriting any blob with the same identity.
    /// The endpoint that stored it is tagged as the blob's writer.
    pub async fn upload(&self, record: &BlobRecord) -> Result<(), UploadError> {
        let content = record.to_bytes()?;

        self.inner
            .execute(|client, role| {
                let container = record.container.clone();
                let name = record.name.clone();
                let content = content.clone();
                async move {
                    if !client.container_exists(&container).await? {
                        client.create_container(&container).await?;
                        tracing::info!(endpoint = %role, container = %container, "Container created");
                    }
                    client.upload(&container, &name, content, role.as_str()).await
                }
            })
            .await
            .inspect_err(|e| {
                tracing::error!(
                    container = %record.container,
                    name = %record.name,
                    error = %e,
                    "Blob upload failed"
                )
            })?;

        tracing::debug!(container = %record.container, name = %record.name, "Blob uploaded");
        Ok(())
    }

    pub fn breaker(&self) -> Option<BreakerSnapshot> {
        self.inner.breaker()
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryRegistry, NamespaceSettings};
    use std::sync::Arc;

    fn writer(config: &StorageConfig) -> (BlobWriter, Arc<MemoryRegistry>) {
        let registry = Arc::new(MemoryRegistry::new(NamespaceSettings::default()));
        let writer = BlobWriter::new(config, &Connector::new(registry.clone()), Duration::from_secs(1));
        (writer, registry)
    }

    #[tokio::test]
    async fn test_upload_creates_container_and_overwrites() {
        let (writer, registry) = writer(&StorageConfig::default());

        writer.upload(&BlobRecord::new("photos", "a", "one")).await.unwrap();
        writer.upload(&BlobRecord::new("photos", "a", "two")).await.unwrap();

        let stored = registry.namespace("primary").blob("photos", "a").unwrap();
        assert_eq!(BlobRecord::from_bytes(&stored.content).unwrap().body, "two");
        assert_eq!(stored.written_by, "primary");
    }

    #[tokio::test]
    async fn test_primary_failure_writes_secondary() {
        let (writer, registry) = writer(&StorageConfig::default());
        registry.namespace("primary").set_available(false);

        writer.upload(&BlobRecord::new("c", "n", "x")).await.unwrap();

        let stored = registry.namespace("secondary").blob("c", "n").unwrap();
        assert_eq!(stored.written_by, "secondary");
        assert!(registry.namespace("primary").blob("c", "n").is_none());
    }

    #[tokio::test]
    async fn test_without_secondary_errors_propagate() {
        let config = StorageConfig {
            secondary: None,
            ..StorageConfig::default()
        };
        let (writer, registry) = writer(&config);
        registry.namespace("primary").set_available(false);

        let result = writer.upload(&BlobRecord::new("c", "n", "x")).await;
        assert!(matches!(result, Err(UploadError::Failover(FailoverError::Primary(_)))));
        assert!(writer.breaker().is_none());
    }
}
