//! Blob reads with primary-then-secondary fallback.
//!
//! No breaker and no failover state: every read tries the primary first.

use std::time::Duration;

use thiserror::Error;

use crate::config::StorageConfig;
use crate::endpoint::{Connector, EndpointRole, EndpointSlot};
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::storage::blob::BlobRecord;
use crate::transport::{BlobClient, TransportError};

#[derive(Debug, Error)]
pub enum ReadError {
    /// The endpoint returned bytes that are not a blob record.
    #[error("stored blob {container}/{name} is not a valid record: {source}")]
    Corrupt {
        container: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("blob read failed on {attempts} endpoint(s), last error: {last}")]
    Exhausted { attempts: usize, last: TransportError },
}

/// Reads [`BlobRecord`]s from whichever endpoint answers first.
pub struct BlobReader {
    endpoints: Vec<EndpointSlot<dyn BlobClient>>,
    timeout: Duration,
}

impl BlobReader {
    pub fn new(config: &StorageConfig, connector: &Connector, timeout: Duration) -> Self {
        let factory = connector.blob_factory();
        let mut endpoints = vec![EndpointSlot::new(EndpointRole::Primary, &config.primary, factory.clone())];
        if let Some(secondary) = config.secondary() {
            endpoints.push(EndpointSlot::new(EndpointRole::Secondary, secondary, factory));
        }
        Self { endpoints, timeout }
    }

    /// Fetch a blob. `Ok(None)` when the answering endpoint does not have it.
    pub async fn get(&self, container: &str, name: &str) -> Result<Option<BlobRecord>, ReadError> {
        let mut last = None;

        for slot in &self.endpoints {
            let role = slot.role();
            let result = with_timeout(self.timeout, async {
                let client = slot.lease().await?;
                client.download(container, name).await
            })
            .await;

            match result {
                Ok(Some(bytes)) => {
                    metrics::record_blob_read(role.as_str(), "hit");
                    return BlobRecord::from_bytes(&bytes).map(Some).map_err(|source| {
                        tracing::error!(endpoint = %role, container, name, error = %source, "Stored blob is corrupt");
                        ReadError::Corrupt {
                            container: container.to_string(),
                            name: name.to_string(),
                            source,
                        }
                    });
                }
                Ok(None) => {
                    metrics::record_blob_read(role.as_str(), "missing");
                    tracing::debug!(endpoint = %role, container, name, "Blob not found");
                    return Ok(None);
                }
                Err(e) => {
                    metrics::record_blob_read(role.as_str(), "failure");
                    tracing::warn!(endpoint = %role, container, name, error = %e, "Blob read failed, trying next endpoint");
                    last = Some(e);
                }
            }
        }

        Err(ReadError::Exhausted {
            attempts: self.endpoints.len(),
            last: last.unwrap_or(TransportError::Unavailable("no endpoints configured".to_string())),
        })
    }

    pub async fn close(&self) {
        for slot in &self.endpoints {
            slot.retire().await;
        }
    }
}
