//! Blob storage over plain HTTP.
//!
//! # Protocol
//! ```text
//! HEAD {base}/{container}          200 → exists, 404 → missing
//! PUT  {base}/{container}          create container
//! GET  {base}/{container}/{name}   200 → body, 404 → missing
//! PUT  {base}/{container}/{name}   upload (header x-written-by)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::transport::{BlobClient, TransportError};

/// Header carrying the endpoint role that wrote a blob.
pub const WRITTEN_BY_HEADER: &str = "x-written-by";

/// Blob client for an HTTP storage endpoint.
pub struct HttpBlobClient {
    base: Url,
    client: reqwest::Client,
    client_id: String,
    closed: AtomicBool,
}

impl HttpBlobClient {
    pub fn new(base: Url) -> Self {
        let client_id = format!("http-blob-{}", base.host_str().unwrap_or("unknown"));
        Self {
            base,
            client: reqwest::Client::new(),
            client_id,
            closed: AtomicBool::new(false),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Unsupported(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    TransportError::Unavailable(e.to_string())
}

fn unexpected(status: StatusCode) -> TransportError {
    TransportError::Protocol(format!("unexpected status {}", status))
}

#[async_trait]
impl BlobClient for HttpBlobClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn container_exists(&self, container: &str) -> Result<bool, TransportError> {
        self.ensure_open()?;
        let response = self
            .client
            .head(self.url(&[container])?)
            .send()
            .await
            .map_err(request_error)?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(unexpected(status)),
        }
    }

    async fn create_container(&self, container: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let response = self
            .client
            .put(self.url(&[container])?)
            .send()
            .await
            .map_err(request_error)?;
        match response.status() {
            status if status.is_success() || status == StatusCode::CONFLICT => Ok(()),
            status => Err(unexpected(status)),
        }
    }

    async fn download(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>, TransportError> {
        self.ensure_open()?;
        let response = self
            .client
            .get(self.url(&[container, name])?)
            .send()
            .await
            .map_err(request_error)?;
        match response.status() {
            status if status.is_success() => {
                let bytes = response.bytes().await.map_err(request_error)?;
                Ok(Some(bytes.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(unexpected(status)),
        }
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        content: Vec<u8>,
        written_by: &str,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        let response = self
            .client
            .put(self.url(&[container, name])?)
            .header(WRITTEN_BY_HEADER, written_by)
            .body(content)
            .send()
            .await
            .map_err(request_error)?;
        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(unexpected(status)),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = HttpBlobClient::new(Url::parse("http://storage.local:10000/account/").unwrap());
        let url = client.url(&["photos", "cat 1.json"]).unwrap();
        assert_eq!(url.as_str(), "http://storage.local:10000/account/photos/cat%201.json");
        assert_eq!(client.client_id(), "http-blob-storage.local");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Port 9 (discard) is closed on test machines.
        let client = HttpBlobClient::new(Url::parse("http://127.0.0.1:9").unwrap());
        let result = client.download("c", "n").await;
        assert!(matches!(result, Err(TransportError::Unavailable(_))));
    }
}
