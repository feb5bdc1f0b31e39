//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every endpoint call with a deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry
//! - Timeout errors are distinct from other transport errors

use std::future::Future;
use std::time::Duration;

use crate::transport::TransportError;

/// Run an endpoint call, failing with [`TransportError::Timeout`] after `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(TransportError::Timeout(limit)))
}
