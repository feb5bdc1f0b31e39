//! Destination for consumed messages.
//!
//! # Responsibilities
//! - Define the `MessageSink` seam the receiver hands decoded messages to
//! - Provide `MessageStore`, an in-process append-only store read by the API
//!
//! # Design Decisions
//! - One constant key holds the whole list; DashMap's per-entry lock makes
//!   concurrent appends safe without a global mutex
//! - No deduplication; a redelivered message is appended again

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::messaging::message::Message;

const STORE_KEY: &str = "messages";

/// Failure to accept a message. Always treated as transient by the receiver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Accepts consumed messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn accept(&self, message: Message) -> Result<(), SinkError>;
}

/// Concurrent append-only message store.
#[derive(Clone, Default)]
pub struct MessageStore {
    inner: Arc<DashMap<&'static str, Vec<Message>>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored message, oldest first.
    pub fn list(&self) -> Vec<Message> {
        self.inner
            .get(STORE_KEY)
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.get(STORE_KEY).map_or(0, |messages| messages.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageSink for MessageStore {
    async fn accept(&self, message: Message) -> Result<(), SinkError> {
        self.inner.entry(STORE_KEY).or_default().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_appends_are_kept() {
        let store = MessageStore::new();
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..50 {
            let store = store.clone();
            tasks.spawn(async move { store.accept(Message::new(i.to_string())).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert_eq!(store.len(), 50);
    }

    #[tokio::test]
    async fn test_duplicates_are_appended() {
        let store = MessageStore::new();
        assert!(store.is_empty());
        store.accept(Message::new("a")).await.unwrap();
        store.accept(Message::new("a")).await.unwrap();
        assert_eq!(store.list(), vec![Message::new("a"), Message::new("a")]);
    }
}
