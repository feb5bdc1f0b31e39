//! Message envelope and wire encoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{BrokeredMessage, TYPE_PROPERTY};

/// Value of the `Type` attribute on every message this gateway publishes.
pub const MESSAGE_TYPE: &str = "Message";

/// Why a brokered message could not be turned into a [`Message`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message has no 'Type' attribute")]
    MissingType,

    #[error("unexpected message type '{0}'")]
    UnexpectedType(String),

    #[error("invalid message body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Application message exchanged through the topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub body: String,
    /// Endpoint role that published the message.
    #[serde(default)]
    pub sender: String,
    /// Client that consumed the message.
    #[serde(default)]
    pub receiver: String,
}

impl Message {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Encode as a brokered message tagged with [`MESSAGE_TYPE`].
    pub fn encode(&self) -> Result<BrokeredMessage, serde_json::Error> {
        let body = serde_json::to_vec(self)?;
        Ok(BrokeredMessage::new(body).with_property(TYPE_PROPERTY, MESSAGE_TYPE))
    }

    /// Decode a brokered message, checking its type tag first.
    pub fn decode(message: &BrokeredMessage) -> Result<Self, DecodeError> {
        match message.properties.get(TYPE_PROPERTY) {
            None => Err(DecodeError::MissingType),
            Some(kind) if kind != MESSAGE_TYPE => Err(DecodeError::UnexpectedType(kind.clone())),
            Some(_) => Ok(serde_json::from_slice(&message.body)?),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sender: {} Receiver: {} Body: {}", self.sender, self.receiver, self.body)
    }
}
