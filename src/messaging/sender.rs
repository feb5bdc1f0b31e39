//! Topic publication with primary/secondary failover.

use std::time::Duration;

use thiserror::Error;

use crate::config::MessagingConfig;
use crate::endpoint::{Connector, EndpointRole, EndpointSlot};
use crate::messaging::message::Message;
use crate::resilience::circuit_breaker::BreakerSnapshot;
use crate::resilience::{FailoverError, FailoverSender};
use crate::transport::TopicSender;

const COMPONENT: &str = "messages";

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Failover(#[from] FailoverError),
}

/// Publishes [`Message`]s to the configured topic.
pub struct MessageSender {
    inner: FailoverSender<dyn TopicSender>,
}

impl MessageSender {
    pub fn new(config: &MessagingConfig, connector: &Connector, timeout: Duration) -> Self {
        let factory = connector.topic_factory(&config.topic);
        let primary = EndpointSlot::new(EndpointRole::Primary, &config.primary, factory.clone());
        let secondary = config
            .secondary()
            .map(|connection| EndpointSlot::new(EndpointRole::Secondary, connection, factory));

        Self {
            inner: FailoverSender::new(COMPONENT, primary, secondary, config.breaker(), timeout),
        }
    }

    /// Publish `message`, stamping `sender` with the role of the endpoint
    /// that carries it.
    pub async fn send(&self, message: &Message) -> Result<(), SendError> {
        let primary = stamped(message, EndpointRole::Primary).encode()?;
        let mut secondary = stamped(message, EndpointRole::Secondary).encode()?;
        secondary.message_id = primary.message_id.clone();
        let message_id = primary.message_id.clone();

        self.inner
            .execute(|client, role| {
                let outgoing = match role {
                    EndpointRole::Primary => primary.clone(),
                    EndpointRole::Secondary => secondary.clone(),
                };
                async move { client.send(outgoing).await }
            })
            .await
            .inspect_err(|e| tracing::error!(message_id = %message_id, error = %e, "Message send failed"))?;

        tracing::debug!(message_id = %message_id, "Message sent");
        Ok(())
    }

    pub fn breaker(&self) -> Option<BreakerSnapshot> {
        self.inner.breaker()
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}

fn stamped(message: &Message, role: EndpointRole) -> Message {
    Message {
        sender: role.as_str().to_string(),
        ..message.clone()
    }
}
