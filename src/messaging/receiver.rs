//! Subscription consumption from every configured endpoint.
//!
//! # Responsibilities
//! - Run one listener per endpoint, concurrently
//! - Bound in-flight callbacks per listener
//! - Classify each delivery and settle it accordingly
//! - Stop cleanly: cancel backoffs, drain callbacks, close handles
//!
//! # Data Flow
//! ```text
//! listener (per endpoint)
//!     → receive (peek-lock)
//!     → Pipeline::process
//!         decode failed          → dead-letter            (terminal)
//!         sink ok + complete ok  → completed
//!         complete: lock lost    → skipped                (another consumer owns it)
//!         sink / settle failed   → back off d × unit      (broker redelivers)
//! ```
//!
//! # Design Decisions
//! - Failed messages are never explicitly abandoned; the lock lapses while
//!   the callback sleeps, so redelivery is paced by the backoff
//! - Poison messages are dead-lettered immediately, no backoff
//! - Listener-level transport errors pause briefly and keep polling

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::config::MessagingConfig;
use crate::endpoint::{ClientFactory, Connector, EndpointLease, EndpointRole, EndpointSlot};
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::messaging::message::Message;
use crate::messaging::sink::{MessageSink, SinkError};
use crate::observability::metrics;
use crate::resilience::backoff::redelivery_delay;
use crate::resilience::timeouts::with_timeout;
use crate::transport::{ReceivedMessage, SubscriptionReceiver, TransportError};

/// Transient failure while handling a decoded message.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("could not settle message: {0}")]
    Settle(#[from] TransportError),
}

/// How a delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    DeadLettered,
    /// Lock lost to another consumer; nothing to do.
    Skipped,
    /// Left unacknowledged after waiting `delay`.
    Redelivered { delay: Duration },
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Disposition::Completed => "completed",
            Disposition::DeadLettered => "dead_lettered",
            Disposition::Skipped => "skipped",
            Disposition::Redelivered { .. } => "redelivered",
        }
    }
}

/// Tunables for the receive pipeline.
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub max_concurrent_calls: usize,
    pub max_delivery_count: u32,
    pub backoff_unit: Duration,
    pub receive_wait: Duration,
    pub reconnect_delay: Duration,
    pub operation_timeout: Duration,
}

impl ReceiverSettings {
    pub fn from_config(config: &MessagingConfig, operation_timeout: Duration) -> Self {
        Self {
            max_concurrent_calls: config.max_concurrent_calls.max(1),
            max_delivery_count: config.max_delivery_count,
            backoff_unit: config.backoff_unit(),
            receive_wait: config.receive_wait(),
            reconnect_delay: config.reconnect_delay(),
            operation_timeout,
        }
    }
}

/// Per-delivery processing, shared by every listener.
pub struct Pipeline {
    settings: ReceiverSettings,
    sink: Arc<dyn MessageSink>,
}

impl Pipeline {
    pub fn new(settings: ReceiverSettings, sink: Arc<dyn MessageSink>) -> Self {
        Self { settings, sink }
    }

    /// Handle one delivery from `client` end to end.
    pub async fn process(
        &self,
        role: EndpointRole,
        client: &dyn SubscriptionReceiver,
        received: ReceivedMessage,
        shutdown: &mut ShutdownSignal,
    ) -> Disposition {
        let message_id = received.message.message_id.clone();
        let delivery_count = received.delivery_count;

        let disposition = match Message::decode(&received.message) {
            Err(e) => {
                tracing::error!(
                    endpoint = %role,
                    message_id = %message_id,
                    delivery_count,
                    error = %e,
                    "Undecodable message, dead-lettering"
                );
                let reason = e.to_string();
                match self.settle(client.dead_letter(received.lock_token, &reason)).await {
                    Ok(()) => Disposition::DeadLettered,
                    Err(e) => {
                        // The broker redelivers and the next attempt dead-letters again.
                        tracing::warn!(endpoint = %role, message_id = %message_id, error = %e, "Dead-letter failed");
                        Disposition::Skipped
                    }
                }
            }
            Ok(mut message) => {
                message.receiver = client.client_id().to_string();
                match self.deliver(client, &received, message).await {
                    Ok(()) => Disposition::Completed,
                    Err(ProcessingError::Settle(TransportError::LockLost(reason))) => {
                        tracing::warn!(
                            endpoint = %role,
                            message_id = %message_id,
                            delivery_count,
                            reason = %reason,
                            "Message lock lost, another consumer owns it"
                        );
                        Disposition::Skipped
                    }
                    Err(e) => self.back_off(role, &message_id, delivery_count, &e, shutdown).await,
                }
            }
        };

        metrics::record_message(role.as_str(), disposition.as_str());
        disposition
    }

    async fn deliver(
        &self,
        client: &dyn SubscriptionReceiver,
        received: &ReceivedMessage,
        message: Message,
    ) -> Result<(), ProcessingError> {
        self.sink.accept(message).await?;
        self.settle(client.complete(received.lock_token)).await?;
        Ok(())
    }

    async fn settle<F>(&self, call: F) -> Result<(), TransportError>
    where
        F: std::future::Future<Output = Result<(), TransportError>>,
    {
        with_timeout(self.settings.operation_timeout, call).await
    }

    async fn back_off(
        &self,
        role: EndpointRole,
        message_id: &str,
        delivery_count: u32,
        error: &ProcessingError,
        shutdown: &mut ShutdownSignal,
    ) -> Disposition {
        let delay = redelivery_delay(delivery_count, self.settings.backoff_unit);
        if delivery_count >= self.settings.max_delivery_count {
            tracing::error!(
                endpoint = %role,
                message_id,
                delivery_count,
                error = %error,
                "Message processing failed at max delivery count"
            );
        } else {
            tracing::warn!(
                endpoint = %role,
                message_id,
                delivery_count,
                delay = ?delay,
                error = %error,
                "Message processing failed, will be retried"
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.recv() => {
                tracing::debug!(endpoint = %role, message_id, "Backoff cut short by shutdown");
            }
        }
        Disposition::Redelivered { delay }
    }
}

struct Running {
    shutdown: Shutdown,
    listeners: Vec<JoinHandle<()>>,
}

/// Consumes the subscription on the primary and secondary endpoints.
pub struct MessageReceiver {
    pipeline: Arc<Pipeline>,
    endpoints: Vec<(EndpointRole, String)>,
    factory: Arc<dyn ClientFactory<dyn SubscriptionReceiver>>,
    running: Mutex<Option<Running>>,
}

impl MessageReceiver {
    pub fn new(
        config: &MessagingConfig,
        connector: &Connector,
        sink: Arc<dyn MessageSink>,
        operation_timeout: Duration,
    ) -> Self {
        let mut endpoints = vec![(EndpointRole::Primary, config.primary.clone())];
        if let Some(secondary) = config.secondary() {
            endpoints.push((EndpointRole::Secondary, secondary.to_string()));
        }

        // Subscriptions exist before start() so early publishes are kept.
        for (role, connection) in &endpoints {
            if let Err(e) = connector.provision_subscription(connection, &config.topic, &config.subscription) {
                tracing::warn!(endpoint = %role, error = %e, "Could not provision subscription");
            }
        }

        Self {
            pipeline: Arc::new(Pipeline::new(
                ReceiverSettings::from_config(config, operation_timeout),
                sink,
            )),
            endpoints,
            factory: connector.subscription_factory(&config.topic, &config.subscription),
            running: Mutex::new(None),
        }
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Spawn one listener per endpoint. A second call while running is ignored.
    pub fn start(&self) {
        let mut running = self.lock_running();
        if running.is_some() {
            tracing::warn!("Message receiver already running");
            return;
        }

        let shutdown = Shutdown::new();
        let listeners = self
            .endpoints
            .iter()
            .map(|(role, connection)| {
                let listener = Listener {
                    slot: EndpointSlot::new(*role, connection, self.factory.clone()),
                    pipeline: self.pipeline.clone(),
                    shutdown: shutdown.subscribe(),
                };
                tokio::spawn(listener.run())
            })
            .collect();

        tracing::info!(endpoints = self.endpoints.len(), "Message receiver started");
        *running = Some(Running { shutdown, listeners });
    }

    /// Stop every listener and wait for in-flight callbacks. No-op if not started.
    pub async fn stop(&self) {
        let Some(running) = self.lock_running().take() else {
            return;
        };

        running.shutdown.trigger();
        for listener in running.listeners {
            if let Err(e) = listener.await {
                tracing::error!(error = %e, "Listener task failed");
            }
        }
        tracing::info!("Message receiver stopped");
    }
}

struct Listener {
    slot: EndpointSlot<dyn SubscriptionReceiver>,
    pipeline: Arc<Pipeline>,
    shutdown: ShutdownSignal,
}

impl Listener {
    async fn run(mut self) {
        let role = self.slot.role();
        let settings = self.pipeline.settings.clone();
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_calls));
        let mut callbacks = JoinSet::new();

        tracing::debug!(endpoint = %role, connection = %self.slot.connection(), "Listener started");

        loop {
            while let Some(result) = callbacks.try_join_next() {
                if let Err(e) = result {
                    tracing::error!(endpoint = %role, error = %e, "Message callback panicked");
                }
            }

            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = self.shutdown.recv() => break,
            };

            let lease = match self.slot.lease().await {
                Ok(lease) => lease,
                Err(e) => {
                    tracing::error!(endpoint = %role, error = %e, "Cannot open subscription client");
                    if self.pause(settings.reconnect_delay).await {
                        break;
                    }
                    continue;
                }
            };

            let received = tokio::select! {
                received = with_timeout(
                    settings.receive_wait + settings.operation_timeout,
                    lease.receive(settings.receive_wait),
                ) => received,
                _ = self.shutdown.recv() => break,
            };

            match received {
                Ok(Some(received)) => {
                    let pipeline = self.pipeline.clone();
                    let mut shutdown = self.shutdown.clone();
                    callbacks.spawn(async move {
                        let _permit = permit;
                        process_leased(&pipeline, role, lease, received, &mut shutdown).await;
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    drop(lease);
                    tracing::warn!(endpoint = %role, error = %e, "Receive failed");
                    if self.pause(settings.reconnect_delay).await {
                        break;
                    }
                }
            }
        }

        while let Some(result) = callbacks.join_next().await {
            if let Err(e) = result {
                tracing::error!(endpoint = %role, error = %e, "Message callback panicked");
            }
        }
        self.slot.retire().await;
        tracing::debug!(endpoint = %role, "Listener stopped");
    }

    /// Sleep before polling again; `true` if shutdown arrived meanwhile.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.shutdown.recv() => true,
        }
    }
}

async fn process_leased(
    pipeline: &Pipeline,
    role: EndpointRole,
    lease: EndpointLease<dyn SubscriptionReceiver>,
    received: ReceivedMessage,
    shutdown: &mut ShutdownSignal,
) {
    let started = Instant::now();
    let message_id = received.message.message_id.clone();
    let disposition = pipeline.process(role, lease.client(), received, shutdown).await;
    tracing::debug!(
        endpoint = %role,
        message_id = %message_id,
        disposition = disposition.as_str(),
        elapsed = ?started.elapsed(),
        "Message handled"
    );
}
