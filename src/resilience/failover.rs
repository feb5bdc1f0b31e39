//! Primary-with-fallback execution for write paths.
//!
//! # Responsibilities
//! - Run an operation against the primary endpoint through a circuit breaker
//! - Fall back to the secondary endpoint on any primary failure
//! - Switch live handles when the breaker trips and when it probes
//!
//! # Data Flow
//! ```text
//! execute(op)
//!     → no secondary configured: primary only, errors propagate
//!     → breaker.call(primary lease → op)
//!         ok                → done
//!         failed / open     → secondary lease → op (no breaker)
//! ```
//!
//! # Design Decisions
//! - The secondary is deliberately unprotected: it is the last resort
//! - Once open, traffic stays on the secondary until a probe succeeds
//! - Every attempt has a deadline; a lease never outlives its attempt

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::BreakerConfig;
use crate::endpoint::{EndpointLease, EndpointRole, EndpointSlot, Retire};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerError, BreakerSnapshot, CircuitBreaker, TransitionHandler};
use crate::resilience::timeouts::with_timeout;
use crate::transport::TransportError;

/// A send that no endpoint accepted.
#[derive(Debug, Error)]
pub enum FailoverError {
    /// Only a primary is configured and it failed.
    #[error("primary endpoint failed: {0}")]
    Primary(TransportError),

    /// Primary and secondary both failed.
    #[error("all endpoints failed (primary: {primary}, secondary: {secondary})")]
    Exhausted {
        primary: BreakerError<TransportError>,
        secondary: TransportError,
    },
}

/// Moves live handles between endpoints as the breaker changes state.
struct SlotSwitcher<H: ?Sized> {
    component: &'static str,
    primary: Arc<EndpointSlot<H>>,
    secondary: Arc<EndpointSlot<H>>,
}

#[async_trait]
impl<H: ?Sized + Retire + 'static> TransitionHandler for SlotSwitcher<H> {
    async fn on_break(&self, reason: &str) {
        tracing::warn!(component = self.component, reason, "Primary endpoint broken, switching to secondary");
        self.primary.retire().await;
        if let Err(e) = self.secondary.ensure().await {
            tracing::warn!(component = self.component, error = %e, "Could not open secondary endpoint");
        }
    }

    async fn on_half_open(&self) {
        tracing::info!(component = self.component, "Probing primary endpoint");
        if let Err(e) = self.primary.ensure().await {
            tracing::warn!(component = self.component, error = %e, "Could not reopen primary endpoint");
        }
        self.secondary.retire().await;
    }

    async fn on_reset(&self) {
        tracing::info!(component = self.component, "Primary endpoint recovered");
    }
}

struct Fallback<H: ?Sized> {
    slot: Arc<EndpointSlot<H>>,
    breaker: CircuitBreaker,
}

/// Sends through the primary endpoint, falling back to the secondary.
pub struct FailoverSender<H: ?Sized> {
    component: &'static str,
    primary: Arc<EndpointSlot<H>>,
    fallback: Option<Fallback<H>>,
    timeout: Duration,
}

impl<H: ?Sized + Retire + 'static> FailoverSender<H> {
    /// `component` names this sender in logs, metrics and breaker state.
    pub fn new(
        component: &'static str,
        primary: EndpointSlot<H>,
        secondary: Option<EndpointSlot<H>>,
        breaker: BreakerConfig,
        timeout: Duration,
    ) -> Self {
        let primary = Arc::new(primary);
        let fallback = secondary.map(|secondary| {
            let slot = Arc::new(secondary);
            let switcher = SlotSwitcher {
                component,
                primary: primary.clone(),
                secondary: slot.clone(),
            };
            Fallback {
                slot,
                breaker: CircuitBreaker::new(component, breaker, Arc::new(switcher)),
            }
        });

        Self {
            component,
            primary,
            fallback,
            timeout,
        }
    }

    /// Breaker state; `None` when no secondary is configured.
    pub fn breaker(&self) -> Option<BreakerSnapshot> {
        self.fallback.as_ref().map(|fallback| fallback.breaker.snapshot())
    }

    /// Run `op` against the primary, or the secondary if the primary fails.
    ///
    /// `op` receives the leased client and the role it belongs to, so each
    /// attempt can stamp its endpoint identity.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, FailoverError>
    where
        F: Fn(EndpointLease<H>, EndpointRole) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let Some(fallback) = &self.fallback else {
            return self.attempt(&self.primary, &op).await.map_err(FailoverError::Primary);
        };

        let primary = match fallback.breaker.call(|| self.attempt(&self.primary, &op)).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        match &primary {
            BreakerError::Open => {
                tracing::debug!(component = self.component, "Primary circuit open, using secondary");
            }
            BreakerError::Inner(e) => {
                tracing::warn!(component = self.component, error = %e, "Primary endpoint failed, using secondary");
            }
        }

        self.attempt(&fallback.slot, &op)
            .await
            .map_err(|secondary| FailoverError::Exhausted { primary, secondary })
    }

    async fn attempt<T, F, Fut>(&self, slot: &EndpointSlot<H>, op: &F) -> Result<T, TransportError>
    where
        F: Fn(EndpointLease<H>, EndpointRole) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let role = slot.role();
        let result = with_timeout(self.timeout, async {
            let lease = slot.lease().await?;
            op(lease, role).await
        })
        .await;

        match &result {
            Ok(_) => metrics::record_send(self.component, role.as_str(), "success"),
            Err(e) => {
                tracing::debug!(component = self.component, endpoint = %role, error = %e, "Send attempt failed");
                metrics::record_send(self.component, role.as_str(), "failure");
            }
        }
        result
    }

    /// Close every live handle.
    pub async fn close(&self) {
        self.primary.retire().await;
        if let Some(fallback) = &self.fallback {
            fallback.slot.retire().await;
        }
    }
}
