//! Circuit breaker guarding the primary endpoint.
//!
//! # States
//! - Closed: calls pass through
//! - Open: endpoint assumed down, calls fail fast
//! - Half-Open: one probe call tests whether the endpoint recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold   (on_break)
//! Open → Half-Open: open_duration elapsed, next caller probes (on_half_open)
//! Half-Open → Closed: probe succeeds                          (on_reset)
//! Half-Open → Open: probe fails or is cancelled               (on_break)
//! ```
//!
//! # Design Decisions
//! - State lives under a plain mutex and is never held across an await
//! - Only the caller that performs a transition runs its hook; hooks are
//!   serialized by a separate async lock so they observe transitions in order
//! - Single probe in Half-Open; everyone else fails fast until it settles
//! - A cancelled probe drops back to Open, never stays Half-Open
//! - Every transition bumps a generation; outcomes of calls admitted under an
//!   earlier generation are ignored

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Breaker state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Outcome of a call made through the breaker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// The call was rejected without running.
    #[error("circuit is open")]
    Open,

    /// The call ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Reacts to breaker transitions. Hooks must not fail and must tolerate
/// being called again for the same state.
#[async_trait]
pub trait TransitionHandler: Send + Sync {
    async fn on_break(&self, reason: &str);
    async fn on_half_open(&self);
    async fn on_reset(&self);
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub open_duration_ms: u64,
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    generation: u64,
}

enum Gate {
    Pass(u64),
    Probe,
    Reject,
}

enum Admission<'a> {
    /// Admitted while Closed under the given generation.
    Pass(u64),
    /// Holds the transition lock until `on_half_open` has run.
    Probe(tokio::sync::MutexGuard<'a, ()>),
}

/// Consecutive-failure circuit breaker.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    open_duration: Duration,
    state: Mutex<BreakerState>,
    transitions: tokio::sync::Mutex<()>,
    handler: Arc<dyn TransitionHandler>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: BreakerConfig, handler: Arc<dyn TransitionHandler>) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold: config.failure_threshold.max(1),
            open_duration: config.open_duration(),
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                generation: 0,
            }),
            transitions: tokio::sync::Mutex::new(()),
            handler,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock_state().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock_state();
        BreakerSnapshot {
            state: state.state,
            consecutive_failures: state.consecutive_failures,
            failure_threshold: self.failure_threshold,
            open_duration_ms: self.open_duration.as_millis() as u64,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` under the breaker.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let Some(admission) = self.admit().await else {
            return Err(BreakerError::Open);
        };
        match admission {
            Admission::Pass(generation) => {
                let result = f().await;
                match result {
                    Ok(value) => {
                        self.record_success(generation);
                        Ok(value)
                    }
                    Err(e) => {
                        self.record_failure(&e.to_string(), generation).await;
                        Err(BreakerError::Inner(e))
                    }
                }
            }
            Admission::Probe(transition) => {
                let mut probe = ProbeGuard::new(self);
                self.handler.on_half_open().await;
                drop(transition);

                let result = f().await;
                let _transition = self.transitions.lock().await;
                probe.settled();
                match result {
                    Ok(value) => {
                        self.close();
                        self.handler.on_reset().await;
                        Ok(value)
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        self.open(&reason);
                        self.handler.on_break(&reason).await;
                        Err(BreakerError::Inner(e))
                    }
                }
            }
        }
    }

    /// `None` when the call must be rejected.
    async fn admit(&self) -> Option<Admission<'_>> {
        match self.gate() {
            Gate::Reject => return None,
            Gate::Pass(generation) => return Some(Admission::Pass(generation)),
            Gate::Probe => {}
        }

        // Recheck under the transition lock; a racing caller may have won.
        let transition = self.transitions.lock().await;
        let mut state = self.lock_state();
        match state.state {
            CircuitState::Closed => Some(Admission::Pass(state.generation)),
            CircuitState::HalfOpen => None,
            CircuitState::Open => {
                let elapsed = state.opened_at.map_or(true, |at| at.elapsed() >= self.open_duration);
                if !elapsed {
                    return None;
                }
                state.state = CircuitState::HalfOpen;
                drop(state);
                tracing::info!(breaker = %self.name, "Circuit half-open, probing");
                metrics::record_breaker_transition(&self.name, CircuitState::HalfOpen.as_str());
                Some(Admission::Probe(transition))
            }
        }
    }

    /// Fast path without the transition lock.
    fn gate(&self) -> Gate {
        let state = self.lock_state();
        match state.state {
            CircuitState::Closed => Gate::Pass(state.generation),
            CircuitState::HalfOpen => Gate::Reject,
            CircuitState::Open => match state.opened_at {
                Some(at) if at.elapsed() < self.open_duration => Gate::Reject,
                _ => Gate::Probe,
            },
        }
    }

    fn record_success(&self, generation: u64) {
        let mut state = self.lock_state();
        if state.state == CircuitState::Closed && state.generation == generation {
            state.consecutive_failures = 0;
        }
    }

    async fn record_failure(&self, reason: &str, generation: u64) {
        let _transition = self.transitions.lock().await;
        let tripped = {
            let mut state = self.lock_state();
            if state.generation != generation {
                tracing::debug!(breaker = %self.name, reason, "Ignoring failure from an earlier circuit generation");
                return;
            }
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.state == CircuitState::Closed && state.consecutive_failures >= self.failure_threshold
        };
        if tripped {
            self.open(reason);
            self.handler.on_break(reason).await;
        }
    }

    fn open(&self, reason: &str) {
        let failures = {
            let mut state = self.lock_state();
            state.state = CircuitState::Open;
            state.opened_at = Some(Instant::now());
            state.generation += 1;
            state.consecutive_failures
        };
        tracing::warn!(
            breaker = %self.name,
            consecutive_failures = failures,
            open_for = ?self.open_duration,
            reason,
            "Circuit opened"
        );
        metrics::record_breaker_transition(&self.name, CircuitState::Open.as_str());
    }

    fn close(&self) {
        {
            let mut state = self.lock_state();
            state.state = CircuitState::Closed;
            state.consecutive_failures = 0;
            state.opened_at = None;
            state.generation += 1;
        }
        tracing::info!(breaker = %self.name, "Circuit closed");
        metrics::record_breaker_transition(&self.name, CircuitState::Closed.as_str());
    }
}

/// Returns the breaker to Open if a probe is dropped before it settles.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl<'a> ProbeGuard<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self { breaker, armed: true }
    }

    fn settled(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.breaker.lock_state();
        if state.state == CircuitState::HalfOpen {
            state.state = CircuitState::Open;
            state.opened_at = Some(Instant::now());
            state.generation += 1;
            drop(state);
            tracing::warn!(breaker = %self.breaker.name, "Probe abandoned, circuit reopened");
            metrics::record_breaker_transition(&self.breaker.name, CircuitState::Open.as_str());
        }
    }
}
