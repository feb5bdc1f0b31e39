//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Write to an endpoint:
//!     → failover.rs (primary through the breaker, then secondary)
//!     → circuit_breaker.rs (track failures, trip, probe, reset)
//!     → timeouts.rs (deadline on every attempt)
//!
//! Consumed message failed:
//!     → backoff.rs (linear redelivery delay)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every endpoint call has a deadline
//! - No retries on the same endpoint; fallback is the only recovery on writes
//! - Circuit breaker keeps a broken primary from adding latency to every call

pub mod backoff;
pub mod circuit_breaker;
pub mod failover;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitState, TransitionHandler};
pub use failover::{FailoverError, FailoverSender};
