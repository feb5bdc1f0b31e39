//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! senders, reader, receiver, http:
//!     → logging.rs (structured log events: endpoint, message id, delivery count)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields over formatted strings
//! - Endpoint identities appear in logs, never in HTTP responses

pub mod logging;
pub mod metrics;
