//! Failover gateway library.
//!
//! Resilient access to a primary and an optional secondary endpoint for topic
//! messaging and blob storage, behind a small HTTP API.

pub mod admin;
pub mod config;
pub mod endpoint;
pub mod http;
pub mod lifecycle;
pub mod messaging;
pub mod observability;
pub mod resilience;
pub mod storage;
pub mod transport;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::{Gateway, Shutdown};
