//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or built-in defaults
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to lifecycle::startup, which wires every component
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; endpoint changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::GatewayConfig;
pub use schema::{
    AdminConfig, BreakerConfig, BrokerConfig, ListenerConfig, LogFormat, MessagingConfig,
    ObservabilityConfig, StorageConfig, TimeoutConfig,
};
