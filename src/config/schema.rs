//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the failover gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Message topic endpoints, breaker and receiver settings.
    pub messaging: MessagingConfig,

    /// Blob storage endpoints and breaker settings.
    pub storage: StorageConfig,

    /// In-memory broker emulation settings.
    pub broker: BrokerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

// An empty string in the file disables the secondary endpoint.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Circuit breaker settings shared by both send paths.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BreakerConfig {
    /// Consecutive primary failures before the breaker opens.
    pub failure_threshold: u32,

    /// How long the breaker stays open before probing primary again.
    pub open_duration_ms: u64,
}

impl BreakerConfig {
    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }
}

/// Message topic configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Primary broker connection (e.g., "memory://primary").
    pub primary: String,

    /// Optional secondary broker connection.
    pub secondary: Option<String>,

    /// Topic messages are published to.
    pub topic: String,

    /// Subscription the receiver listens on.
    pub subscription: String,

    /// Consecutive primary failures before failing over.
    pub failure_threshold: u32,

    /// Time spent on secondary before probing primary, in milliseconds.
    pub open_duration_ms: u64,

    /// Maximum in-flight message callbacks per listener.
    pub max_concurrent_calls: usize,

    /// Delivery count at which processing failures are escalated.
    pub max_delivery_count: u32,

    /// Unit multiplied by the delivery count to get the redelivery backoff.
    pub backoff_unit_ms: u64,

    /// How long a single receive call waits for a message.
    pub receive_wait_ms: u64,

    /// Pause after a listener-level transport error.
    pub reconnect_delay_ms: u64,
}

impl MessagingConfig {
    /// The secondary connection, if one is configured and non-blank.
    pub fn secondary(&self) -> Option<&str> {
        non_blank(self.secondary.as_deref())
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            open_duration_ms: self.open_duration_ms,
        }
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn receive_wait(&self) -> Duration {
        Duration::from_millis(self.receive_wait_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            primary: "memory://primary".to_string(),
            secondary: Some("memory://secondary".to_string()),
            topic: "messages".to_string(),
            subscription: "gateway".to_string(),
            failure_threshold: 1,
            open_duration_ms: 10_000,
            max_concurrent_calls: 1,
            max_delivery_count: 10,
            backoff_unit_ms: 10_000,
            receive_wait_ms: 1_000,
            reconnect_delay_ms: 1_000,
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Primary storage connection ("memory://name" or "http://host:port").
    pub primary: String,

    /// Optional secondary storage connection.
    pub secondary: Option<String>,

    /// Consecutive primary upload failures before failing over.
    pub failure_threshold: u32,

    /// Time spent on secondary before probing primary, in milliseconds.
    pub open_duration_ms: u64,

    /// Container used when a request does not name one.
    pub default_container: String,

    /// Blob name used when a request does not name one.
    pub default_blob: String,
}

impl StorageConfig {
    /// The secondary connection, if one is configured and non-blank.
    pub fn secondary(&self) -> Option<&str> {
        non_blank(self.secondary.as_deref())
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            open_duration_ms: self.open_duration_ms,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            primary: "memory://primary".to_string(),
            secondary: Some("memory://secondary".to_string()),
            failure_threshold: 1,
            open_duration_ms: 60_000,
            default_container: "default-container".to_string(),
            default_blob: "defaultblob".to_string(),
        }
    }
}

/// Settings for `memory://` namespaces.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Peek-lock duration for received messages in milliseconds.
    pub lock_duration_ms: u64,
}

impl BrokerConfig {
    pub fn lock_duration(&self) -> Duration {
        Duration::from_millis(self.lock_duration_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            lock_duration_ms: 30_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single endpoint call in seconds.
    pub operation_secs: u64,

    /// Request timeout for the HTTP surface in seconds.
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn operation(&self) -> Duration {
        Duration::from_secs(self.operation_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            operation_secs: 30,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty output for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin endpoint.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin endpoint bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
