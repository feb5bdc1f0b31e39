//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate connection identifiers per resource kind
//! - Validate value ranges (thresholds, durations, concurrency > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, MessagingConfig, StorageConfig};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} '{value}' is not a valid connection: {reason}")]
    InvalidConnection {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} must differ from the primary connection")]
    SameAsPrimary { field: &'static str },
}

/// Resource kinds differ in which connection schemes they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Messaging,
    Storage,
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_messaging(&config.messaging, &mut errors);
    validate_storage(&config.storage, &mut errors);

    if config.broker.lock_duration_ms == 0 {
        errors.push(ValidationError::NotPositive { field: "broker.lock_duration_ms" });
    }
    if config.timeouts.operation_secs == 0 {
        errors.push(ValidationError::NotPositive { field: "timeouts.operation_secs" });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::NotPositive { field: "timeouts.request_secs" });
    }
    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "admin.api_key" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Render a list of problems on one line.
pub fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn validate_messaging(config: &MessagingConfig, errors: &mut Vec<ValidationError>) {
    check_connection("messaging.primary", &config.primary, Resource::Messaging, errors);
    if let Some(secondary) = config.secondary() {
        check_connection("messaging.secondary", secondary, Resource::Messaging, errors);
        if secondary == config.primary {
            errors.push(ValidationError::SameAsPrimary { field: "messaging.secondary" });
        }
    }

    if config.topic.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "messaging.topic" });
    }
    if config.subscription.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "messaging.subscription" });
    }

    let positive = [
        ("messaging.failure_threshold", config.failure_threshold as u64),
        ("messaging.open_duration_ms", config.open_duration_ms),
        ("messaging.max_concurrent_calls", config.max_concurrent_calls as u64),
        ("messaging.max_delivery_count", config.max_delivery_count as u64),
        ("messaging.receive_wait_ms", config.receive_wait_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }
}

fn validate_storage(config: &StorageConfig, errors: &mut Vec<ValidationError>) {
    check_connection("storage.primary", &config.primary, Resource::Storage, errors);
    if let Some(secondary) = config.secondary() {
        check_connection("storage.secondary", secondary, Resource::Storage, errors);
        if secondary == config.primary {
            errors.push(ValidationError::SameAsPrimary { field: "storage.secondary" });
        }
    }

    if config.default_container.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "storage.default_container" });
    }
    if config.default_blob.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "storage.default_blob" });
    }
    if config.failure_threshold == 0 {
        errors.push(ValidationError::NotPositive { field: "storage.failure_threshold" });
    }
    if config.open_duration_ms == 0 {
        errors.push(ValidationError::NotPositive { field: "storage.open_duration_ms" });
    }
}

fn check_connection(
    field: &'static str,
    value: &str,
    resource: Resource,
    errors: &mut Vec<ValidationError>,
) {
    if value.trim().is_empty() {
        errors.push(ValidationError::Empty { field });
        return;
    }

    let invalid = |reason: String| ValidationError::InvalidConnection {
        field,
        value: value.to_string(),
        reason,
    };

    let url = match Url::parse(value) {
        Ok(url) => url,
        Err(e) => {
            errors.push(invalid(e.to_string()));
            return;
        }
    };

    match (url.scheme(), resource) {
        ("memory", _) => {
            if url.host_str().map_or(true, str::is_empty) {
                errors.push(invalid("memory connections need a namespace name".to_string()));
            }
        }
        ("http" | "https", Resource::Storage) => {}
        ("http" | "https", Resource::Messaging) => {
            errors.push(invalid("http endpoints only serve blob storage".to_string()));
        }
        (scheme, _) => errors.push(invalid(format!("unsupported scheme '{}'", scheme))),
    }
}
