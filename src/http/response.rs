//! Error responses for the public API.
//!
//! # Design Decisions
//! - Failures that exhausted both endpoints map to a generic 500; endpoint
//!   identities and transport details stay in the logs

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub const SEND_FAILED: &str = "Failed to send message.";
pub const SAVE_FAILED: &str = "Failed to save blob data.";
pub const READ_FAILED: &str = "Failed to read blob data.";

/// An API failure rendered as `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Internal(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found.".to_string()),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
