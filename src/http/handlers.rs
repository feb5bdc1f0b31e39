//! Public API handlers.
//!
//! Request bodies are taken as raw bytes and parsed here so a missing or
//! malformed body gets the same JSON error shape as every other failure.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::http::response::{ApiError, READ_FAILED, SAVE_FAILED, SEND_FAILED};
use crate::http::server::AppState;
use crate::messaging::Message;
use crate::storage::BlobRecord;

const EMPTY_BODY: &str = "empty";

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveBlobRequest {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
}

fn parse_body<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Request body is required.".to_string()));
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Every consumed message, formatted for display. 204 when there are none.
pub async fn list_messages(State(state): State<AppState>) -> Response {
    let messages: Vec<String> = state
        .gateway
        .store()
        .list()
        .iter()
        .map(ToString::to_string)
        .collect();

    if messages.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(messages).into_response()
    }
}

pub async fn send_message(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let request: SendMessageRequest = parse_body(&body)?;
    let message = Message::new(or_default(request.body, EMPTY_BODY));

    state
        .gateway
        .sender()
        .send(&message)
        .await
        .map_err(|_| ApiError::Internal(SEND_FAILED))?;
    Ok(StatusCode::OK)
}

pub async fn get_blob(
    State(state): State<AppState>,
    Path((container, name)): Path<(String, String)>,
) -> Result<Json<BlobRecord>, ApiError> {
    match state.gateway.reader().get(&container, &name).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(ApiError::NotFound),
        Err(_) => Err(ApiError::Internal(READ_FAILED)),
    }
}

pub async fn save_blob(State(state): State<AppState>, body: Bytes) -> Result<Json<BlobRecord>, ApiError> {
    let request: SaveBlobRequest = parse_body(&body)?;
    let storage = &state.gateway.config().storage;
    let record = BlobRecord {
        body: or_default(request.body, EMPTY_BODY),
        name: or_default(request.name, &storage.default_blob),
        container: or_default(request.container, &storage.default_container),
    };

    state
        .gateway
        .writer()
        .upload(&record)
        .await
        .map_err(|_| ApiError::Internal(SAVE_FAILED))?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_fall_back() {
        assert_eq!(or_default(None, "d"), "d");
        assert_eq!(or_default(Some("  ".into()), "d"), "d");
        assert_eq!(or_default(Some("x".into()), "d"), "x");
    }

    #[test]
    fn test_missing_body_is_bad_request() {
        let result: Result<SendMessageRequest, _> = parse_body(&Bytes::new());
        assert!(matches!(result, Err(ApiError::BadRequest(_))));

        let parsed: SendMessageRequest = parse_body(&Bytes::from_static(b"{}")).unwrap();
        assert!(parsed.body.is_none());
    }
}
