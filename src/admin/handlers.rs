use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::circuit_breaker::BreakerSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub messaging: ComponentStatus,
    pub storage: ComponentStatus,
    pub receiver_running: bool,
    pub stored_messages: usize,
}

#[derive(Serialize)]
pub struct ComponentStatus {
    pub primary: String,
    pub secondary: Option<String>,
    /// Absent when no secondary is configured (no breaker).
    pub breaker: Option<BreakerSnapshot>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let gateway = &state.gateway;
    let config = gateway.config();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        messaging: ComponentStatus {
            primary: config.messaging.primary.clone(),
            secondary: config.messaging.secondary().map(str::to_string),
            breaker: gateway.sender().breaker(),
        },
        storage: ComponentStatus {
            primary: config.storage.primary.clone(),
            secondary: config.storage.secondary().map(str::to_string),
            breaker: gateway.writer().breaker(),
        },
        receiver_running: gateway.receiver().is_running(),
        stored_messages: gateway.store().len(),
    })
}
