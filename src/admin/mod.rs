pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::get_status;
use crate::http::server::AppState;
use crate::lifecycle::startup::Gateway;

pub fn setup_admin_router(gateway: Arc<Gateway>) -> Router {
    let state = AppState { gateway };
    Router::new()
        .route("/admin/status", get(get_status))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
