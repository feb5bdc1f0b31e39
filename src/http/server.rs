//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the message and blob handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit, metrics)
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::lifecycle::startup::Gateway;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// Public API server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            router: build_router(gateway),
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(gateway: Arc<Gateway>) -> Router {
    let listener = &gateway.config().listener;
    let request_timeout = Duration::from_secs(gateway.config().timeouts.request_secs);
    let body_limit = listener.max_body_size;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/message", get(handlers::list_messages).post(handlers::send_message))
        .route("/api/blob", axum::routing::post(handlers::save_blob))
        .route("/api/blob/{container}/{name}", get(handlers::get_blob))
        .layer(middleware::from_fn(track_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(AppState { gateway })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
