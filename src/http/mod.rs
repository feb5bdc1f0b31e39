//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, limits)
//!     → handlers.rs (parse, apply defaults, call the gateway)
//!     → response.rs (generic error bodies)
//!     → Send to client
//! ```

pub mod handlers;
pub mod response;
pub mod server;

pub use server::{build_router, AppState, HttpServer};
