//! Stateless worker: holds the currently-active configuration in memory
//! and serves request-handling endpoints that read it.

#![forbid(unsafe_code)]

use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub mod cell;
pub mod config;
pub mod error;
pub mod handlers;

pub use handlers::WorkerState;

/// Builds the worker's router. No authentication: `/config` is deployed on
/// a private network reachable only from the agent (§6).
pub fn router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/config", post(handlers::write_config))
        .route("/hit", get(handlers::hit))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
