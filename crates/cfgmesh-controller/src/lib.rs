//! The controller: authoritative configuration store and agent-identity
//! issuer for the cfgmesh control plane.
//!
//! Layered strictly storage → use-case → handler, mirroring the rest of
//! this lineage's services: `cfgmesh-persist`/`cfgmesh-auth` own storage,
//! `state::AppState` is the use-case surface threaded through axum, and
//! `handlers` is the thin HTTP boundary.

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds the full controller router over `state`. Split out from `main`
/// so integration tests (`cfgmesh-tests`) and unit tests in this crate can
/// exercise the real router via `tower::ServiceExt::oneshot` without
/// binding a socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register))
        .route(
            "/config",
            get(handlers::read_config).post(handlers::write_config),
        )
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/config/events", get(handlers::config_events))
        .route("/agents", get(handlers::list_agents))
        .route("/agents/{id}", get(handlers::get_agent).delete(handlers::delete_agent))
        .route("/agents/{id}/interval", put(handlers::update_interval))
        .route("/agents/{id}/token/rotate", post(handlers::rotate_token))
        .route("/audit", get(handlers::query_audit))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
