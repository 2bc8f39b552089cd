//! Taleforge delivery layer: player actions over HTTP and the combat
//! protocol over WebSocket.

pub mod config;
pub mod error;
pub mod hub;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

/// Builds the router with every route mounted.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest(
            "/api/v1/campaigns",
            routes::actions::router().merge(routes::combat::router()),
        )
        .with_state(state)
}
