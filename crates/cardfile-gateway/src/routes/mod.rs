//! HTTP route handlers.

pub mod accounts;
pub mod auth;
pub mod contacts;

use axum::Router;

use crate::server::AppState;

/// Assemble the `/api` surface.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(accounts::router())
        .merge(contacts::router())
}
