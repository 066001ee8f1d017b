//! HTTP gateway for Cardfile.
//!
//! This crate wires the identity core and the contact module to the outside
//! world:
//! - axum routes for the lifecycle and contact operations
//! - sled-backed credential and contact stores
//! - auth extractors and the error-to-status mapping
//! - a coarse per-client throttle in front of every route

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod middleware;
pub mod routes;
pub mod server;
pub mod store;

pub use middleware::{ApiError, ClientIp, ClientThrottle, RequireAuth};
pub use server::{Gateway, GatewayBuilder, GatewayConfig};
pub use store::{SledAccountStore, SledContactStore};

use thiserror::Error;

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration problem discovered at startup.
    #[error("Config error: {0}")]
    Config(String),

    /// Server runtime failure.
    #[error("Server error: {0}")]
    Server(String),

    /// Storage failure at startup.
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
