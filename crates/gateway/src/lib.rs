//! HTTP gateway: OAuth entry points, webhook endpoints, manual sync
//! triggers and the account surface, plus process configuration.

pub mod account_routes;
pub mod config;
pub mod error;
pub mod oauth_routes;
pub mod server;
pub mod state;
pub mod sync_routes;
pub mod webhook_routes;

pub use {
    config::GatewayConfig,
    server::{router, serve},
    state::AppState,
};
