//! HTTP server for the chantilly online-learning service

pub mod api;
pub mod config;

pub use api::{create_router, AppState};
pub use config::ServerConfig;
