// Service modules
pub mod auth;
pub mod clickhouse;
pub mod config;
pub mod data_transfer;
pub mod db_types;
pub mod error;
pub mod sandbox;
pub mod server;
pub mod sql_utils;

#[cfg(test)]
mod test_support;

use crate::auth::TokenValidator;
use crate::clickhouse::ClickHouseConnector;
use crate::config::ServiceConfig;
use crate::data_transfer::engine::TransferEngine;
use crate::error::TransferError;
use crate::sandbox::PathSandbox;
use crate::server::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Wires the service together and serves HTTP until the listener fails.
pub async fn run(config: ServiceConfig) -> Result<(), TransferError> {
    if config.uses_default_secret() {
        log::warn!("Using default JWT secret key. Set JWT_SECRET_KEY before exposing this service.");
    }
    config.prepare_data_root()?;

    let tokens = TokenValidator::new(&config.jwt_secret);
    let connector = ClickHouseConnector::new(tokens, config.connect_timeout);
    let sandbox = PathSandbox::new(config.data_root.clone());
    let engine = TransferEngine::new(Arc::new(connector), sandbox);
    let state = Arc::new(ServerState { engine });

    let listener = TcpListener::bind(config.bind).await.map_err(|e| {
        TransferError::Config(format!("Failed to bind {}: {}", config.bind, e))
    })?;
    server::serve(listener, state).await
}
