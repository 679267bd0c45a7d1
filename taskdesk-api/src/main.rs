//! taskdesk API Server Entry Point
//!
//! Bootstraps configuration, prepares the backing store and agent directory,
//! and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use taskdesk_api::constants::DEFAULT_PORT;
use taskdesk_api::telemetry::{init_tracing, TelemetryConfig};
use taskdesk_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbConfig,
    PgAgentDirectory, PgStore, StoreKind,
};
use taskdesk_storage::{ActionStore, AgentDirectory, InMemoryAgentDirectory, InMemoryStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env()?;
    let auth_config = AuthConfig::from_env()?;
    if auth_config.agents.is_empty() {
        tracing::warn!("No agents configured; every request will be rejected");
    }

    let (store, directory) = build_backends(&api_config, &auth_config).await?;
    let app: Router = create_api_router(AppState::new(store, directory, api_config));

    let addr = resolve_bind_addr()?;
    tracing::info!(
        %addr,
        service = %telemetry_config.service_name,
        version = %telemetry_config.service_version,
        "Starting taskdesk API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn build_backends(
    api_config: &ApiConfig,
    auth_config: &AuthConfig,
) -> ApiResult<(Arc<dyn ActionStore>, Arc<dyn AgentDirectory>)> {
    match api_config.store {
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            let directory = InMemoryAgentDirectory::new();
            auth_config.seed(&directory).await;
            Ok((Arc::new(InMemoryStore::new()), Arc::new(directory)))
        }
        StoreKind::Postgres => {
            let db_config = DbConfig::from_env();
            let pool = db_config.create_pool()?;
            let store = PgStore::new(pool.clone());
            store.migrate().await?;

            let directory = PgAgentDirectory::new(pool);
            for agent in &auth_config.agents {
                let credential = directory
                    .upsert(&agent.name, &agent.token_hash(), &agent.scopes)
                    .await?;
                tracing::info!(agent = %credential.name, agent_id = %credential.agent_id, "Registered agent");
            }
            Ok((Arc::new(store), Arc::new(directory)))
        }
    }
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("TASKDESK_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("TASKDESK_API_PORT").ok())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
