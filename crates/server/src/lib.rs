//! Runboard Server Library
//!
//! The dashboard's network surface: a small REST control surface for
//! starting and cancelling runs, and a WebSocket streaming transport that
//! delivers store state to browsers snapshot-first, then incrementally.

pub mod protocol;
pub mod routes;
pub mod transport;

use runboard_core::store::RunStore;
use runboard_core::supervisor::{ProcessSupervisor, RunnerCommand};
use std::net::SocketAddr;
use tracing::info;
use transport::TransportConfig;

/// Shared server state, injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub store: RunStore,
    pub supervisor: ProcessSupervisor,
    /// The runner invocation used for every started run
    pub runner: RunnerCommand,
    pub transport: TransportConfig,
}

/// Bind and serve the dashboard until the task is dropped
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Runboard dashboard listening on http://{}", listener.local_addr()?);
    axum::serve(listener, routes::router(state)).await?;
    Ok(())
}
