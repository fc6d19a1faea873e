//! HTTP surface: run control REST endpoints plus the WebSocket streaming
//! endpoint.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::{client_session, ClientSink};
use crate::AppState;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use runboard_core::Error;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Build the dashboard router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/run", get(get_run))
        .route("/api/run/start", post(start_run))
        .route("/api/run/cancel", post(cancel_run))
        .route("/api/scenarios", get(get_scenarios))
        .route("/api/snapshot", get(get_snapshot))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": runboard_core::VERSION }))
}

async fn get_run(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.run())
}

async fn get_scenarios(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.scenarios())
}

async fn get_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.snapshot())
}

async fn start_run(State(state): State<AppState>) -> impl IntoResponse {
    match state.supervisor.spawn(state.runner.clone()).await {
        Ok(run_id) => (StatusCode::ACCEPTED, Json(json!({ "run_id": run_id }))),
        Err(Error::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": Error::AlreadyRunning.to_string() })),
        ),
        Err(e) => {
            warn!(error = %e, "run start failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn cancel_run(State(state): State<AppState>) -> impl IntoResponse {
    match state.supervisor.cancel().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            warn!(error = %e, "run cancel failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// WebSocket adapter over the transport session
struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ClientSink for WsSink {
    async fn send(&mut self, msg: ServerMessage) -> anyhow::Result<()> {
        let text = serde_json::to_string(&msg)?;
        self.sender.send(Message::Text(text)).await?;
        Ok(())
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    let (resync_tx, resync_rx) = mpsc::channel(4);

    // Read side: forward resync requests; dropping the channel on close
    // ends the session.
    tokio::spawn(read_client(receiver, resync_tx));

    let mut sink = WsSink { sender };
    match client_session(&state.store, &mut sink, resync_rx, &state.transport).await {
        Ok(end) => debug!(?end, "client session ended"),
        Err(e) => debug!(error = %e, "client session ended with error"),
    }
    let _ = sink.sender.close().await;
}

async fn read_client(mut receiver: SplitStream<WebSocket>, resync_tx: mpsc::Sender<()>) {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Resync) => {
                    if resync_tx.send(()).await.is_err() {
                        break;
                    }
                }
                Err(e) => debug!(error = %e, "ignoring unrecognized client message"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "client read error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportConfig;
    use runboard_core::store::{RunStore, StoreConfig};
    use runboard_core::supervisor::{ProcessSupervisor, RunnerCommand, SupervisorConfig};

    #[tokio::test]
    async fn test_router_builds() {
        let store = RunStore::new(StoreConfig::default());
        let supervisor = ProcessSupervisor::new(store.clone(), SupervisorConfig::default());
        let state = AppState {
            store,
            supervisor,
            runner: RunnerCommand::shell("exit 0"),
            transport: TransportConfig::default(),
        };
        let _router = router(state);
    }
}
