//! WebSocket + REST endpoints for the agent.
//!
//! WS clients get a full task snapshot on connect, then a live stream of
//! agent events; a lagging client is resynced with a fresh snapshot.

use std::sync::Arc;

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
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::notify::{AgentEvent, Notifier};
use crate::store::Database;
use crate::task::{LifecycleManager, TaskRecord};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LifecycleManager>,
    pub store: Arc<dyn Database>,
    pub notifier: Arc<Notifier>,
}

/// Build the Axum router with WebSocket and REST routes.
pub fn agent_routes(
    manager: Arc<LifecycleManager>,
    store: Arc<dyn Database>,
    notifier: Arc<Notifier>,
) -> Router {
    let state = AppState {
        manager,
        store,
        notifier,
    };

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/tasks", get(list_tasks))
        .route("/api/generate", post(generate))
        .route("/api/chat/history", get(chat_history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "image-agent"
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Snapshot of all tasks, newest first for display.
async fn task_snapshot(store: &Arc<dyn Database>) -> Vec<TaskRecord> {
    let mut tasks = store.list_tasks().await.unwrap_or_default();
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    tasks
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("WebSocket client connected");
    let (mut sender, mut receiver) = socket.split();

    // Send the full task list on connect.
    let sync = AgentEvent::TasksSync {
        tasks: task_snapshot(&state.store).await,
    };
    if let Ok(json) = serde_json::to_string(&sync) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            warn!("Failed to send initial sync, client disconnected");
            return;
        }
    }

    let mut rx = state.notifier.subscribe();

    loop {
        tokio::select! {
            // Forward broadcast events to this client.
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("Client disconnected during send");
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                        let sync = AgentEvent::TasksSync {
                            tasks: task_snapshot(&state.store).await,
                        };
                        if let Ok(json) = serde_json::to_string(&sync) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            // Receive commands from the client.
            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &state).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Generate { prompt: String },
}

async fn handle_client_message(text: &str, state: &AppState) {
    match serde_json::from_str::<ClientCommand>(text) {
        Ok(ClientCommand::Generate { prompt }) => {
            record_user_prompt(state, &prompt).await;
            match state.manager.start(&prompt).await {
                Ok(task) => info!(task_id = %task.id, "Generation started via WS"),
                Err(e) => {
                    warn!(error = %e, "Generate failed via WS");
                    state
                        .notifier
                        .append_message(&format!("⚠️ Could not start generation: {e}"))
                        .await;
                }
            }
        }
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
        }
    }
}

async fn record_user_prompt(state: &AppState, prompt: &str) {
    if let Err(e) = state.store.append_chat_message("user", prompt).await {
        warn!(error = %e, "Failed to record user prompt");
    }
}

// ── REST Endpoints ──────────────────────────────────────────────────────

async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    Json(task_snapshot(&state.store).await)
}

#[derive(Deserialize)]
struct GenerateRequest {
    prompt: String,
}

async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> impl IntoResponse {
    record_user_prompt(&state, &body.prompt).await;
    match state.manager.start(&body.prompt).await {
        Ok(task) => (StatusCode::CREATED, Json(serde_json::json!(task))),
        Err(Error::Task(e)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(Error::Remote(e)) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

async fn chat_history(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_chat_messages(100).await {
        Ok(messages) => (StatusCode::OK, Json(serde_json::json!(messages))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}
