//! WebSocket status push.
//!
//! Each connection follows one task: the store is polled at the configured
//! interval, every record is sent as a JSON text frame, and the socket is
//! closed after a terminal status.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::interval;
use tracing::{debug, info, warn};

use vtrack_models::TaskId;
use vtrack_store::watch_task;
use vtrack_worker::is_safe_id;

use crate::handlers::TaskStatusResponse;
use crate::metrics;
use crate::state::AppState;

static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub async fn ws_status(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection();

    ws.on_upgrade(move |socket| async move {
        handle_status_socket(socket, state, task_id).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

async fn handle_status_socket(socket: WebSocket, state: AppState, task_id: String) {
    let (mut sender, mut receiver) = socket.split();

    if !is_safe_id(&task_id) {
        let _ = sender.send(detail_frame("Task not found")).await;
        let _ = sender.close().await;
        return;
    }

    let mut updates = Box::pin(watch_task(state.store(), TaskId::from_string(task_id.as_str()), state.watch));
    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut seen_any = false;

    loop {
        tokio::select! {
            update = updates.next() => {
                match update {
                    Some(Ok(task)) => {
                        seen_any = true;
                        let status = task.status;
                        let body = match serde_json::to_string(&TaskStatusResponse::from(task)) {
                            Ok(body) => body,
                            Err(e) => {
                                warn!(task_id = %task_id, "Failed to encode status: {}", e);
                                break;
                            }
                        };
                        if sender.send(Message::Text(body)).await.is_err() {
                            debug!(task_id = %task_id, "WebSocket client went away");
                            break;
                        }
                        metrics::record_ws_message_sent(status.as_str());
                        if status.is_terminal() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(task_id = %task_id, "Status watch failed: {}", e);
                        let _ = sender.send(detail_frame("Task status unavailable")).await;
                        break;
                    }
                    None => {
                        if !seen_any {
                            let _ = sender.send(detail_frame("Task not found")).await;
                        }
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!(task_id = %task_id, "Client closed status socket");
                        return;
                    }
                    Some(Err(e)) => {
                        debug!(task_id = %task_id, "WebSocket receive error: {}", e);
                        return;
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = sender.close().await;
}

fn detail_frame(detail: &str) -> Message {
    Message::Text(json!({ "detail": detail }).to_string())
}
