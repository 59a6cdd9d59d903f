//! WebSocket upgrade handler and per-connection event loop.
//!
//! Handles the HTTP → WebSocket upgrade and runs the connection for its
//! lifetime:
//! 1. Resolve the client identity from the `clientId` query parameter
//! 2. Upgrade and wrap the sink half as the session's transport
//! 3. Admit the connection (welcome frame, session resumption)
//! 4. Pump frames into the connection handler until close, error, or
//!    the idle deadline fires
//! 5. Release the session

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::ClientId;
use crate::hub::{ConnectionHandler, RelayHub};
use crate::ports::Transport as _;

use super::transport::WsTransport;

/// State shared with the axum routes.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RelayHub>,
}

/// Builds the HTTP surface: the relay endpoint and a health probe.
pub fn router(hub: Arc<RelayHub>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(AppState { hub })
}

/// Optional identity presented on the upgrade URL.
#[derive(Debug, Deserialize)]
struct ConnectParams {
    #[serde(rename = "clientId")]
    client_id: Option<String>,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws?clientId=<string>`
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params.client_id, state.hub))
}

/// The supplied id, or a generated one when absent or empty.
fn resolve_client_id(raw: Option<String>) -> ClientId {
    raw.and_then(|id| ClientId::new(id).ok())
        .unwrap_or_else(ClientId::generate)
}

/// Runs one established connection to completion.
async fn handle_socket(socket: WebSocket, raw_client_id: Option<String>, hub: Arc<RelayHub>) {
    let (sink, mut stream) = socket.split();
    let transport = Arc::new(WsTransport::new(sink));
    let client_id = resolve_client_id(raw_client_id);

    let handler = ConnectionHandler::accept(hub.clone(), client_id.clone(), transport.clone()).await;

    // Single-shot disconnect timer, re-armed by every frame and pong.
    let idle = hub.config().heartbeat_timeout();
    let mut deadline = Instant::now() + idle;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handler.handle_frame(&text).await;
                    deadline = Instant::now() + idle;
                }
                Some(Ok(Message::Pong(_))) => {
                    handler.handle_pong();
                    deadline = Instant::now() + idle;
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(client_id = %client_id, "connection closed by peer");
                    break;
                }
                // Protocol pings are answered by axum; binary frames are
                // not part of the protocol.
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(client_id = %client_id, %error, "receive error");
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                debug!(client_id = %client_id, "idle deadline passed, disconnecting");
                break;
            }
        }
    }

    transport.close().await;
    handler.handle_close().await;
}

/// Liveness probe with hub occupancy counts.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.hub.session_count().await,
        "rooms": state.hub.room_count().await,
    }))
}
