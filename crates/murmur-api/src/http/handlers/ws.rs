//! WebSocket transport adapter for the chat relay.
//!
//! The `/ws` endpoint upgrades an HTTP connection to a WebSocket. Each
//! accepted socket gets a fresh [`ConnectionId`] and is registered with the
//! [`BroadcastEngine`]. Once connected, the handler:
//!
//! - **Forwards events:** drains the session's outbound queue and writes
//!   every [`ServerEvent`] to the client as a JSON text frame.
//! - **Receives intents:** parses incoming text frames as [`ClientIntent`]
//!   and dispatches them to the engine. Unknown or malformed frames are
//!   logged and ignored.
//!
//! When the engine evicts the session (its queue overflowed) the outbound
//! queue closes and the socket is shut. Whichever side ends first, the
//! connection is unregistered on the way out.
//!
//! [`BroadcastEngine`]: murmur_core::broadcast::BroadcastEngine

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, Stream, StreamExt};

use murmur_core::broadcast::SessionHandle;
use murmur_types::protocol::{ClientIntent, ServerEvent};
use murmur_types::session::ConnectionId;

use crate::state::{AppState, RelayEngine};

/// Upgrade an HTTP request to a chat WebSocket.
///
/// This is mounted at `/ws` in the router.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Core WebSocket connection handler.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, ws_receiver) = socket.split();
    let handle = state.engine.connect(ConnectionId::new()).await;
    run_session(&state.engine, handle, ws_sender, ws_receiver).await;
}

/// Pump one registered session until either side ends, then unregister it.
///
/// Uses `tokio::select!` to multiplex between the session's outbound queue
/// and incoming frames, keeping both halves of the socket in one task.
async fn run_session<Tx, Rx>(
    engine: &RelayEngine,
    mut handle: SessionHandle,
    mut ws_sender: Tx,
    mut ws_receiver: Rx,
) where
    Tx: Sink<Message> + Unpin,
    Rx: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let connection_id = handle.connection_id;

    loop {
        tokio::select! {
            // --- Branch 1: Forward engine events to the client ---
            event = handle.events.recv() => {
                let Some(event) = event else {
                    // Evicted or unregistered by the engine
                    tracing::info!(%connection_id, "outbound queue closed, dropping connection");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                };
                let Some(frame) = encode_event(&event) else { continue };
                if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                    // Client disconnected
                    break;
                }
            }

            // --- Branch 2: Process intents from the client ---
            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        process_frame(engine, connection_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        // Client disconnected
                        break;
                    }
                    Some(Err(err)) => {
                        tracing::debug!(%connection_id, "WebSocket receive error: {err}");
                        break;
                    }
                    // Ignore binary, ping, pong protocol frames (handled by axum/tungstenite)
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    engine.handle_disconnect(&handle).await;
    tracing::debug!(%connection_id, "WebSocket connection closed");
}

/// Serialize one outbound event, logging (and skipping) failures.
fn encode_event(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(err) => {
            tracing::warn!(event = event.name(), "Failed to serialize ServerEvent: {err}");
            None
        }
    }
}

/// Decode one inbound text frame.
fn decode_intent(text: &str) -> Result<ClientIntent, serde_json::Error> {
    serde_json::from_str(text)
}

/// Parse and dispatch a single frame from the client.
///
/// Engine failures were already reported to the client as an `error` event.
async fn process_frame(engine: &RelayEngine, connection_id: ConnectionId, text: &str) {
    let intent = match decode_intent(text) {
        Ok(intent) => intent,
        Err(err) => {
            tracing::warn!(
                %connection_id,
                raw = %text,
                error = %err,
                "Ignoring malformed WebSocket frame"
            );
            return;
        }
    };

    if let Err(err) = engine.dispatch(connection_id, intent).await {
        tracing::debug!(%connection_id, code = err.code(), "intent not applied");
    }
}
