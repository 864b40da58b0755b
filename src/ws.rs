use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::sync::Arc;

use crate::error::RelayError;
use crate::protocol::ServerMessage;
use crate::registry::{ClientId, ClientReceiver};
use crate::router;
use crate::state::AppState;

/// Status line sent to every client right after it connects
pub const GREETING: &str = "Connected to relay";

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    upgrade(ws, state)
}

/// Complete a WebSocket upgrade and hand the socket to the relay
pub fn upgrade(ws: WebSocketUpgrade, state: Arc<AppState>) -> Response {
    tracing::debug!("WebSocket upgrade request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
///
/// Inbound frames are handled one at a time by the reader; everything addressed to this client
/// goes through its registry queue and out via the writer. Whichever side finishes first ends
/// the session.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    let (session, outbound) = state.registry.open_session().await;
    let client_id = session.id();
    // The registry holds the only sender, so evicting the session ends the writer
    drop(session);

    let clients = state.registry.len().await;
    tracing::info!(%client_id, clients, "WebSocket connected");

    let greeting = ServerMessage::Status {
        message: GREETING.to_string(),
    };
    if let Err(e) = state.registry.send_to(client_id, &greeting).await {
        tracing::error!(%client_id, error = %e, "Failed to queue greeting");
    }

    let mut write_task = tokio::spawn(write_outbound(client_id, sender, outbound));
    let mut read_task = tokio::spawn(read_inbound(client_id, receiver, state.clone()));

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    state.registry.unregister(client_id).await;
    let clients = state.registry.len().await;
    tracing::info!(%client_id, clients, "WebSocket connection closed");
}

async fn write_outbound(
    client_id: ClientId,
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: ClientReceiver,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = sender.send(message).await {
            let err = RelayError::Transport {
                client_id,
                reason: e.to_string(),
            };
            tracing::warn!(error = %err, "Dropping session after send failure");
            break;
        }
    }
}

async fn read_inbound(
    client_id: ClientId,
    mut receiver: SplitStream<WebSocket>,
    state: Arc<AppState>,
) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                // Frames may carry credentials, so only their size is logged here
                tracing::trace!(%client_id, bytes = text.len(), "Received text frame");

                match router::handle_text(text.as_str(), client_id, &state).await {
                    Ok(Some(reply)) => match state.registry.send_to(client_id, &reply).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => tracing::error!(%client_id, error = %e, "Failed to queue reply"),
                    },
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(%client_id, error = %e, "Dropping inbound message");
                    }
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!(%client_id, "WebSocket closed by client");
                break;
            }
            Ok(Message::Binary(_)) => {
                tracing::debug!(%client_id, "Ignoring binary frame");
            }
            // Ping/pong frames are answered by the WebSocket layer
            Ok(_) => {}
            Err(e) => {
                let err = RelayError::Transport {
                    client_id,
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "WebSocket receive failed");
                break;
            }
        }
    }
}
