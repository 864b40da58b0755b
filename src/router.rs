//! Inbound envelope dispatch
//!
//! A flat table keyed by the envelope's `type`. Chat-class messages fan out to every open
//! session; everything else at most answers the sender.

use std::sync::Arc;

use serde_json::Value;

use crate::bridge::{BridgePhase, BridgeResult, BridgeStatus};
use crate::error::RelayResult;
use crate::protocol::{ClientMessage, Envelope, ServerMessage, PROTOCOL_VERSION};
use crate::registry::ClientId;
use crate::state::AppState;

/// Parse a text frame and dispatch it
///
/// Returns the direct reply for the sender, if any. A parse failure is returned to the caller,
/// which logs it and keeps the connection open.
pub async fn handle_text(
    text: &str,
    client_id: ClientId,
    state: &Arc<AppState>,
) -> RelayResult<Option<ServerMessage>> {
    let envelope = Envelope::parse(text)?;
    tracing::debug!(%client_id, kind = %envelope.kind, "Received envelope");
    Ok(handle_message(envelope, client_id, state).await)
}

/// Handle a parsed envelope and return an optional reply for the sender
pub async fn handle_message(
    envelope: Envelope,
    client_id: ClientId,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let Envelope { kind, message } = envelope;

    match message {
        ClientMessage::Chat { from, text } | ClientMessage::AacText { from, text } => {
            let line = ServerMessage::chat(from, text);
            match state.registry.broadcast(&line, None).await {
                Ok(report) => tracing::debug!(
                    %client_id,
                    kind = %kind,
                    delivered = report.delivered,
                    skipped = report.skipped,
                    "Relayed chat line"
                ),
                Err(e) => tracing::error!(%client_id, error = %e, "Failed to broadcast chat line"),
            }
            None
        }

        ClientMessage::Handshake {
            client,
            protocol,
            capabilities,
            ..
        } => {
            tracing::info!(
                %client_id,
                client = ?client,
                protocol = ?protocol,
                capabilities = ?capabilities,
                "Client handshake"
            );
            state
                .config
                .reply_to_liveness
                .then(|| ServerMessage::HandshakeAck {
                    message: format!(
                        "Relay ready for {}",
                        client.as_ref().and_then(Value::as_str).unwrap_or("client")
                    ),
                    protocol: PROTOCOL_VERSION,
                })
        }

        ClientMessage::Ping { timestamp } => {
            tracing::trace!(%client_id, "Ping");
            state.config.reply_to_liveness.then(|| ServerMessage::Pong {
                server_time: chrono::Utc::now().timestamp_millis(),
                timestamp,
            })
        }

        ClientMessage::TtHandshake(request) => {
            let result = state.bridge.handshake(client_id, &request).await;
            Some(bridge_reply(client_id, &kind, result))
        }

        ClientMessage::TtJoin { channel } => {
            let result = state.bridge.join(client_id, &channel).await;
            Some(bridge_reply(client_id, &kind, result))
        }

        ClientMessage::Unknown => {
            tracing::info!(%client_id, kind = %kind, "Ignoring envelope with unhandled type");
            None
        }
    }
}

fn bridge_reply(
    client_id: ClientId,
    kind: &str,
    result: BridgeResult<BridgeStatus>,
) -> ServerMessage {
    match result {
        Ok(status) => ServerMessage::TtStatus {
            phase: status.phase,
            message: status.message,
        },
        Err(e) => {
            tracing::warn!(%client_id, kind, error = %e, "Bridge request rejected");
            ServerMessage::TtStatus {
                phase: BridgePhase::Error,
                message: e.to_string(),
            }
        }
    }
}
