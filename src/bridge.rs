//! Seam for forwarding relay traffic to a TeamTalk voice-chat network
//!
//! Only `NullBridge` exists today: it validates and logs requests and reports that forwarding
//! is unavailable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::protocol::TtHandshake;
use crate::registry::ClientId;

/// Port assumed when a `tt-handshake` omits `ttPort`
pub const DEFAULT_TT_PORT: u16 = 10333;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid bridge request: {0}")]
    InvalidRequest(String),

    #[error("TeamTalk bridge unreachable: {0}")]
    Unreachable(String),
}

/// Phase reported to clients in `tt-status`
///
/// `NullBridge` only ever reports `Unavailable` and the router reports `Error`. The remaining
/// phases are for `Bridge` implementations that actually talk to a TeamTalk server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgePhase {
    /// No forwarder is attached to this relay
    Unavailable,
    /// Handshake sent to the TeamTalk server, no answer yet
    Connecting,
    /// Logged in to the TeamTalk server
    Connected,
    /// Inside the requested channel
    Joined,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeStatus {
    pub phase: BridgePhase,
    pub message: String,
}

/// Trait that TeamTalk forwarders must implement
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Name of this bridge, for logging
    fn name(&self) -> &str;

    /// Connect to a TeamTalk server on behalf of a client
    async fn handshake(&self, client_id: ClientId, request: &TtHandshake)
        -> BridgeResult<BridgeStatus>;

    /// Join a channel on the connected TeamTalk server
    async fn join(&self, client_id: ClientId, channel: &str) -> BridgeResult<BridgeStatus>;
}

/// Bridge used when no TeamTalk forwarder is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBridge;

#[async_trait]
impl Bridge for NullBridge {
    fn name(&self) -> &str {
        "null"
    }

    async fn handshake(
        &self,
        client_id: ClientId,
        request: &TtHandshake,
    ) -> BridgeResult<BridgeStatus> {
        let host = request
            .tt_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BridgeError::InvalidRequest("ttHost is required".to_string()))?;
        let port = request.tt_port.unwrap_or(DEFAULT_TT_PORT);

        tracing::info!(
            %client_id,
            host,
            port,
            username = ?request.username,
            channel = ?request.channel,
            "TeamTalk handshake requested, no forwarder attached"
        );

        Ok(BridgeStatus {
            phase: BridgePhase::Unavailable,
            message: format!(
                "TeamTalk forwarding is not available on this relay ({}:{} not contacted)",
                host, port
            ),
        })
    }

    async fn join(&self, client_id: ClientId, channel: &str) -> BridgeResult<BridgeStatus> {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(BridgeError::InvalidRequest(
                "channel must not be empty".to_string(),
            ));
        }

        tracing::info!(%client_id, channel, "TeamTalk join requested, no forwarder attached");

        Ok(BridgeStatus {
            phase: BridgePhase::Unavailable,
            message: format!(
                "TeamTalk forwarding is not available on this relay (channel {} not joined)",
                channel
            ),
        })
    }
}
