use crate::bridge::BridgePhase;
use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version advertised in `handshake-ack`
pub const PROTOCOL_VERSION: u32 = 1;

/// Sender name used for chat lines that arrive without a usable `from`
pub const DEFAULT_SENDER: &str = "web";

/// Envelopes sent by browser clients, discriminated by their `type` field
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    // Payload fields stay untyped JSON: only the `type` tag is enforced for these.
    #[serde(rename = "handshake")]
    Handshake {
        #[serde(default)]
        client: Option<Value>,
        #[serde(default)]
        protocol: Option<Value>,
        #[serde(default)]
        capabilities: Option<Value>,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    #[serde(rename = "ping")]
    Ping {
        #[serde(default)]
        timestamp: Option<Value>,
    },
    #[serde(rename = "chat")]
    Chat {
        #[serde(default)]
        from: Option<Value>,
        #[serde(default)]
        text: Option<Value>,
    },
    /// Text produced by an AAC device or speech input, relayed like chat
    #[serde(rename = "aac_text")]
    AacText {
        #[serde(default)]
        from: Option<Value>,
        #[serde(default)]
        text: Option<Value>,
    },
    #[serde(rename = "tt-handshake")]
    TtHandshake(TtHandshake),
    #[serde(rename = "tt-join")]
    TtJoin { channel: String },
    /// Any other tag: accepted for forward compatibility, never acted upon
    #[serde(other)]
    Unknown,
}

/// Request to connect the bridge to a TeamTalk server
#[derive(Clone, Default, Deserialize)]
pub struct TtHandshake {
    #[serde(rename = "ttHost", default)]
    pub tt_host: Option<String>,
    #[serde(rename = "ttPort", default)]
    pub tt_port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

// Keeps credentials out of logs.
impl fmt::Debug for TtHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtHandshake")
            .field("tt_host", &self.tt_host)
            .field("tt_port", &self.tt_port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("channel", &self.channel)
            .finish()
    }
}

/// A parsed inbound envelope together with the raw `type` tag it carried
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: String,
    pub message: ClientMessage,
}

impl Envelope {
    /// Parse a text frame into an envelope
    ///
    /// Fails with `RelayError::Parse` when the text is not JSON or is not an object with a string
    /// `type`. Of the known types only `tt-handshake` and `tt-join` have typed payloads that can
    /// fail. Unknown types parse successfully into `ClientMessage::Unknown`.
    pub fn parse(text: &str) -> RelayResult<Self> {
        let value: Value = serde_json::from_str(text)?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Parse("envelope has no string `type` field".to_string()))?
            .to_string();

        let message: ClientMessage = serde_json::from_value(value).map_err(|e| {
            // serde echoes offending values, which for tt-handshake can be credentials
            if kind == "tt-handshake" {
                RelayError::Parse(format!("invalid `{}` envelope", kind))
            } else {
                RelayError::Parse(format!("invalid `{}` envelope: {}", kind, e))
            }
        })?;

        Ok(Self { kind, message })
    }
}

/// Envelopes sent by the relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "status")]
    Status { message: String },
    #[serde(rename = "chat")]
    Chat {
        from: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<Value>,
    },
    #[serde(rename = "handshake-ack")]
    HandshakeAck { message: String, protocol: u32 },
    #[serde(rename = "pong")]
    Pong {
        #[serde(rename = "serverTime")]
        server_time: i64,
        /// Echo of the client's ping timestamp, for round-trip measurement
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
    /// Progress of a TeamTalk bridge request, sent to the requesting client only
    #[serde(rename = "tt-status")]
    TtStatus { phase: BridgePhase, message: String },
}

impl ServerMessage {
    /// Build the chat line that gets broadcast for `chat` and `aac_text`
    ///
    /// Only `from` and `text` survive; every other client field is dropped. `text` is relayed
    /// as whatever JSON value the client sent, `from` falls back to `"web"` unless it is a
    /// non-empty string.
    pub fn chat(from: Option<Value>, text: Option<Value>) -> Self {
        let from = match from {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => DEFAULT_SENDER.to_string(),
        };
        ServerMessage::Chat { from, text }
    }

    pub fn to_json(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
