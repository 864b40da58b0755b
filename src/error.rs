use crate::registry::ClientId;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur while relaying envelopes
///
/// None of these are fatal for the relay as a whole except `Io` during startup:
/// per-connection faults are logged and the process keeps serving.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Inbound text was not a usable envelope. The message is dropped, the connection kept.
    #[error("Malformed envelope: {0}")]
    Parse(String),

    /// Sending to or receiving from a session failed. The session gets unregistered.
    #[error("Transport failure on {client_id}: {reason}")]
    Transport { client_id: ClientId, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Parse(e.to_string())
    }
}
