//! Relay configuration loaded from environment variables

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::registry::OUTBOUND_QUEUE_CAPACITY;

/// Port used when `PORT` is unset or invalid
pub const DEFAULT_PORT: u16 = 8080;

/// Runtime configuration for the relay server
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Address to bind to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Answer `handshake` with `handshake-ack` and `ping` with `pong`
    pub reply_to_liveness: bool,
    /// Directory served for non-WebSocket paths (None = no static files)
    pub static_dir: Option<PathBuf>,
    /// Outbound messages buffered per client before it is dropped as stalled
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            reply_to_liveness: true,
            static_dir: None,
            queue_capacity: OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Load config from environment variables
    ///
    /// Invalid values fall back to the default with a warning rather than aborting startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = match non_empty_var("PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid PORT, using {}", DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let host = match non_empty_var("RELAY_HOST") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid RELAY_HOST, using {}", defaults.host);
                defaults.host
            }),
            None => defaults.host,
        };

        let reply_to_liveness = non_empty_var("RELAY_LIVENESS_REPLIES")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(defaults.reply_to_liveness);

        let static_dir = non_empty_var("RELAY_STATIC_DIR").map(PathBuf::from);

        let queue_capacity = match non_empty_var("RELAY_QUEUE_CAPACITY") {
            Some(raw) => raw.parse().ok().filter(|n| *n > 0).unwrap_or_else(|| {
                tracing::warn!(
                    value = %raw,
                    "Invalid RELAY_QUEUE_CAPACITY, using {}",
                    defaults.queue_capacity
                );
                defaults.queue_capacity
            }),
            None => defaults.queue_capacity,
        };

        tracing::info!(
            %host,
            port,
            reply_to_liveness,
            static_dir = ?static_dir,
            queue_capacity,
            "Relay config loaded"
        );

        Self {
            host,
            port,
            reply_to_liveness,
            static_dir,
            queue_capacity,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
