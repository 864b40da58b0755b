use crate::bridge::{Bridge, NullBridge};
use crate::config::RelayConfig;
use crate::registry::ConnectionRegistry;
use std::sync::Arc;

/// Shared application state, handed to every connection handler
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub bridge: Arc<dyn Bridge>,
    pub config: RelayConfig,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self::with_bridge(config, Arc::new(NullBridge))
    }

    pub fn with_bridge(config: RelayConfig, bridge: Arc<dyn Bridge>) -> Self {
        tracing::info!(bridge = bridge.name(), "Relay state initialized");
        Self {
            registry: ConnectionRegistry::with_queue_capacity(config.queue_capacity),
            bridge,
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
