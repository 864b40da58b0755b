// Public API for integration tests and potential library usage

pub mod bridge;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;
