//! Server configuration.

use serde::{Deserialize, Serialize};
use warfront_game::GameConfig;
use warfront_sync::SyncConfig;

/// Everything a [`WarfrontServer`](crate::WarfrontServer) reads at startup.
///
/// Deserializes from JSON; missing fields take their defaults:
///
/// ```json
/// { "bind_addr": "0.0.0.0:9000", "game": { "max_participants": 4 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// A client that sends nothing (not even a heartbeat) for this long is
    /// disconnected.
    pub idle_timeout_ms: u64,

    /// Time allowed between connecting and the handshake.
    pub handshake_timeout_ms: u64,

    /// Outbound frames buffered per connection before replies and events
    /// wait for the socket.
    pub outbound_capacity: usize,

    pub game: GameConfig,

    pub sync: SyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            idle_timeout_ms: 15_000,
            handshake_timeout_ms: 5_000,
            outbound_capacity: 256,
            game: GameConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}
