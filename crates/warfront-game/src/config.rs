//! Game configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by every game a [`GameManager`](crate::GameManager)
/// creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Participants required before anyone may start the game.
    pub min_participants: usize,

    /// Seats per game.
    pub max_participants: usize,

    /// Start automatically once every seat is taken.
    pub auto_start: bool,

    /// Command queue depth of each game actor. Callers wait when it's full.
    pub channel_size: usize,

    /// Lobbies that may be open at once. `create` is refused beyond this.
    pub max_open_lobbies: usize,

    /// Fixed combat seed for every game. `None` draws a random seed per
    /// game; set it for reproducible test runs.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_participants: 2,
            max_participants: 6,
            auto_start: false,
            channel_size: 64,
            max_open_lobbies: 256,
            seed: None,
        }
    }
}
