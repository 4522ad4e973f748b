//! Synchronization configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use warfront_protocol::GameId;

/// Where and how event logs persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory for per-game JSON-lines journals. `None` keeps logs in
    /// memory only.
    pub journal_dir: Option<PathBuf>,
    /// Live-event buffer per game. Subscribers that fall further behind
    /// catch up from the log instead.
    pub channel_capacity: usize,
    /// Call `fsync` after every journal append.
    pub sync_writes: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            journal_dir: None,
            channel_capacity: 256,
            sync_writes: false,
        }
    }
}

impl SyncConfig {
    /// The journal file for `game_id`, if journaling is enabled.
    pub fn journal_path(&self, game_id: GameId) -> Option<PathBuf> {
        self.journal_dir
            .as_ref()
            .map(|dir| dir.join(format!("game-{}.jsonl", game_id.0)))
    }

    /// Recovers the game id from a journal file name, the inverse of
    /// [`journal_path`](Self::journal_path).
    pub fn game_id_from_path(path: &std::path::Path) -> Option<GameId> {
        let stem = path.file_name()?.to_str()?.strip_suffix(".jsonl")?;
        stem.strip_prefix("game-")?.parse().ok().map(GameId)
    }
}
