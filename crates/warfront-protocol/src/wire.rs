//! Messages exchanged between clients and the server.
//!
//! Every frame on the socket is an [`Envelope`] around either a
//! [`ClientMessage`] (client → server) or a [`ServerMessage`]
//! (server → client). Both enums are internally tagged, so a frame looks
//! like:
//!
//! ```text
//! { "seq": 3, "timestamp": 1520, "payload": { "type": "StartGame", "game_id": 1 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    Action, Color, FactionId, GameId, GameSnapshot, GameStatus, Identity,
    Participant, StateEvent,
};

/// The frame around every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Per-connection, per-direction counter.
    pub seq: u64,
    /// Milliseconds since the sender started.
    pub timestamp: u64,
    pub payload: P,
}

impl<P> Envelope<P> {
    pub fn new(seq: u64, timestamp: u64, payload: P) -> Self {
        Self {
            seq,
            timestamp,
            payload,
        }
    }
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Must be the first message. Without a token the server issues a new
    /// anonymous identity; with one it restores the identity it belongs to.
    Handshake { version: u32, token: Option<String> },

    /// Keep-alive.
    Heartbeat { client_time: u64 },

    /// Open a new game lobby.
    CreateGame,

    /// List games still in the lobby.
    ListGames,

    /// Claim a faction and color. Rebinds to the existing seat when this
    /// identity already joined.
    JoinGame {
        game_id: GameId,
        faction_id: FactionId,
        color: Color,
        display_name: String,
    },

    /// Leave a lobby.
    LeaveGame { game_id: GameId },

    /// Close the lobby and begin the first turn.
    StartGame { game_id: GameId },

    /// Submit a turn action.
    Act { game_id: GameId, action: Action },

    /// Ask for the game's current state.
    GetSnapshot { game_id: GameId },

    /// Stream every event after `from_sequence` (0 for the full history).
    Subscribe { game_id: GameId, from_sequence: u64 },

    /// Stop streaming a game's events.
    Unsubscribe { game_id: GameId },

    /// Polite goodbye.
    Disconnect { reason: String },
}

/// A lobby summary in [`ServerMessage::GameList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameListEntry {
    pub game_id: GameId,
    pub status: GameStatus,
    pub participant_count: usize,
    pub max_participants: usize,
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// The handshake succeeded. Clients persist `identity.token`.
    HandshakeAck { identity: Identity, server_time: u64 },

    HeartbeatAck { client_time: u64, server_time: u64 },

    GameCreated { game_id: GameId },

    GameList { games: Vec<GameListEntry> },

    /// The identity holds this seat in the game.
    Joined { game_id: GameId, participant: Participant },

    /// A request with no other payload (leave, start, act, unsubscribe)
    /// was accepted.
    Ack { game_id: GameId },

    /// Reply to [`ClientMessage::GetSnapshot`].
    Snapshot { snapshot: GameSnapshot },

    /// A committed event from a subscribed game.
    Event { game_id: GameId, event: StateEvent },

    /// The request was rejected. `code` follows HTTP conventions
    /// (400 bad request, 401 unauthorized, 403 forbidden, 404 not found,
    /// 409 conflict, 410 game ended, 429 too many open lobbies, 500 game
    /// halted, 503 service unavailable).
    Error { code: u16, message: String },
}
