//! Error types for the game layer.

use warfront_combat::CombatError;
use warfront_protocol::{Color, FactionId, GameId, IdentityId};
use warfront_sync::SyncError;

/// Errors that can occur during game operations.
///
/// Everything above [`GameHalted`](Self::GameHalted) is a rejected request:
/// nothing was committed and the caller may retry with different input.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Another participant already holds this faction.
    #[error("faction {0} is already taken")]
    FactionConflict(FactionId),

    /// Another participant already holds this color.
    #[error("color {0} is already taken")]
    ColorConflict(Color),

    /// The faction isn't in the stat table.
    #[error("unknown faction {0}")]
    UnknownFaction(FactionId),

    /// Display names must be 1 to 32 characters after trimming.
    #[error("invalid display name")]
    InvalidDisplayName,

    /// Colors must not be blank.
    #[error("invalid color")]
    InvalidColor,

    /// The lobby has no free seat.
    #[error("game {0} is full")]
    GameFull(GameId),

    /// The game left the lobby; new participants can't join.
    #[error("game {game_id} is not joinable ({status})")]
    NotJoinable { game_id: GameId, status: String },

    /// Participants are fixed once the game has started.
    #[error("participants of game {0} are locked")]
    ParticipantLocked(GameId),

    /// The identity holds no seat in this game.
    #[error("identity {0} is not a participant")]
    NotParticipant(IdentityId),

    /// Too few participants to start.
    #[error("need {need} participants to start, have {have}")]
    NotEnoughParticipants { have: usize, need: usize },

    /// It's someone else's turn.
    #[error("not your turn (current: {current:?})")]
    NotYourTurn { current: Option<IdentityId> },

    /// The action isn't allowed in the current phase or game status.
    #[error("{action} not allowed while {status}")]
    WrongPhase { action: &'static str, status: String },

    /// The combat declaration is malformed or exceeds available units.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// A previous combat resolution broke an invariant. The game accepts no
    /// further mutations.
    #[error("game {0} is halted")]
    GameHalted(GameId),

    /// No game with this id.
    #[error("game {0} not found")]
    NotFound(GameId),

    /// The game completed and was archived. Its history is still readable.
    #[error("game {0} has ended")]
    Archived(GameId),

    /// Too many lobbies are waiting for players.
    #[error("too many open lobbies (limit {limit})")]
    TooManyLobbies { limit: usize },

    /// The game's actor is gone.
    #[error("game {0} is unavailable")]
    Unavailable(GameId),

    /// An event arrived out of order while rebuilding state.
    #[error("event out of order: expected sequence {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Combat(#[from] CombatError),
}
