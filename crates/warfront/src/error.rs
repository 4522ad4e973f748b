//! Unified error type for the Warfront server.

use warfront_combat::CombatError;
use warfront_game::GameError;
use warfront_protocol::ProtocolError;
use warfront_session::SessionError;
use warfront_sync::SyncError;

use crate::transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WarfrontError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, unavailable service).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A game-level error (conflicts, turn order, halted games).
    #[error(transparent)]
    Game(#[from] GameError),

    /// An event log or journal error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// A stat table or combat engine error.
    #[error(transparent)]
    Combat(#[from] CombatError),

    /// The server was built without a stat table.
    #[error("no stat table configured")]
    MissingStatTable,
}
