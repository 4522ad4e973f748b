//! Shared vocabulary for Warfront.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here:
//!
//! - **Identifiers** ([`IdentityId`], [`GameId`], [`FactionId`], [`Color`], ...)
//! - **Game data** ([`Identity`], [`Participant`], [`CombatDeclaration`],
//!   [`CombatResult`], [`GameStatus`], [`Phase`], [`Action`])
//! - **State events** ([`StateEvent`], [`EventKind`]): the append-only unit
//!   of synchronization
//! - **Wire messages** ([`Envelope`], [`ClientMessage`], [`ServerMessage`])
//! - **Codec** ([`Codec`] trait, [`JsonCodec`])
//! - **Retry schedule** ([`BackoffPolicy`])
//!
//! The crate has no runtime behavior beyond serialization and a few pure
//! helpers (phase ordering, unit counting). It doesn't know about sockets,
//! actors or storage.
//!
//! ```text
//! Server (sockets) → Protocol (Envelope) → Game (actors, rules)
//! ```

mod backoff;
mod codec;
mod error;
mod event;
mod ids;
mod model;
mod wire;

pub use backoff::BackoffPolicy;
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use event::{EventKind, StateEvent};
pub use ids::{Color, DeclarationId, FactionId, GameId, IdentityId, UnitKind};
pub use model::{
    Action, Casualties, CombatDeclaration, CombatOutcome, CombatResult,
    CommittedUnits, GameSnapshot, GameStatus, Identity, Participant, Phase, UnitStack,
};
pub use wire::{ClientMessage, Envelope, GameListEntry, ServerMessage};
