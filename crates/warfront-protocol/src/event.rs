//! State events: the ordered, append-only record of committed mutations.
//!
//! Every change to a game (a join, a phase change, a combat result) is
//! committed as exactly one [`StateEvent`]. Clients rebuild game state by
//! applying events in sequence order; the sequence number doubles as the
//! idempotence key, so re-applying an event is a no-op.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    CombatDeclaration, CombatResult, DeclarationId, FactionId, IdentityId,
    Participant, Phase, UnitStack,
};

/// One committed mutation of a game instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEvent {
    /// Strictly increasing and gap-free per game, starting at 1.
    pub sequence: u64,
    pub kind: EventKind,
}

/// What changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// A participant claimed a faction and color in the lobby.
    ParticipantJoined { participant: Participant },

    /// A participant left the lobby, freeing its faction and color.
    ParticipantLeft { identity_id: IdentityId },

    /// The lobby closed. Participants are locked from here on.
    /// `turn_order[0]` moves first; `forces` are the starting armies.
    /// Combat seeds for this game derive from `seed`.
    GameStarted {
        turn_order: Vec<IdentityId>,
        forces: BTreeMap<FactionId, Vec<UnitStack>>,
        seed: u64,
    },

    /// The current participant moved to another phase of their turn.
    PhaseAdvanced { from: Phase, to: Phase },

    /// A combat was declared and awaits resolution.
    CombatDeclared { declaration: CombatDeclaration },

    /// The pending declaration was taken back before it resolved.
    DeclarationWithdrawn { declaration_id: DeclarationId },

    /// The pending declaration resolved. Casualties are applied and the
    /// turn moves to cleanup.
    CombatResolved { result: CombatResult },

    /// The next participant's turn began at Movement.
    TurnAdvanced { turn: u32, current: IdentityId },

    /// The game ended. `winner` is `None` when nobody has units left.
    GameCompleted { winner: Option<FactionId> },

    /// A combat resolution broke an invariant. Nothing is committed after
    /// this; the game's history stays readable.
    GameHalted { reason: String },
}

impl EventKind {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::GameStarted { .. } => "game_started",
            Self::PhaseAdvanced { .. } => "phase_advanced",
            Self::CombatDeclared { .. } => "combat_declared",
            Self::DeclarationWithdrawn { .. } => "declaration_withdrawn",
            Self::CombatResolved { .. } => "combat_resolved",
            Self::TurnAdvanced { .. } => "turn_advanced",
            Self::GameCompleted { .. } => "game_completed",
            Self::GameHalted { .. } => "game_halted",
        }
    }

    /// Whether this event ends the game's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GameCompleted { .. } | Self::GameHalted { .. })
    }
}
