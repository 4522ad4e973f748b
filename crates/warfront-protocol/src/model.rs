//! Game data shared by the server, the engine and clients.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Color, DeclarationId, FactionId, GameId, IdentityId, UnitKind};

// ---------------------------------------------------------------------------
// Identity & Participant
// ---------------------------------------------------------------------------

/// A participant's durable identity.
///
/// Issued once by the session service and never mutated afterwards. The
/// `token` is the secret a client presents to get the same identity back
/// after a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub token: String,
    /// Unix time in milliseconds.
    pub created_at: u64,
    pub is_anonymous: bool,
}

/// Binds one identity to one faction and color within a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub identity_id: IdentityId,
    pub faction_id: FactionId,
    pub color: Color,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Units & combat
// ---------------------------------------------------------------------------

/// A count of one unit type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStack {
    pub unit: UnitKind,
    pub count: u32,
}

impl UnitStack {
    pub fn new(unit: impl Into<String>, count: u32) -> Self {
        Self {
            unit: UnitKind::new(unit),
            count,
        }
    }
}

/// Units one faction commits to a combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedUnits {
    pub faction_id: FactionId,
    pub unit: UnitKind,
    pub count: u32,
}

/// A proposed, not yet resolved combat.
///
/// `units` holds both sides' commitments; which side a stack belongs to is
/// given by its `faction_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatDeclaration {
    pub id: DeclarationId,
    pub instigator_faction_id: FactionId,
    pub target_faction_id: FactionId,
    pub units: Vec<CommittedUnits>,
    pub declared_at_turn: u32,
}

impl CombatDeclaration {
    /// Stacks committed by `faction`, in declaration order.
    pub fn committed_by<'a>(
        &'a self,
        faction: &'a FactionId,
    ) -> impl Iterator<Item = &'a CommittedUnits> + 'a {
        self.units.iter().filter(move |u| &u.faction_id == faction)
    }

    /// Total units committed by `faction`.
    pub fn committed_count(&self, faction: &FactionId) -> u64 {
        self.committed_by(faction).map(|u| u64::from(u.count)).sum()
    }

    /// Units of one kind committed by `faction`.
    pub fn committed_of(&self, faction: &FactionId, unit: &UnitKind) -> u64 {
        self.committed_by(faction)
            .filter(|u| &u.unit == unit)
            .map(|u| u64::from(u.count))
            .sum()
    }
}

/// How a combat ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatOutcome {
    AttackerWins,
    DefenderWins,
    /// Both sides were wiped out.
    MutualLoss,
    /// Nothing fought: one side had no units or no strength.
    NoContest,
}

/// Units one faction lost in a combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Casualties {
    pub faction_id: FactionId,
    pub losses: Vec<UnitStack>,
}

impl Casualties {
    pub fn total(&self) -> u64 {
        self.losses.iter().map(|s| u64::from(s.count)).sum()
    }
}

/// The committed outcome of a resolved combat. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatResult {
    pub declaration_ref: DeclarationId,
    pub outcome: CombatOutcome,
    pub casualties: Vec<Casualties>,
    /// The seed the engine rolled with, kept for replay and audit.
    pub seed: u64,
}

impl CombatResult {
    /// Total units `faction` lost.
    pub fn casualties_for(&self, faction: &FactionId) -> u64 {
        self.casualties
            .iter()
            .filter(|c| &c.faction_id == faction)
            .map(Casualties::total)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Turn phases & game status
// ---------------------------------------------------------------------------

/// The phases of one participant's turn, in order.
///
/// ```text
/// Movement → CombatDeclaration → CombatResolution → Cleanup
///                    └──────────(no combat)──────────↗
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Movement,
    CombatDeclaration,
    CombatResolution,
    Cleanup,
}

impl Phase {
    /// The phase that follows this one within a turn. `Cleanup` ends the
    /// turn, so it has no successor.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Movement => Some(Self::CombatDeclaration),
            Self::CombatDeclaration => Some(Self::CombatResolution),
            Self::CombatResolution => Some(Self::Cleanup),
            Self::Cleanup => None,
        }
    }

    /// Whether `target` may follow this phase. Besides the strict order,
    /// a turn may skip straight from declaration to cleanup when no combat
    /// is declared, and a withdrawn declaration returns resolution to
    /// declaration.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
            || matches!(
                (self, target),
                (Self::CombatDeclaration, Self::Cleanup)
                    | (Self::CombatResolution, Self::CombatDeclaration)
            )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movement => write!(f, "Movement"),
            Self::CombatDeclaration => write!(f, "CombatDeclaration"),
            Self::CombatResolution => write!(f, "CombatResolution"),
            Self::Cleanup => write!(f, "Cleanup"),
        }
    }
}

/// The lifecycle of a game instance.
///
/// ```text
/// Lobby → Active { phase } → Completed { winner }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum GameStatus {
    Lobby,
    Active { phase: Phase },
    Completed { winner: Option<FactionId> },
}

impl GameStatus {
    /// Participants may join or leave only in the lobby.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Lobby)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The current phase, if the game is running.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Active { phase } => Some(*phase),
            _ => None,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::Active { phase } => write!(f, "Active({phase})"),
            Self::Completed { winner: Some(w) } => write!(f, "Completed(winner={w})"),
            Self::Completed { winner: None } => write!(f, "Completed(no winner)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A turn action a participant submits to a running game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Movement → CombatDeclaration, or CombatDeclaration → Cleanup when
    /// the participant declines to fight.
    AdvancePhase,
    /// Commit units against another faction.
    DeclareCombat {
        target_faction_id: FactionId,
        units: Vec<UnitStack>,
    },
    /// Take back the pending declaration before it resolves.
    WithdrawDeclaration,
    /// Resolve the pending declaration.
    ResolveCombat,
    /// Cleanup → next participant's Movement.
    EndTurn,
}

impl Action {
    /// Whether this action may be submitted during `phase`.
    pub fn allowed_in(&self, phase: Phase) -> bool {
        match self {
            Self::AdvancePhase => {
                matches!(phase, Phase::Movement | Phase::CombatDeclaration)
            }
            Self::DeclareCombat { .. } => phase == Phase::CombatDeclaration,
            Self::WithdrawDeclaration | Self::ResolveCombat => {
                phase == Phase::CombatResolution
            }
            Self::EndTurn => phase == Phase::Cleanup,
        }
    }

    /// Short name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AdvancePhase => "advance_phase",
            Self::DeclareCombat { .. } => "declare_combat",
            Self::WithdrawDeclaration => "withdraw_declaration",
            Self::ResolveCombat => "resolve_combat",
            Self::EndTurn => "end_turn",
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A point-in-time view of a game, for clients that join mid-game or render
/// a lobby. Every field is derived from the events up to `last_sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: GameId,
    pub status: GameStatus,
    /// 0 in the lobby, 1 for the first turn.
    pub turn: u32,
    pub current_turn: Option<IdentityId>,
    /// In join order, which is also turn order.
    pub participants: Vec<Participant>,
    pub forces: BTreeMap<FactionId, Vec<UnitStack>>,
    pub pending: Option<CombatDeclaration>,
    pub last_sequence: u64,
    /// The game stopped accepting mutations after an engine fault.
    pub halted: bool,
}
