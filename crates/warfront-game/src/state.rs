//! Event-sourced game state.
//!
//! [`GameState`] changes only through [`GameState::apply`]. The server's
//! game actor, restored games and client-side views all run the same
//! reducer over the same events, so they can't drift apart.

use std::collections::BTreeMap;

use warfront_protocol::{
    CombatDeclaration, CombatResult, EventKind, FactionId, GameId, GameSnapshot, GameStatus,
    IdentityId, Participant, Phase, StateEvent, UnitKind, UnitStack,
};

use crate::GameError;

/// Everything known about one game, as of `last_sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub game_id: GameId,
    pub status: GameStatus,
    /// 0 in the lobby; incremented by every `TurnAdvanced`.
    pub turn: u32,
    pub current_turn: Option<IdentityId>,
    /// In join order.
    pub participants: Vec<Participant>,
    /// Fixed by `GameStarted`.
    pub turn_order: Vec<IdentityId>,
    pub forces: BTreeMap<FactionId, BTreeMap<UnitKind, u32>>,
    pub pending: Option<CombatDeclaration>,
    pub last_result: Option<CombatResult>,
    /// Combat seed root, fixed by `GameStarted`.
    pub seed: u64,
    /// Declarations made so far; the next one gets id `declarations + 1`.
    pub declarations: u64,
    /// Why the game stopped accepting mutations, if it did.
    pub halted: Option<String>,
    pub last_sequence: u64,
}

impl GameState {
    /// An empty lobby.
    pub fn new(game_id: GameId) -> Self {
        Self {
            game_id,
            status: GameStatus::Lobby,
            turn: 0,
            current_turn: None,
            participants: Vec::new(),
            turn_order: Vec::new(),
            forces: BTreeMap::new(),
            pending: None,
            last_result: None,
            seed: 0,
            declarations: 0,
            halted: None,
            last_sequence: 0,
        }
    }

    /// Rebuilds a game from its full history.
    ///
    /// # Errors
    /// [`GameError::OutOfOrder`] if `events` skip a sequence.
    pub fn replay<'a>(
        game_id: GameId,
        events: impl IntoIterator<Item = &'a StateEvent>,
    ) -> Result<Self, GameError> {
        let mut state = Self::new(game_id);
        for event in events {
            state.apply(event)?;
        }
        Ok(state)
    }

    /// Applies one committed event.
    ///
    /// Returns `Ok(false)` without touching anything when the event was
    /// already applied, so redelivery is harmless.
    ///
    /// # Errors
    /// [`GameError::OutOfOrder`] if the event isn't the next one.
    pub fn apply(&mut self, event: &StateEvent) -> Result<bool, GameError> {
        let expected = self.last_sequence + 1;
        if event.sequence < expected {
            return Ok(false);
        }
        if event.sequence > expected {
            return Err(GameError::OutOfOrder {
                expected,
                got: event.sequence,
            });
        }

        self.apply_kind(&event.kind);
        self.last_sequence = event.sequence;
        Ok(true)
    }

    fn apply_kind(&mut self, kind: &EventKind) {
        match kind {
            EventKind::ParticipantJoined { participant } => {
                self.participants.push(participant.clone());
            }
            EventKind::ParticipantLeft { identity_id } => {
                self.participants.retain(|p| p.identity_id != *identity_id);
            }
            EventKind::GameStarted {
                turn_order,
                forces,
                seed,
            } => {
                self.turn_order = turn_order.clone();
                self.forces = forces
                    .iter()
                    .map(|(faction, stacks)| {
                        let units = stacks.iter().map(|s| (s.unit.clone(), s.count)).collect();
                        (faction.clone(), units)
                    })
                    .collect();
                self.seed = *seed;
                self.turn = 1;
                self.current_turn = turn_order.first().copied();
                self.status = GameStatus::Active {
                    phase: Phase::Movement,
                };
            }
            EventKind::PhaseAdvanced { to, .. } => {
                self.status = GameStatus::Active { phase: *to };
            }
            EventKind::CombatDeclared { declaration } => {
                self.declarations = self.declarations.max(declaration.id.0);
                self.pending = Some(declaration.clone());
                self.status = GameStatus::Active {
                    phase: Phase::CombatResolution,
                };
            }
            EventKind::DeclarationWithdrawn { .. } => {
                self.pending = None;
                self.status = GameStatus::Active {
                    phase: Phase::CombatDeclaration,
                };
            }
            EventKind::CombatResolved { result } => {
                for casualties in &result.casualties {
                    if let Some(units) = self.forces.get_mut(&casualties.faction_id) {
                        for loss in &casualties.losses {
                            if let Some(count) = units.get_mut(&loss.unit) {
                                *count = count.saturating_sub(loss.count);
                            }
                        }
                        units.retain(|_, count| *count > 0);
                    }
                }
                self.pending = None;
                self.last_result = Some(result.clone());
                self.status = GameStatus::Active {
                    phase: Phase::Cleanup,
                };
            }
            EventKind::TurnAdvanced { turn, current } => {
                self.turn = *turn;
                self.current_turn = Some(*current);
                self.status = GameStatus::Active {
                    phase: Phase::Movement,
                };
            }
            EventKind::GameCompleted { winner } => {
                self.pending = None;
                self.current_turn = None;
                self.status = GameStatus::Completed {
                    winner: winner.clone(),
                };
            }
            EventKind::GameHalted { reason } => {
                self.halted = Some(reason.clone());
            }
        }
    }

    // -- Queries -----------------------------------------------------------

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn participant(&self, identity_id: IdentityId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.identity_id == identity_id)
    }

    /// The participant playing `faction`.
    pub fn controller_of(&self, faction: &FactionId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.faction_id == faction)
    }

    /// Units of one kind `faction` has left.
    pub fn units_of(&self, faction: &FactionId, unit: &UnitKind) -> u32 {
        self.forces
            .get(faction)
            .and_then(|units| units.get(unit))
            .copied()
            .unwrap_or(0)
    }

    /// All units `faction` has left.
    pub fn total_units(&self, faction: &FactionId) -> u64 {
        self.forces
            .get(faction)
            .map(|units| units.values().map(|c| u64::from(*c)).sum())
            .unwrap_or(0)
    }

    /// A faction's remaining army as stacks.
    pub fn force_stacks(&self, faction: &FactionId) -> Vec<UnitStack> {
        self.forces
            .get(faction)
            .map(|units| {
                units
                    .iter()
                    .map(|(unit, count)| UnitStack {
                        unit: unit.clone(),
                        count: *count,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Participants with units left, in turn order.
    pub fn living(&self) -> Vec<&Participant> {
        self.turn_order
            .iter()
            .filter_map(|id| self.participant(*id))
            .filter(|p| self.total_units(&p.faction_id) > 0)
            .collect()
    }

    /// The snapshot clients receive.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            game_id: self.game_id,
            status: self.status.clone(),
            turn: self.turn,
            current_turn: self.current_turn,
            participants: self.participants.clone(),
            forces: self
                .forces
                .keys()
                .map(|faction| (faction.clone(), self.force_stacks(faction)))
                .collect(),
            pending: self.pending.clone(),
            last_sequence: self.last_sequence,
            halted: self.is_halted(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
