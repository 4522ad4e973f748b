//! Turn and phase rules.
//!
//! ```text
//! Lobby ──start──→ Active { Movement }
//!                     │ AdvancePhase
//!                     ▼
//!                  CombatDeclaration ──AdvancePhase──────────┐
//!                     │ DeclareCombat      ▲                 │
//!                     ▼                    │ Withdraw        │
//!                  CombatResolution ───────┘                 │
//!                     │ ResolveCombat                        │
//!                     ▼                                      ▼
//!                  Cleanup ──EndTurn──→ next living participant's Movement
//!
//! after any resolution: ≤ 1 faction with units left ──→ Completed { winner }
//! ```
//!
//! Like the registry, these are pure checks over [`GameState`] that return
//! the event to commit. They reject with [`GameError::NotYourTurn`] before
//! [`GameError::WrongPhase`], and never produce an event on rejection.

use std::collections::BTreeMap;

use warfront_combat::StatTable;
use warfront_protocol::{
    Action, CombatDeclaration, CommittedUnits, DeclarationId, EventKind, FactionId, IdentityId,
    Phase, UnitKind, UnitStack,
};

use crate::{GameConfig, GameError, GameState};

/// What an accepted action turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Commit this event as-is.
    Commit(EventKind),
    /// Run the combat engine on the pending declaration first.
    Resolve(CombatDeclaration),
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// Validates an explicit start by `identity_id`.
pub(crate) fn check_start(
    state: &GameState,
    config: &GameConfig,
    identity_id: IdentityId,
) -> Result<(), GameError> {
    if state.participant(identity_id).is_none() {
        return Err(GameError::NotParticipant(identity_id));
    }
    if !state.status.is_joinable() {
        return Err(GameError::WrongPhase {
            action: "start",
            status: state.status.to_string(),
        });
    }
    let need = config.min_participants.max(2);
    if state.participants.len() < need {
        return Err(GameError::NotEnoughParticipants {
            have: state.participants.len(),
            need,
        });
    }
    Ok(())
}

/// The `GameStarted` event: join order becomes turn order, every faction
/// gets its starting army.
pub(crate) fn start_event(
    state: &GameState,
    table: &StatTable,
    seed: u64,
) -> Result<EventKind, GameError> {
    let mut forces = BTreeMap::new();
    for participant in &state.participants {
        let stacks = table.starting_forces(&participant.faction_id)?;
        forces.insert(participant.faction_id.clone(), stacks);
    }
    Ok(EventKind::GameStarted {
        turn_order: state.participants.iter().map(|p| p.identity_id).collect(),
        forces,
        seed,
    })
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Validates `action` by `identity_id` and plans its effect.
pub(crate) fn plan_action(
    state: &GameState,
    identity_id: IdentityId,
    action: Action,
) -> Result<Plan, GameError> {
    let Some(me) = state.participant(identity_id) else {
        return Err(GameError::NotParticipant(identity_id));
    };
    let Some(phase) = state.status.phase() else {
        return Err(GameError::WrongPhase {
            action: action.name(),
            status: state.status.to_string(),
        });
    };
    if state.current_turn != Some(identity_id) {
        return Err(GameError::NotYourTurn {
            current: state.current_turn,
        });
    }
    if !action.allowed_in(phase) {
        return Err(GameError::WrongPhase {
            action: action.name(),
            status: state.status.to_string(),
        });
    }

    match action {
        Action::AdvancePhase => {
            // From declaration, advancing means declining to fight.
            let to = match phase {
                Phase::CombatDeclaration => Phase::Cleanup,
                other => other.next().unwrap_or(Phase::Cleanup),
            };
            debug_assert!(phase.can_transition_to(to));
            Ok(Plan::Commit(EventKind::PhaseAdvanced { from: phase, to }))
        }
        Action::DeclareCombat {
            target_faction_id,
            units,
        } => {
            let declaration = build_declaration(state, &me.faction_id, target_faction_id, units)?;
            Ok(Plan::Commit(EventKind::CombatDeclared { declaration }))
        }
        Action::WithdrawDeclaration => {
            let pending = pending(state)?;
            Ok(Plan::Commit(EventKind::DeclarationWithdrawn {
                declaration_id: pending.id,
            }))
        }
        Action::ResolveCombat => Ok(Plan::Resolve(pending(state)?.clone())),
        Action::EndTurn => {
            let next = next_living(state, identity_id).ok_or_else(|| {
                GameError::WrongPhase {
                    action: "end_turn",
                    status: "no opponent left".to_string(),
                }
            })?;
            Ok(Plan::Commit(EventKind::TurnAdvanced {
                turn: state.turn + 1,
                current: next,
            }))
        }
    }
}

/// `GameCompleted` if at most one faction still has units.
pub(crate) fn completion(state: &GameState) -> Option<EventKind> {
    if !state.status.is_active() {
        return None;
    }
    let living = state.living();
    (living.len() <= 1).then(|| EventKind::GameCompleted {
        winner: living.first().map(|p| p.faction_id.clone()),
    })
}

fn pending(state: &GameState) -> Result<&CombatDeclaration, GameError> {
    state
        .pending
        .as_ref()
        .ok_or_else(|| GameError::InvalidDeclaration("no pending declaration".to_string()))
}

/// The participant after `current` in turn order that still has units.
fn next_living(state: &GameState, current: IdentityId) -> Option<IdentityId> {
    let order = &state.turn_order;
    let start = order.iter().position(|id| *id == current)?;
    (1..order.len())
        .map(|offset| order[(start + offset) % order.len()])
        .find(|id| {
            state
                .participant(*id)
                .is_some_and(|p| state.total_units(&p.faction_id) > 0)
        })
}

/// Checks the attacker's commitment against its army and fills in the
/// defender's side: the target defends with everything it has.
fn build_declaration(
    state: &GameState,
    attacker: &FactionId,
    target: FactionId,
    units: Vec<UnitStack>,
) -> Result<CombatDeclaration, GameError> {
    if &target == attacker {
        return Err(GameError::InvalidDeclaration(
            "cannot attack your own faction".to_string(),
        ));
    }
    if state.controller_of(&target).is_none() {
        return Err(GameError::InvalidDeclaration(format!(
            "{target} is not in this game"
        )));
    }
    if state.total_units(&target) == 0 {
        return Err(GameError::InvalidDeclaration(format!(
            "{target} has no units left"
        )));
    }

    let mut committed: BTreeMap<UnitKind, u32> = BTreeMap::new();
    for stack in units {
        if stack.count == 0 {
            return Err(GameError::InvalidDeclaration(format!(
                "empty stack of {}",
                stack.unit
            )));
        }
        let total = committed.entry(stack.unit).or_default();
        *total = total.saturating_add(stack.count);
    }
    if committed.is_empty() {
        return Err(GameError::InvalidDeclaration(
            "no units committed".to_string(),
        ));
    }
    for (unit, count) in &committed {
        let available = state.units_of(attacker, unit);
        if *count > available {
            return Err(GameError::InvalidDeclaration(format!(
                "committed {count} {unit}, only {available} available"
            )));
        }
    }

    let mut stacks: Vec<CommittedUnits> = committed
        .into_iter()
        .map(|(unit, count)| CommittedUnits {
            faction_id: attacker.clone(),
            unit,
            count,
        })
        .collect();
    stacks.extend(state.force_stacks(&target).into_iter().map(|s| CommittedUnits {
        faction_id: target.clone(),
        unit: s.unit,
        count: s.count,
    }));

    Ok(CombatDeclaration {
        id: DeclarationId(state.declarations + 1),
        instigator_faction_id: attacker.clone(),
        target_faction_id: target,
        units: stacks,
        declared_at_turn: state.turn,
    })
}

// =========================================================================
// Tests
// =========================================================================
