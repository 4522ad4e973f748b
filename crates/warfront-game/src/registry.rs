//! Faction registry: who plays which faction and color.
//!
//! Checks are pure functions of the current [`GameState`]. The game actor
//! runs them and commits the resulting event without yielding in between,
//! so two joins racing for the same faction are decided by whichever the
//! actor dequeues first.

use warfront_combat::StatTable;
use warfront_protocol::{Color, EventKind, FactionId, IdentityId, Participant};

use crate::{GameConfig, GameError, GameState};

/// Longest accepted display name, in characters.
pub const MAX_DISPLAY_NAME: usize = 32;

/// A request to claim a seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub identity_id: IdentityId,
    pub faction_id: FactionId,
    pub color: Color,
    pub display_name: String,
}

/// What a join turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JoinPlan {
    /// The identity already has a seat; hand it back unchanged.
    Rebind(Participant),
    /// A new seat, committed as `ParticipantJoined`.
    Admit(Participant),
}

/// Validates a join against the current roster.
///
/// Checked in order: existing seat (reconnect), lobby status, faction
/// exists, display name, faction free, color free, seat free.
pub(crate) fn plan_join(
    state: &GameState,
    table: &StatTable,
    config: &GameConfig,
    request: JoinRequest,
) -> Result<JoinPlan, GameError> {
    if let Some(existing) = state.participant(request.identity_id) {
        return Ok(JoinPlan::Rebind(existing.clone()));
    }

    if !state.status.is_joinable() {
        return Err(GameError::NotJoinable {
            game_id: state.game_id,
            status: state.status.to_string(),
        });
    }

    if !table.contains(&request.faction_id) {
        return Err(GameError::UnknownFaction(request.faction_id));
    }

    let display_name = request.display_name.trim();
    if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME {
        return Err(GameError::InvalidDisplayName);
    }

    if state.controller_of(&request.faction_id).is_some() {
        return Err(GameError::FactionConflict(request.faction_id));
    }

    let color = request.color.normalized();
    if color.as_str().is_empty() {
        return Err(GameError::InvalidColor);
    }
    if state.participants.iter().any(|p| p.color.normalized() == color) {
        return Err(GameError::ColorConflict(color));
    }

    if state.participants.len() >= config.max_participants {
        return Err(GameError::GameFull(state.game_id));
    }

    Ok(JoinPlan::Admit(Participant {
        identity_id: request.identity_id,
        faction_id: request.faction_id,
        color,
        display_name: display_name.to_string(),
    }))
}

/// Validates a leave. Seats free up only while the game is in the lobby.
pub(crate) fn plan_leave(state: &GameState, identity_id: IdentityId) -> Result<EventKind, GameError> {
    if state.participant(identity_id).is_none() {
        return Err(GameError::NotParticipant(identity_id));
    }
    if !state.status.is_joinable() {
        return Err(GameError::ParticipantLocked(state.game_id));
    }
    Ok(EventKind::ParticipantLeft { identity_id })
}

// =========================================================================
// Tests
// =========================================================================
