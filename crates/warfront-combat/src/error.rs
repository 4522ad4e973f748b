//! Error types for combat resolution.

use warfront_protocol::{DeclarationId, FactionId, UnitKind};

/// Errors from resolving or checking a combat.
#[derive(Debug, thiserror::Error)]
pub enum CombatError {
    /// The declaration names a faction the stat table doesn't know.
    #[error("unknown faction {0}")]
    UnknownFaction(FactionId),

    /// A committed stack uses a unit the faction doesn't field.
    #[error("faction {faction} has no unit {unit}")]
    UnknownUnit { faction: FactionId, unit: UnitKind },

    /// The declaration is malformed: a faction fighting itself, or a stack
    /// belonging to neither side.
    #[error("invalid declaration {id}: {reason}")]
    InvalidDeclaration { id: DeclarationId, reason: String },

    /// The stat table JSON could not be parsed.
    #[error("invalid stat table: {0}")]
    InvalidTable(#[from] serde_json::Error),

    /// A computed result breaks the casualty rules. Never clamped: the
    /// game that produced it must stop.
    #[error("resolution invariant violated for {declaration}: {reason}")]
    ResolutionInvariantViolation {
        declaration: DeclarationId,
        reason: String,
    },
}

impl CombatError {
    /// Whether this error means the engine itself misbehaved, as opposed to
    /// a bad declaration that can simply be rejected.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ResolutionInvariantViolation { .. })
    }
}
