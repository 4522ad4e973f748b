//! Post-resolution checks.
//!
//! The game runs every result through [`verify`] before committing it. A
//! failure is an engine bug, so it is reported, never repaired.

use std::collections::{BTreeMap, HashSet};

use warfront_protocol::{CombatDeclaration, CombatOutcome, CombatResult, FactionId, UnitKind};

use crate::CombatError;

/// Checks `result` against the declaration it claims to resolve.
///
/// Casualties must name only the two sides, stay within what each side
/// committed per unit type, and agree with the outcome: the loser loses
/// everything, the winner no more than the loser, and a no-contest costs
/// nothing.
///
/// # Errors
/// [`CombatError::ResolutionInvariantViolation`] describing the first broken
/// rule.
pub fn verify(result: &CombatResult, declaration: &CombatDeclaration) -> Result<(), CombatError> {
    let violation = |reason: String| CombatError::ResolutionInvariantViolation {
        declaration: declaration.id,
        reason,
    };

    if result.declaration_ref != declaration.id {
        return Err(violation(format!(
            "result references {} instead",
            result.declaration_ref
        )));
    }

    let attacker = &declaration.instigator_faction_id;
    let defender = &declaration.target_faction_id;

    let mut seen: HashSet<&FactionId> = HashSet::new();
    for casualties in &result.casualties {
        let faction = &casualties.faction_id;
        if faction != attacker && faction != defender {
            return Err(violation(format!("casualties for uninvolved faction {faction}")));
        }
        if !seen.insert(faction) {
            return Err(violation(format!("casualties for {faction} listed twice")));
        }

        let mut per_unit: BTreeMap<&UnitKind, u64> = BTreeMap::new();
        for stack in &casualties.losses {
            *per_unit.entry(&stack.unit).or_default() += u64::from(stack.count);
        }
        for (unit, lost) in per_unit {
            let committed = declaration.committed_of(faction, unit);
            if lost > committed {
                return Err(violation(format!(
                    "{faction} lost {lost} {unit} but committed {committed}"
                )));
            }
        }
    }

    let lost_a = result.casualties_for(attacker);
    let lost_d = result.casualties_for(defender);
    let committed_a = declaration.committed_count(attacker);
    let committed_d = declaration.committed_count(defender);

    let consistent = match result.outcome {
        CombatOutcome::NoContest => lost_a == 0 && lost_d == 0,
        CombatOutcome::MutualLoss => lost_a == committed_a && lost_d == committed_d,
        CombatOutcome::AttackerWins => {
            lost_d == committed_d && lost_a < committed_a && lost_a <= lost_d
        }
        CombatOutcome::DefenderWins => {
            lost_a == committed_a && lost_d < committed_d && lost_d <= lost_a
        }
    };
    if !consistent {
        return Err(violation(format!(
            "outcome {:?} inconsistent with losses {lost_a}/{committed_a} vs {lost_d}/{committed_d}",
            result.outcome
        )));
    }

    Ok(())
}
