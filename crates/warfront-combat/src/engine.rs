//! The resolution algorithm.
//!
//! ```text
//! declaration ──muster──→ (attacker side, defender side)
//!      seed ──ChaCha8──→ fortune rolls (90..=110 % each)
//!                       ──clash──→ outcome + casualty counts
//!                       ──distribute──→ per-unit losses, weakest first
//! ```
//!
//! Strength of a side is `Σ count × (base_strength + attack)` for the
//! instigator and `Σ count × (base_strength + defense)` for the target,
//! scaled by that side's fortune roll. The stronger side wins; exactly
//! equal strengths go to the defender. The loser loses everything it
//! committed. The winner loses `⌈n_w × (L / W)²⌉` units, never more than the
//! loser lost, so a narrow win is costly and a lopsided one nearly free.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use warfront_protocol::{
    Casualties, CombatDeclaration, CombatOutcome, CombatResult, DeclarationId,
    FactionId, UnitKind, UnitStack,
};

use crate::{CombatError, StatTable};

/// Lowest fortune roll, in percent.
pub const FORTUNE_MIN: u64 = 90;
/// Highest fortune roll, in percent.
pub const FORTUNE_MAX: u64 = 110;

/// Resolves combat declarations. The game holds one as
/// `Arc<dyn CombatEngine>`, so tests can swap in a misbehaving engine.
pub trait CombatEngine: Send + Sync + 'static {
    /// Must be a pure function of its inputs.
    fn resolve(
        &self,
        declaration: &CombatDeclaration,
        seed: u64,
    ) -> Result<CombatResult, CombatError>;
}

/// The standard engine, driven by a [`StatTable`].
#[derive(Debug, Clone)]
pub struct StatEngine {
    table: Arc<StatTable>,
}

impl StatEngine {
    pub fn new(table: Arc<StatTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &StatTable {
        &self.table
    }
}

impl CombatEngine for StatEngine {
    fn resolve(
        &self,
        declaration: &CombatDeclaration,
        seed: u64,
    ) -> Result<CombatResult, CombatError> {
        resolve(declaration, seed, &self.table)
    }
}

/// The seed for one declaration within a game.
///
/// Spreads declaration ids with the golden-ratio constant so consecutive
/// declarations don't get correlated ChaCha streams.
pub fn derive_seed(game_seed: u64, declaration: DeclarationId) -> u64 {
    game_seed.wrapping_add(declaration.0.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Resolves `declaration` with `seed` against `table`.
///
/// The same three inputs always produce the same result.
///
/// # Errors
/// - [`CombatError::InvalidDeclaration`] when a faction attacks itself or a
///   stack belongs to neither side.
/// - [`CombatError::UnknownFaction`] / [`CombatError::UnknownUnit`] when the
///   declaration doesn't match the table.
pub fn resolve(
    declaration: &CombatDeclaration,
    seed: u64,
    table: &StatTable,
) -> Result<CombatResult, CombatError> {
    let attacker_id = &declaration.instigator_faction_id;
    let defender_id = &declaration.target_faction_id;

    if attacker_id == defender_id {
        return Err(CombatError::InvalidDeclaration {
            id: declaration.id,
            reason: format!("faction {attacker_id} cannot fight itself"),
        });
    }
    if let Some(stray) = declaration
        .units
        .iter()
        .find(|u| &u.faction_id != attacker_id && &u.faction_id != defender_id)
    {
        return Err(CombatError::InvalidDeclaration {
            id: declaration.id,
            reason: format!("stack of {} belongs to neither side", stray.faction_id),
        });
    }

    let attacker = muster(declaration, attacker_id, Role::Attack, table)?;
    let defender = muster(declaration, defender_id, Role::Defend, table)?;

    // Both rolls are drawn every time so the stream position never depends
    // on the declaration's contents.
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let attack_roll = rng.random_range(FORTUNE_MIN..=FORTUNE_MAX);
    let defense_roll = rng.random_range(FORTUNE_MIN..=FORTUNE_MAX);

    let clash = clash(
        attacker.strength.saturating_mul(attack_roll),
        defender.strength.saturating_mul(defense_roll),
        attacker.units,
        defender.units,
    );

    Ok(CombatResult {
        declaration_ref: declaration.id,
        outcome: clash.outcome,
        casualties: vec![
            Casualties {
                faction_id: attacker_id.clone(),
                losses: attacker.distribute(clash.attacker_losses),
            },
            Casualties {
                faction_id: defender_id.clone(),
                losses: defender.distribute(clash.defender_losses),
            },
        ],
        seed,
    })
}

// ---------------------------------------------------------------------------
// Sides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Role {
    Attack,
    Defend,
}

#[derive(Debug)]
struct Stack {
    unit: UnitKind,
    count: u32,
    per_unit: u64,
}

#[derive(Debug)]
struct Side {
    stacks: Vec<Stack>,
    units: u64,
    strength: u64,
}

fn muster(
    declaration: &CombatDeclaration,
    faction: &FactionId,
    role: Role,
    table: &StatTable,
) -> Result<Side, CombatError> {
    let stats = table.faction(faction)?;

    let mut merged: BTreeMap<&UnitKind, u32> = BTreeMap::new();
    for committed in declaration.committed_by(faction) {
        let count = merged.entry(&committed.unit).or_default();
        *count = count.saturating_add(committed.count);
    }

    let mut stacks = Vec::with_capacity(merged.len());
    for (unit, count) in merged {
        if count == 0 {
            continue;
        }
        let per_unit = match role {
            Role::Attack => stats.attack_of(unit),
            Role::Defend => stats.defense_of(unit),
        }
        .ok_or_else(|| CombatError::UnknownUnit {
            faction: faction.clone(),
            unit: unit.clone(),
        })?;
        stacks.push(Stack {
            unit: unit.clone(),
            count,
            per_unit,
        });
    }

    // Weakest first; ties broken by unit name so the order is total.
    stacks.sort_by(|a, b| a.per_unit.cmp(&b.per_unit).then_with(|| a.unit.cmp(&b.unit)));

    let units = stacks.iter().map(|s| u64::from(s.count)).sum();
    let strength = stacks
        .iter()
        .fold(0u64, |acc, s| acc.saturating_add(u64::from(s.count).saturating_mul(s.per_unit)));

    Ok(Side {
        stacks,
        units,
        strength,
    })
}

impl Side {
    /// Spreads `losses` over the stacks, emptying the weakest first.
    fn distribute(&self, mut losses: u64) -> Vec<UnitStack> {
        let mut out = Vec::new();
        for stack in &self.stacks {
            if losses == 0 {
                break;
            }
            let taken = losses.min(u64::from(stack.count));
            losses -= taken;
            out.push(UnitStack {
                unit: stack.unit.clone(),
                // taken <= stack.count, which is a u32.
                count: taken as u32,
            });
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Clash
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clash {
    outcome: CombatOutcome,
    attacker_losses: u64,
    defender_losses: u64,
}

fn clash(attack: u64, defense: u64, attacker_units: u64, defender_units: u64) -> Clash {
    if attacker_units == 0 || defender_units == 0 || (attack == 0 && defense == 0) {
        return Clash {
            outcome: CombatOutcome::NoContest,
            attacker_losses: 0,
            defender_losses: 0,
        };
    }

    let attacker_wins = attack > defense;
    let (winner_units, loser_units, winning, losing) = if attacker_wins {
        (attacker_units, defender_units, attack, defense)
    } else {
        (defender_units, attacker_units, defense, attack)
    };

    let loser_losses = loser_units;
    let winner_losses = winner_losses(winner_units, losing, winning).min(loser_losses);

    let outcome = match (winner_losses == winner_units, attacker_wins) {
        (true, _) => CombatOutcome::MutualLoss,
        (false, true) => CombatOutcome::AttackerWins,
        (false, false) => CombatOutcome::DefenderWins,
    };

    let (attacker_losses, defender_losses) = if attacker_wins {
        (winner_losses, loser_losses)
    } else {
        (loser_losses, winner_losses)
    };

    Clash {
        outcome,
        attacker_losses,
        defender_losses,
    }
}

/// `⌈units × (losing / winning)²⌉` in integer arithmetic.
///
/// Requires `losing <= winning` and `winning > 0`. Both strengths are
/// shifted down to 48 bits first so the squares fit in a `u128`.
fn winner_losses(units: u64, losing: u64, winning: u64) -> u64 {
    let shift = (u64::BITS - winning.leading_zeros()).saturating_sub(48);
    let w = u128::from(winning >> shift);
    let l = u128::from(losing >> shift);

    let numerator = u128::from(units).saturating_mul(l * l);
    let ceil = numerator.div_ceil(w * w);
    u64::try_from(ceil).unwrap_or(u64::MAX)
}

// =========================================================================
// Tests
// =========================================================================
