//! Faction and unit stat tables.
//!
//! Static data loaded once at startup, usually from JSON:
//!
//! ```json
//! {
//!   "factions": {
//!     "red": {
//!       "base_strength": 1,
//!       "units": { "infantry": { "attack": 2, "defense": 3 } },
//!       "starting_forces": [ { "unit": "infantry", "count": 10 } ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warfront_protocol::{FactionId, UnitKind, UnitStack};

use crate::CombatError;

/// Combat values of one unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDef {
    /// Strength per unit when attacking.
    pub attack: u32,
    /// Strength per unit when defending.
    pub defense: u32,
}

/// Everything the engine needs to know about one faction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactionStats {
    /// Added to every unit's attack or defense.
    #[serde(default)]
    pub base_strength: u32,
    pub units: BTreeMap<UnitKind, UnitDef>,
    /// The army a participant of this faction starts the game with.
    #[serde(default)]
    pub starting_forces: Vec<UnitStack>,
}

impl FactionStats {
    /// Per-unit strength when attacking.
    pub fn attack_of(&self, unit: &UnitKind) -> Option<u64> {
        self.units
            .get(unit)
            .map(|d| u64::from(self.base_strength) + u64::from(d.attack))
    }

    /// Per-unit strength when defending.
    pub fn defense_of(&self, unit: &UnitKind) -> Option<u64> {
        self.units
            .get(unit)
            .map(|d| u64::from(self.base_strength) + u64::from(d.defense))
    }
}

/// Stats for every playable faction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatTable {
    pub factions: BTreeMap<FactionId, FactionStats>,
}

impl StatTable {
    /// Parses and validates a table.
    ///
    /// # Errors
    /// [`CombatError::InvalidTable`] on malformed JSON,
    /// [`CombatError::UnknownUnit`] when a starting force uses a unit its
    /// faction doesn't define.
    pub fn from_json(json: &str) -> Result<Self, CombatError> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Adds or replaces a faction. Builder-style, mostly for tests.
    pub fn with_faction(mut self, id: impl Into<String>, stats: FactionStats) -> Self {
        self.factions.insert(FactionId::new(id), stats);
        self
    }

    pub fn faction(&self, id: &FactionId) -> Result<&FactionStats, CombatError> {
        self.factions
            .get(id)
            .ok_or_else(|| CombatError::UnknownFaction(id.clone()))
    }

    pub fn contains(&self, id: &FactionId) -> bool {
        self.factions.contains_key(id)
    }

    /// The starting army of `id`, with stacks of the same unit merged and
    /// empty stacks dropped. Merged counts saturate at `u32::MAX`.
    pub fn starting_forces(&self, id: &FactionId) -> Result<Vec<UnitStack>, CombatError> {
        let stats = self.faction(id)?;
        let mut merged: BTreeMap<UnitKind, u32> = BTreeMap::new();
        for stack in &stats.starting_forces {
            let count = merged.entry(stack.unit.clone()).or_default();
            *count = count.saturating_add(stack.count);
        }
        Ok(merged
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(unit, count)| UnitStack { unit, count })
            .collect())
    }

    /// Checks that every starting force references a defined unit.
    ///
    /// # Errors
    /// [`CombatError::UnknownUnit`] for the first offending stack.
    pub fn validate(&self) -> Result<(), CombatError> {
        for (faction, stats) in &self.factions {
            for stack in &stats.starting_forces {
                if !stats.units.contains_key(&stack.unit) {
                    return Err(CombatError::UnknownUnit {
                        faction: faction.clone(),
                        unit: stack.unit.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
