//! Combat resolution for Warfront.
//!
//! Given a [`CombatDeclaration`](warfront_protocol::CombatDeclaration) and a
//! seed, [`resolve`] computes a [`CombatResult`](warfront_protocol::CombatResult)
//! from the [`StatTable`]. Resolution is pure: the engine never touches game
//! state, so the same declaration and seed replay to the same result on any
//! machine.
//!
//! [`verify`] re-checks a result before it is committed. The game treats a
//! failed check as fatal for that game instance.

mod engine;
mod error;
mod stats;
mod verify;

pub use engine::{CombatEngine, FORTUNE_MAX, FORTUNE_MIN, StatEngine, derive_seed, resolve};
pub use error::CombatError;
pub use stats::{FactionStats, StatTable, UnitDef};
pub use verify::verify;
