//! Client-side game view.

use warfront_protocol::{GameId, GameSnapshot, StateEvent};
use warfront_sync::{Delivery, EventCursor};

use crate::{GameError, GameState};

/// A replica of one game built from its event stream.
///
/// Feed it every event a subscription delivers, duplicates included; each
/// event changes the view at most once.
#[derive(Debug, Clone)]
pub struct GameView {
    state: GameState,
    cursor: EventCursor,
}

impl GameView {
    pub fn new(game_id: GameId) -> Self {
        Self {
            state: GameState::new(game_id),
            cursor: EventCursor::new(0),
        }
    }

    /// Applies `event` if it is the next one.
    ///
    /// A [`Delivery::Gap`] leaves the view untouched; resubscribe from
    /// [`GameView::position`].
    pub fn apply(&mut self, event: &StateEvent) -> Result<Delivery, GameError> {
        let delivery = self.cursor.offer(event);
        if delivery == Delivery::Apply {
            self.state.apply(event)?;
        }
        Ok(delivery)
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn snapshot(&self) -> GameSnapshot {
        self.state.snapshot()
    }
}
