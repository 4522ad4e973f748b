//! Consumer-side idempotence.

use warfront_protocol::StateEvent;

/// What a consumer should do with an incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The next event in order. Apply it.
    Apply,
    /// Already applied (redelivery after a reconnect). Ignore it.
    Duplicate,
    /// Events are missing before this one. Resubscribe from the cursor.
    Gap { expected: u64, got: u64 },
}

/// Tracks the last applied sequence of one game.
///
/// Delivery is at-least-once; the cursor turns it into exactly-once
/// application:
///
/// ```rust
/// use warfront_protocol::{EventKind, StateEvent};
/// use warfront_sync::{Delivery, EventCursor};
///
/// let event = StateEvent {
///     sequence: 18,
///     kind: EventKind::GameCompleted { winner: None },
/// };
/// let mut cursor = EventCursor::new(17);
/// assert_eq!(cursor.offer(&event), Delivery::Apply);
/// assert_eq!(cursor.offer(&event), Delivery::Duplicate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventCursor {
    applied: u64,
}

impl EventCursor {
    /// A cursor that has applied everything up to `applied`.
    pub fn new(applied: u64) -> Self {
        Self { applied }
    }

    /// Classifies `event` and advances past it when it is the next one.
    pub fn offer(&mut self, event: &StateEvent) -> Delivery {
        let expected = self.applied + 1;
        match event.sequence {
            seq if seq < expected => Delivery::Duplicate,
            seq if seq == expected => {
                self.applied = seq;
                Delivery::Apply
            }
            got => Delivery::Gap { expected, got },
        }
    }

    /// The last applied sequence; resubscribe from here.
    pub fn position(&self) -> u64 {
        self.applied
    }
}
