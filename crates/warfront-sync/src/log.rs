//! The per-game append-only event log.
//!
//! # Ordering
//!
//! [`EventLog::append`] takes the write lock, assigns `last + 1`, writes the
//! journal line, stores the event and publishes it on the broadcast channel
//! before releasing the lock. Sequences are therefore strictly increasing
//! and gap-free no matter how many tasks append concurrently.
//!
//! # Subscribing
//!
//! [`EventLog::subscribe`] takes the read lock, subscribes to the broadcast
//! channel and copies the backlog in one step. No append can land between
//! the two, so backlog followed by live events is complete. A subscriber
//! that lags past the channel capacity refills from the stored events
//! rather than skipping any.
//!
//! ```text
//! append ──write lock──→ journal ──→ Vec<StateEvent> ──→ broadcast
//!                                          │                  │
//! subscribe(from) ──read lock──→ backlog ──┘      live ───────┘
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::{RwLock, broadcast};
use warfront_protocol::{EventKind, GameId, StateEvent};

use crate::{Journal, SyncConfig, SyncError};

/// Ordered, gap-free event history of one game.
#[derive(Debug)]
pub struct EventLog {
    game_id: GameId,
    state: RwLock<LogState>,
}

#[derive(Debug)]
struct LogState {
    events: Vec<StateEvent>,
    journal: Option<Journal>,
    /// `None` once the log is closed. Dropping the sender ends every live
    /// subscription after it drains.
    live: Option<broadcast::Sender<StateEvent>>,
}

impl EventLog {
    /// A log kept in memory only.
    pub fn in_memory(game_id: GameId, capacity: usize) -> Arc<Self> {
        Arc::new(Self::build(game_id, Vec::new(), None, capacity))
    }

    /// A new, empty log, journaled when `config.journal_dir` is set.
    ///
    /// # Errors
    /// [`SyncError::Io`] if the journal can't be created (including when
    /// one already exists for this game).
    pub async fn create(game_id: GameId, config: &SyncConfig) -> Result<Arc<Self>, SyncError> {
        let journal = match config.journal_path(game_id) {
            Some(path) => Some(Journal::create(path, config.sync_writes).await?),
            None => None,
        };
        Ok(Arc::new(Self::build(
            game_id,
            Vec::new(),
            journal,
            config.channel_capacity,
        )))
    }

    /// Rebuilds a log from its journal and keeps appending to it.
    ///
    /// A log whose last event is terminal comes back closed.
    pub async fn restore(game_id: GameId, config: &SyncConfig) -> Result<Arc<Self>, SyncError> {
        let path = config
            .journal_path(game_id)
            .ok_or(SyncError::NotFound(game_id))?;
        let events = Journal::replay(&path).await?;
        let journal = Journal::open(&path, config.sync_writes).await?;
        Ok(Arc::new(Self::build(
            game_id,
            events,
            Some(journal),
            config.channel_capacity,
        )))
    }

    /// A log seeded with `events`, for tests and tools. The events must be
    /// numbered `1..=n`.
    pub fn from_events(
        game_id: GameId,
        events: Vec<StateEvent>,
        capacity: usize,
    ) -> Result<Arc<Self>, SyncError> {
        for (index, event) in events.iter().enumerate() {
            let expected = index as u64 + 1;
            if event.sequence != expected {
                return Err(SyncError::SequenceGap {
                    expected,
                    got: event.sequence,
                });
            }
        }
        Ok(Arc::new(Self::build(game_id, events, None, capacity)))
    }

    fn build(
        game_id: GameId,
        events: Vec<StateEvent>,
        journal: Option<Journal>,
        capacity: usize,
    ) -> Self {
        let closed = events.last().is_some_and(|e| e.kind.is_terminal());
        let live = (!closed).then(|| broadcast::channel(capacity.max(1)).0);
        Self {
            game_id,
            state: RwLock::new(LogState {
                events,
                journal,
                live,
            }),
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Commits `kind` as the next event and publishes it.
    ///
    /// Appending a terminal event closes the log.
    ///
    /// # Errors
    /// - [`SyncError::Closed`] after [`close`](Self::close) or a terminal
    ///   event.
    /// - [`SyncError::Io`] / [`SyncError::Encode`] when the journal write
    ///   fails. Nothing is committed in that case.
    pub async fn append(&self, kind: EventKind) -> Result<StateEvent, SyncError> {
        let mut state = self.state.write().await;
        let Some(live) = state.live.clone() else {
            return Err(SyncError::Closed(self.game_id));
        };

        let event = StateEvent {
            sequence: state.events.len() as u64 + 1,
            kind,
        };
        if let Some(journal) = state.journal.as_mut() {
            journal.append(&event).await?;
        }
        state.events.push(event.clone());

        // No receivers is fine: the event is in the log.
        let _ = live.send(event.clone());
        if event.kind.is_terminal() {
            state.live = None;
        }

        tracing::trace!(
            game_id = %self.game_id,
            sequence = event.sequence,
            kind = event.kind.name(),
            "event appended"
        );
        Ok(event)
    }

    /// Streams every event with `sequence > from_sequence`, stored ones
    /// first, then live ones as they commit.
    pub async fn subscribe(self: &Arc<Self>, from_sequence: u64) -> Subscription {
        let state = self.state.read().await;
        let live = state.live.as_ref().map(broadcast::Sender::subscribe);
        let backlog = slice_after(&state.events, from_sequence).to_vec();
        drop(state);

        tracing::debug!(
            game_id = %self.game_id,
            from_sequence,
            backlog = backlog.len(),
            "subscription opened"
        );
        Subscription {
            log: Arc::clone(self),
            backlog: backlog.into(),
            live,
            next: from_sequence + 1,
        }
    }

    /// Copies the stored events after `sequence`.
    pub async fn events_after(&self, sequence: u64) -> Vec<StateEvent> {
        slice_after(&self.state.read().await.events, sequence).to_vec()
    }

    /// Sequence of the newest event, 0 for an empty log.
    pub async fn last_sequence(&self) -> u64 {
        self.state.read().await.events.len() as u64
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.live.is_none()
    }

    /// Stops accepting events. Subscribers receive what is stored, then end.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if state.live.take().is_some() {
            tracing::debug!(game_id = %self.game_id, "event log closed");
        }
    }
}

fn slice_after(events: &[StateEvent], sequence: u64) -> &[StateEvent] {
    let start = usize::try_from(sequence).unwrap_or(usize::MAX).min(events.len());
    &events[start..]
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// An in-order, gap-free view of one game's events from some point on.
///
/// Yields each sequence at most once. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    log: Arc<EventLog>,
    backlog: VecDeque<StateEvent>,
    live: Option<broadcast::Receiver<StateEvent>>,
    /// The sequence this subscription hands out next.
    next: u64,
}

impl Subscription {
    /// The next event, or `None` once the log is closed and fully drained.
    pub async fn next(&mut self) -> Option<StateEvent> {
        loop {
            if let Some(event) = self.backlog.pop_front() {
                if event.sequence < self.next {
                    continue;
                }
                self.next = event.sequence + 1;
                return Some(event);
            }

            let live = self.live.as_mut()?;
            match live.recv().await {
                Ok(event) if event.sequence < self.next => continue,
                Ok(event) if event.sequence == self.next => {
                    self.next += 1;
                    return Some(event);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Missed something; the log has it.
                    tracing::debug!(
                        game_id = %self.log.game_id,
                        next = self.next,
                        "subscriber lagged, refilling from log"
                    );
                    self.refill().await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.live = None;
                    self.refill().await;
                }
            }
        }
    }

    /// The sequence of the last event handed out.
    pub fn position(&self) -> u64 {
        self.next - 1
    }

    pub fn game_id(&self) -> GameId {
        self.log.game_id
    }

    /// Adapts the subscription into a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = StateEvent> + Send + 'static {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|event| (event, sub))
        })
    }

    async fn refill(&mut self) {
        let missing = self.log.events_after(self.next - 1).await;
        self.backlog.extend(missing);
    }
}

// =========================================================================
// Tests
// =========================================================================
