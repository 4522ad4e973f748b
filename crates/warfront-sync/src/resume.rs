//! Reconnecting subscribers.
//!
//! A [`ResumingSubscriber`] wraps any [`EventSource`] and hides dropped
//! connections: it resubscribes from the last applied sequence, waits
//! according to a [`BackoffPolicy`] between failed attempts, and filters
//! redelivered events through an [`EventCursor`].

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use warfront_protocol::{BackoffPolicy, GameId, StateEvent};

use crate::{Delivery, EventCursor, EventLog, SyncError};

/// A stream of one game's events. Ends (`None`) when the game's log is
/// closed; an `Err` item means the connection dropped.
pub type EventStream = BoxStream<'static, Result<StateEvent, SyncError>>;

/// Somewhere event streams come from: the in-process game manager, or a
/// remote server.
pub trait EventSource: Send + Sync + 'static {
    /// Opens a stream of every event after `from_sequence`.
    fn open(
        &self,
        game_id: GameId,
        from_sequence: u64,
    ) -> impl std::future::Future<Output = Result<EventStream, SyncError>> + Send;
}

/// A single in-process log is a source for its own game.
impl EventSource for Arc<EventLog> {
    async fn open(&self, game_id: GameId, from_sequence: u64) -> Result<EventStream, SyncError> {
        if game_id != self.game_id() {
            return Err(SyncError::NotFound(game_id));
        }
        Ok(self.subscribe(from_sequence).await.into_stream().map(Ok).boxed())
    }
}

/// Follows one game across reconnects.
pub struct ResumingSubscriber<S: EventSource> {
    source: S,
    game_id: GameId,
    cursor: EventCursor,
    backoff: BackoffPolicy,
    stream: Option<EventStream>,
    /// Consecutive failures since the last delivered event.
    failures: u32,
}

impl<S: EventSource> ResumingSubscriber<S> {
    /// Starts after `from_sequence` (0 for the whole history).
    pub fn new(source: S, game_id: GameId, from_sequence: u64, backoff: BackoffPolicy) -> Self {
        Self {
            source,
            game_id,
            cursor: EventCursor::new(from_sequence),
            backoff,
            stream: None,
            failures: 0,
        }
    }

    /// The last sequence handed out.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// The next new event, `Ok(None)` once the game's log has ended.
    ///
    /// # Errors
    /// [`SyncError::Unavailable`] when the source keeps failing, or keeps
    /// skipping sequences, past the backoff policy's attempt limit. [`SyncError::NotFound`] is returned
    /// immediately; retrying can't fix it.
    pub async fn next(&mut self) -> Result<Option<StateEvent>, SyncError> {
        loop {
            if self.stream.is_none() {
                match self.source.open(self.game_id, self.cursor.position()).await {
                    Ok(stream) => self.stream = Some(stream),
                    Err(e @ SyncError::NotFound(_)) => return Err(e),
                    Err(e) => {
                        self.fail(e).await?;
                        continue;
                    }
                }
            }
            let Some(stream) = self.stream.as_mut() else {
                continue;
            };

            match stream.next().await {
                Some(Ok(event)) => match self.cursor.offer(&event) {
                    Delivery::Apply => {
                        self.failures = 0;
                        return Ok(Some(event));
                    }
                    Delivery::Duplicate => {}
                    Delivery::Gap { expected, got } => {
                        tracing::warn!(
                            game_id = %self.game_id,
                            expected,
                            got,
                            "gap in event stream, resubscribing"
                        );
                        self.stream = None;
                        self.fail(SyncError::SequenceGap { expected, got }).await?;
                    }
                },
                Some(Err(e)) => {
                    self.stream = None;
                    self.fail(e).await?;
                }
                None => return Ok(None),
            }
        }
    }

    /// Records a failure and sleeps, or gives up.
    async fn fail(&mut self, error: SyncError) -> Result<(), SyncError> {
        self.failures += 1;
        if !self.backoff.allows(self.failures) {
            return Err(SyncError::Unavailable {
                attempts: self.failures,
                reason: error.to_string(),
            });
        }
        let delay = self.backoff.delay(self.failures - 1);
        tracing::debug!(
            game_id = %self.game_id,
            attempt = self.failures,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "event source failed, backing off"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
