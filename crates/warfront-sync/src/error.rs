//! Error types for the synchronization layer.

use std::path::PathBuf;

use warfront_protocol::GameId;

/// Errors from event logs, journals and subscribers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The game's log no longer accepts events.
    #[error("event log for {0} is closed")]
    Closed(GameId),

    /// No such game at this source.
    #[error("game {0} not found")]
    NotFound(GameId),

    /// Journal file I/O failed. The event was not committed.
    #[error("journal I/O: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be serialized for the journal.
    #[error("journal encode: {0}")]
    Encode(#[source] serde_json::Error),

    /// A journal on disk is unreadable or out of sequence.
    #[error("corrupt journal {path} at line {line}: {reason}")]
    CorruptJournal {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Restored events don't form a gap-free sequence from 1.
    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    /// A remote stream dropped. Resuming subscribers reconnect on this.
    #[error("stream disconnected: {0}")]
    Disconnected(String),

    /// Reconnecting failed on every attempt the backoff policy allowed.
    #[error("event source unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },
}
