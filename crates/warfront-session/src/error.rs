//! Error types for the session layer.

/// Errors that can occur while establishing or restoring an identity.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The identity service could not be reached after every retry.
    /// Callers may continue in read-only mode (see
    /// [`FailurePolicy`](crate::FailurePolicy)).
    #[error("session service unavailable after {attempts} attempt(s): {reason}")]
    SessionUnavailable { attempts: u32, reason: String },

    /// The identity service answered but refused the request.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The token doesn't belong to any identity the server knows.
    #[error("invalid session token")]
    InvalidToken,

    /// Reading or writing the token store failed.
    #[error("token store I/O failed: {0}")]
    Storage(#[source] std::io::Error),

    /// The token store holds something that isn't an identity.
    #[error("token store is corrupt: {0}")]
    CorruptStore(#[source] serde_json::Error),
}
