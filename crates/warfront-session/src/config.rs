//! Session configuration and lifecycle types.

use serde::{Deserialize, Serialize};
use warfront_protocol::{BackoffPolicy, Identity};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What a caller should do when no identity can be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report readiness anyway, in read-only mode. Spectating and browsing
    /// keep working; anything that mutates a game needs a session.
    #[default]
    ProceedReadOnly,
    /// Surface the error and let the caller block.
    Block,
}

/// Configuration for the client-side [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Retry schedule for calls to the session service.
    pub retry: BackoffPolicy,
    /// Behavior of [`ensure_ready`](crate::SessionManager::ensure_ready)
    /// when the service stays unreachable.
    pub failure_policy: FailurePolicy,
}

// ---------------------------------------------------------------------------
// SessionLifecycle
// ---------------------------------------------------------------------------

/// Where the process-wide session is in its initialization.
///
/// ```text
/// Uninitialized ──→ Pending ──→ Ready(identity)
///                      │
///                      └──────→ Unavailable ──(next ensure_session)──→ Pending
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLifecycle {
    /// Nobody asked for a session yet (or the player signed out).
    Uninitialized,
    /// A request to the store or service is in flight.
    Pending,
    /// The identity is known and persisted.
    Ready(Identity),
    /// The last attempt failed. The next call retries.
    Unavailable(String),
}

impl SessionLifecycle {
    /// The identity, once ready.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Ready(identity) => Some(identity),
            _ => None,
        }
    }
}

/// The answer to "may the app proceed?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// A session exists; game actions are allowed.
    Session(Identity),
    /// No session could be established, but the failure policy lets the
    /// app continue without mutating anything.
    ReadOnly { reason: String },
}

impl Readiness {
    /// Whether game-mutating actions may be submitted.
    pub fn can_mutate(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_defaults_to_read_only() {
        assert_eq!(SessionConfig::default().failure_policy, FailurePolicy::ProceedReadOnly);
    }

    #[test]
    fn test_session_config_partial_json_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "failure_policy": "block" }"#).unwrap();

        assert_eq!(config.failure_policy, FailurePolicy::Block);
        assert_eq!(config.retry, BackoffPolicy::default());
    }

    #[test]
    fn test_lifecycle_identity_only_when_ready() {
        assert!(SessionLifecycle::Pending.identity().is_none());
        assert!(SessionLifecycle::Unavailable("down".into()).identity().is_none());
    }

    #[test]
    fn test_read_only_cannot_mutate() {
        assert!(!Readiness::ReadOnly { reason: "down".into() }.can_mutate());
    }
}
