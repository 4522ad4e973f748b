//! The client-side session manager.
//!
//! Owns the process-wide session lifecycle. UI code, sync code and game
//! commands all get the identity through one [`SessionManager`] passed by
//! reference (usually inside an `Arc`), never through a global.
//!
//! # Concurrency
//!
//! `ensure_session` takes `&self` and may be called from many tasks at
//! once. The first caller runs the lookup/creation while holding the
//! `in_flight` lock; everyone queued behind it shares that attempt's
//! outcome: the identity it produced, or the `SessionUnavailable` it ended
//! with. The session service sees one request (or one retry schedule), not
//! N. Only a call made after an attempt settled starts a new one.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, watch};
use warfront_protocol::Identity;

use crate::{
    FailurePolicy, Readiness, SessionConfig, SessionError, SessionLifecycle,
    SessionService, TokenStore,
};

/// Establishes and caches the player's identity.
///
/// ```text
/// ensure_session()
///    ├─ Ready?  ──────────────────────────────→ identity
///    └─ lock in_flight
///         ├─ Ready? (someone else finished) ──→ identity
///         ├─ someone else failed meanwhile ───→ their SessionUnavailable
///         ├─ token store has one ─────────────→ Ready
///         └─ service.create_anonymous_session() with backoff
///               ├─ ok  → save to store ───────→ Ready
///               └─ err ───────────────────────→ Unavailable
/// ```
pub struct SessionManager<S: SessionService, T: TokenStore> {
    service: S,
    store: T,
    config: SessionConfig,
    lifecycle: watch::Sender<SessionLifecycle>,
    /// Held for the whole attempt. Guards how the last attempt failed.
    in_flight: Mutex<Option<Failure>>,
    /// Bumped each time an attempt settles.
    settled: AtomicU64,
}

/// What callers queued behind a failed attempt get back.
#[derive(Debug, Clone)]
struct Failure {
    attempts: u32,
    reason: String,
}

impl Failure {
    fn to_error(&self) -> SessionError {
        SessionError::SessionUnavailable {
            attempts: self.attempts,
            reason: self.reason.clone(),
        }
    }
}

impl<S: SessionService, T: TokenStore> SessionManager<S, T> {
    pub fn new(service: S, store: T, config: SessionConfig) -> Self {
        let (lifecycle, _) = watch::channel(SessionLifecycle::Uninitialized);
        Self {
            service,
            store,
            config,
            lifecycle,
            in_flight: Mutex::new(None),
            settled: AtomicU64::new(0),
        }
    }

    /// Returns the identity, creating and persisting one if needed.
    ///
    /// Idempotent: once an identity exists every call returns it.
    ///
    /// # Errors
    /// [`SessionError::SessionUnavailable`] when the service failed on
    /// every attempt allowed by `config.retry`. Callers that were waiting
    /// on that attempt get the same error; a later call tries again.
    pub async fn ensure_session(&self) -> Result<Identity, SessionError> {
        if let Some(identity) = self.ready_identity() {
            return Ok(identity);
        }

        let seen = self.settled.load(Ordering::Acquire);
        let mut last_failure = self.in_flight.lock().await;
        if let Some(identity) = self.ready_identity() {
            return Ok(identity);
        }
        if self.settled.load(Ordering::Acquire) != seen {
            if let Some(failure) = last_failure.as_ref() {
                tracing::debug!(error = %failure.reason, "sharing the failed in-flight attempt");
                return Err(failure.to_error());
            }
        }

        self.lifecycle.send_replace(SessionLifecycle::Pending);

        match self.store.load().await {
            Ok(Some(identity)) => {
                tracing::debug!(identity_id = %identity.id, "session restored from store");
                self.lifecycle
                    .send_replace(SessionLifecycle::Ready(identity.clone()));
                *last_failure = None;
                self.settled.fetch_add(1, Ordering::AcqRel);
                return Ok(identity);
            }
            Ok(None) => {}
            Err(e) => {
                // An unreadable store shouldn't lock the player out; a new
                // identity replaces whatever was there.
                tracing::warn!(error = %e, "token store unreadable, requesting a new session");
            }
        }

        let outcome = self.create_with_retry().await;
        *last_failure = match &outcome {
            Err(SessionError::SessionUnavailable { attempts, reason }) => Some(Failure {
                attempts: *attempts,
                reason: reason.clone(),
            }),
            _ => None,
        };
        self.settled.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(identity) => {
                if let Err(e) = self.store.save(&identity).await {
                    tracing::warn!(
                        identity_id = %identity.id,
                        error = %e,
                        "session created but could not be persisted"
                    );
                }
                tracing::info!(identity_id = %identity.id, "session ready");
                self.lifecycle
                    .send_replace(SessionLifecycle::Ready(identity.clone()));
                Ok(identity)
            }
            Err(e) => {
                tracing::warn!(error = %e, "session unavailable");
                self.lifecycle
                    .send_replace(SessionLifecycle::Unavailable(e.to_string()));
                Err(e)
            }
        }
    }

    /// Like [`ensure_session`](Self::ensure_session), but applies the
    /// configured [`FailurePolicy`].
    ///
    /// With [`FailurePolicy::ProceedReadOnly`] an unreachable service
    /// yields [`Readiness::ReadOnly`] instead of an error, so the caller can
    /// mark itself ready and keep the app usable.
    ///
    /// # Errors
    /// Whatever `ensure_session` returns, unless the policy absorbs it.
    pub async fn ensure_ready(&self) -> Result<Readiness, SessionError> {
        match self.ensure_session().await {
            Ok(identity) => Ok(Readiness::Session(identity)),
            Err(e @ SessionError::SessionUnavailable { .. })
                if self.config.failure_policy == FailurePolicy::ProceedReadOnly =>
            {
                tracing::info!(error = %e, "continuing in read-only mode");
                Ok(Readiness::ReadOnly {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Forgets the identity locally. The next `ensure_session` starts over.
    ///
    /// # Errors
    /// Propagates token store failures; the lifecycle is reset regardless.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let _in_flight = self.in_flight.lock().await;
        self.lifecycle.send_replace(SessionLifecycle::Uninitialized);
        self.store.clear().await
    }

    /// The current lifecycle state.
    pub fn lifecycle(&self) -> SessionLifecycle {
        self.lifecycle.borrow().clone()
    }

    /// A receiver that observes every lifecycle change.
    pub fn watch(&self) -> watch::Receiver<SessionLifecycle> {
        self.lifecycle.subscribe()
    }

    fn ready_identity(&self) -> Option<Identity> {
        self.lifecycle.borrow().identity().cloned()
    }

    async fn create_with_retry(&self) -> Result<Identity, SessionError> {
        let policy = &self.config.retry;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.service.create_anonymous_session().await {
                Ok(identity) => return Ok(identity),
                Err(e) if policy.allows(attempts) => {
                    let delay = policy.delay(attempts - 1);
                    tracing::debug!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "session request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(SessionError::SessionUnavailable {
                        attempts,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionManager`.
    //!
    //! Naming: `test_{function}_{scenario}_{expected}`. Retry tests run on
    //! paused Tokio time so backoff sleeps complete instantly.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use warfront_protocol::{BackoffPolicy, IdentityId};

    use super::*;
    use crate::MemoryTokenStore;

    // -- Helpers ----------------------------------------------------------

    /// Fails the first `failures` calls, then issues identities numbered by
    /// call count. Each call takes 10ms so concurrent callers overlap.
    struct FlakyService {
        calls: Arc<AtomicU32>,
        failures: u32,
    }

    impl FlakyService {
        fn new(failures: u32) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    calls: Arc::clone(&calls),
                    failures,
                },
                calls,
            )
        }
    }

    impl SessionService for FlakyService {
        async fn create_anonymous_session(&self) -> Result<Identity, SessionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
            if n <= self.failures {
                return Err(SessionError::AuthFailed("service down".into()));
            }
            Ok(identity(u64::from(n)))
        }
    }

    fn identity(id: u64) -> Identity {
        Identity {
            id: IdentityId(id),
            token: format!("token-{id}"),
            created_at: 1,
            is_anonymous: true,
        }
    }

    fn config(max_attempts: u32, failure_policy: FailurePolicy) -> SessionConfig {
        SessionConfig {
            retry: BackoffPolicy {
                initial_ms: 50,
                max_ms: 400,
                multiplier: 2.0,
                max_attempts: Some(max_attempts),
            },
            failure_policy,
        }
    }

    // =====================================================================
    // ensure_session()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_ensure_session_creates_and_persists_identity() {
        let (service, calls) = FlakyService::new(0);
        let mgr = SessionManager::new(service, MemoryTokenStore::new(), SessionConfig::default());

        let identity = mgr.ensure_session().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.lifecycle(), SessionLifecycle::Ready(identity.clone()));
        assert_eq!(mgr.store.load().await.unwrap(), Some(identity));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_session_repeated_calls_return_same_identity() {
        let (service, calls) = FlakyService::new(0);
        let mgr = SessionManager::new(service, MemoryTokenStore::new(), SessionConfig::default());

        let first = mgr.ensure_session().await.unwrap();
        let second = mgr.ensure_session().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_session_concurrent_calls_collapse_into_one_request() {
        let (service, calls) = FlakyService::new(0);
        let mgr = Arc::new(SessionManager::new(
            service,
            MemoryTokenStore::new(),
            SessionConfig::default(),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let mgr = Arc::clone(&mgr);
                tokio::spawn(async move { mgr.ensure_session().await })
            })
            .collect();
        let results = futures_util::future::join_all(tasks).await;

        let ids: Vec<IdentityId> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap().id)
            .collect();
        assert!(ids.iter().all(|id| *id == ids[0]), "all callers share one identity");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "service called exactly once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_session_concurrent_calls_share_one_failed_attempt() {
        let (service, calls) = FlakyService::new(u32::MAX);
        let mgr = Arc::new(SessionManager::new(
            service,
            MemoryTokenStore::new(),
            config(3, FailurePolicy::Block),
        ));
        let start = tokio::time::Instant::now();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let mgr = Arc::clone(&mgr);
                tokio::spawn(async move {
                    let result = mgr.ensure_session().await;
                    (result, start.elapsed())
                })
            })
            .collect();
        let results = futures_util::future::join_all(tasks).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3, "one retry schedule for everyone");
        for joined in results {
            let (result, waited) = joined.unwrap();
            assert!(
                matches!(result, Err(SessionError::SessionUnavailable { attempts: 3, .. })),
                "got {result:?}"
            );
            // 3 × 10ms calls plus 50ms and 100ms of backoff.
            assert!(waited <= Duration::from_millis(200), "waited {waited:?}");
        }

        // The next call starts a fresh attempt.
        assert!(mgr.ensure_session().await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_session_uses_stored_identity_without_service_call() {
        let (service, calls) = FlakyService::new(0);
        let stored = identity(99);
        let mgr = SessionManager::new(
            service,
            MemoryTokenStore::with_identity(stored.clone()),
            SessionConfig::default(),
        );

        let identity = mgr.ensure_session().await.unwrap();

        assert_eq!(identity, stored);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_session_retries_until_service_recovers() {
        let (service, calls) = FlakyService::new(2);
        let mgr = SessionManager::new(
            service,
            MemoryTokenStore::new(),
            config(5, FailurePolicy::Block),
        );

        let identity = mgr.ensure_session().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(identity.id, IdentityId(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_session_exhausted_retries_is_unavailable() {
        let (service, calls) = FlakyService::new(u32::MAX);
        let mgr = SessionManager::new(
            service,
            MemoryTokenStore::new(),
            config(3, FailurePolicy::Block),
        );

        let result = mgr.ensure_session().await;

        assert!(
            matches!(result, Err(SessionError::SessionUnavailable { attempts: 3, .. })),
            "got {result:?}"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(mgr.lifecycle(), SessionLifecycle::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_session_after_unavailable_tries_again() {
        // Two failures with one attempt per call: the third call succeeds.
        let (service, calls) = FlakyService::new(2);
        let mgr = SessionManager::new(
            service,
            MemoryTokenStore::new(),
            config(1, FailurePolicy::Block),
        );

        assert!(mgr.ensure_session().await.is_err());
        assert!(mgr.ensure_session().await.is_err());
        let identity = mgr.ensure_session().await.unwrap();

        assert_eq!(identity.id, IdentityId(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_observes_pending_then_ready() {
        let (service, _) = FlakyService::new(0);
        let mgr = Arc::new(SessionManager::new(
            service,
            MemoryTokenStore::new(),
            SessionConfig::default(),
        ));
        let mut rx = mgr.watch();
        assert_eq!(*rx.borrow(), SessionLifecycle::Uninitialized);

        let task = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.ensure_session().await })
        };

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SessionLifecycle::Pending);

        let identity = task.await.unwrap().unwrap();
        assert_eq!(mgr.lifecycle(), SessionLifecycle::Ready(identity));
    }

    // =====================================================================
    // ensure_ready()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_ensure_ready_read_only_policy_absorbs_outage() {
        let (service, _) = FlakyService::new(u32::MAX);
        let mgr = SessionManager::new(
            service,
            MemoryTokenStore::new(),
            config(2, FailurePolicy::ProceedReadOnly),
        );

        let readiness = mgr.ensure_ready().await.unwrap();

        assert!(!readiness.can_mutate());
        assert!(matches!(readiness, Readiness::ReadOnly { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_ready_block_policy_surfaces_outage() {
        let (service, _) = FlakyService::new(u32::MAX);
        let mgr = SessionManager::new(
            service,
            MemoryTokenStore::new(),
            config(2, FailurePolicy::Block),
        );

        let result = mgr.ensure_ready().await;

        assert!(matches!(result, Err(SessionError::SessionUnavailable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_ready_with_session_can_mutate() {
        let (service, _) = FlakyService::new(0);
        let mgr = SessionManager::new(service, MemoryTokenStore::new(), SessionConfig::default());

        assert!(mgr.ensure_ready().await.unwrap().can_mutate());
    }

    // =====================================================================
    // sign_out()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_clears_store_and_next_call_creates_new_identity() {
        let (service, calls) = FlakyService::new(0);
        let mgr = SessionManager::new(service, MemoryTokenStore::new(), SessionConfig::default());
        let first = mgr.ensure_session().await.unwrap();

        mgr.sign_out().await.unwrap();
        assert_eq!(mgr.lifecycle(), SessionLifecycle::Uninitialized);
        assert_eq!(mgr.store.load().await.unwrap(), None);

        let second = mgr.ensure_session().await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
