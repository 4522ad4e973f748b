//! Collaborator traits at the edges of the session layer.
//!
//! Both traits follow the same shape: one async method, `Send + Sync +
//! 'static` so a single instance can be shared by every connection task.
//! The in-process [`IdentityRegistry`](crate::IdentityRegistry) implements
//! both; tests substitute mocks.

use warfront_protocol::Identity;

use crate::SessionError;

/// Issues new identities. This is what the client-side
/// [`SessionManager`](crate::SessionManager) talks to.
///
/// # Example
///
/// ```rust
/// use warfront_protocol::{Identity, IdentityId};
/// use warfront_session::{SessionError, SessionService};
///
/// /// Always hands out the same identity. Useful in local tools.
/// struct FixedService;
///
/// impl SessionService for FixedService {
///     async fn create_anonymous_session(&self) -> Result<Identity, SessionError> {
///         Ok(Identity {
///             id: IdentityId(1),
///             token: "fixed".into(),
///             created_at: 0,
///             is_anonymous: true,
///         })
///     }
/// }
/// ```
pub trait SessionService: Send + Sync + 'static {
    /// Creates a fresh anonymous identity.
    ///
    /// # Errors
    /// Transport or service failures. The session manager retries these
    /// and finally reports [`SessionError::SessionUnavailable`].
    fn create_anonymous_session(
        &self,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

/// Resolves a token presented during the handshake to its identity.
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the identity the token was issued to.
    ///
    /// # Errors
    /// [`SessionError::InvalidToken`] when the token is unknown or revoked.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}
