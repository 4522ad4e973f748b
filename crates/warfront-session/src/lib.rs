//! Durable player identity for Warfront.
//!
//! Nothing in a game may change until the player has an identity. This
//! crate covers both ends of that:
//!
//! 1. **Client side**: [`SessionManager::ensure_session`] returns the
//!    stored identity or obtains a new anonymous one, collapsing concurrent
//!    callers into a single request and retrying with backoff.
//! 2. **Server side**: [`IdentityRegistry`] issues anonymous identities
//!    ([`SessionService`]) and resolves reconnect tokens back to them
//!    ([`Authenticator`]).
//! 3. **Storage**: [`TokenStore`] persists the identity between runs
//!    ([`FileTokenStore`], [`MemoryTokenStore`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Game layer (above)   ← only accepts joins from an established identity
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Protocol (below)     ← Identity, IdentityId
//! ```

mod auth;
mod config;
mod error;
mod manager;
mod registry;
mod store;

pub use auth::{Authenticator, SessionService};
pub use config::{FailurePolicy, Readiness, SessionConfig, SessionLifecycle};
pub use error::SessionError;
pub use manager::SessionManager;
pub use registry::IdentityRegistry;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
