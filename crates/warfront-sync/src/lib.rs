//! State synchronization for Warfront.
//!
//! Every committed change to a game is a [`StateEvent`](warfront_protocol::StateEvent)
//! in that game's [`EventLog`]. The log hands out strictly increasing,
//! gap-free sequence numbers and lets any number of subscribers read from
//! any earlier point:
//!
//! - [`EventLog`] / [`Subscription`]: the server-side log and its readers
//! - [`Journal`]: JSON-lines persistence, replayed on restart
//! - [`EventCursor`]: consumer-side idempotence for at-least-once delivery
//! - [`ResumingSubscriber`] / [`EventSource`]: reconnect-and-resume with
//!   exponential backoff

mod config;
mod cursor;
mod error;
mod journal;
mod log;
mod resume;

pub use config::SyncConfig;
pub use cursor::{Delivery, EventCursor};
pub use error::SyncError;
pub use journal::Journal;
pub use log::{EventLog, Subscription};
pub use resume::{EventSource, EventStream, ResumingSubscriber};
