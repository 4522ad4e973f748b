//! Games for Warfront: who plays, whose turn it is, and what happens when
//! armies meet.
//!
//! Each game runs as an isolated Tokio task (actor model). The actor is the
//! only writer of its game: requests are validated against the current
//! [`GameState`], committed to the game's
//! [`EventLog`](warfront_sync::EventLog) and applied, one at a time.
//!
//! # Key types
//!
//! - [`GameManager`]: creates, looks up and restores games
//! - [`GameHandle`]: send requests to a running game actor
//! - [`GameState`]: the event-sourced state every replica shares
//! - [`GameView`]: a client-side replica fed from a subscription
//! - [`GameConfig`]: seats, auto-start and seeding

mod config;
mod error;
mod game;
mod manager;
mod registry;
mod rules;
mod state;
mod view;

pub use config::GameConfig;
pub use error::GameError;
pub use game::GameHandle;
pub use manager::GameManager;
pub use registry::{JoinRequest, MAX_DISPLAY_NAME};
pub use state::GameState;
pub use view::GameView;
