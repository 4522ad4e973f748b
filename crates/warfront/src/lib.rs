//! # Warfront
//!
//! Server-authoritative turn-based strategy game server.
//!
//! Clients connect over WebSocket, receive a durable identity, claim a
//! faction and color in a game lobby, and take turns moving and fighting.
//! Every committed change is a sequenced event that subscribers receive in
//! order, from any point in the game's history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warfront::prelude::*;
//!
//! # async fn run(table: StatTable) -> Result<(), WarfrontError> {
//! let server = WarfrontServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .stat_table(table)
//!     .build_with_registry()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;
mod transport;

pub use config::ServerConfig;
pub use error::WarfrontError;
pub use server::{
    IDENTITY_LEDGER, IdentityProvider, PROTOCOL_VERSION, WarfrontServer, WarfrontServerBuilder,
};
pub use transport::TransportError;

/// Everything needed to run a server or talk to one.
pub mod prelude {
    pub use crate::{
        IdentityProvider, PROTOCOL_VERSION, ServerConfig, WarfrontError, WarfrontServer,
        WarfrontServerBuilder,
    };
    pub use warfront_combat::{CombatEngine, FactionStats, StatTable, UnitDef};
    pub use warfront_game::{GameConfig, GameError, GameManager, GameView};
    pub use warfront_protocol::{
        Action, ClientMessage, Color, Envelope, FactionId, GameId, GameSnapshot, GameStatus,
        Identity, IdentityId, Phase, ServerMessage, StateEvent, UnitStack,
    };
    pub use warfront_session::{IdentityRegistry, SessionError};
    pub use warfront_sync::SyncConfig;
}
