//! `WarfrontServer` builder and server loop.
//!
//! This is the entry point for running a Warfront game server. It ties
//! together all the layers: transport → protocol → session → game.

use std::sync::Arc;
use std::time::Instant;

use warfront_combat::{CombatEngine, StatTable};
use warfront_game::{GameConfig, GameManager};
use warfront_protocol::JsonCodec;
use warfront_session::{Authenticator, IdentityRegistry, SessionService};
use warfront_sync::SyncConfig;

use crate::handler::handle_connection;
use crate::transport::WebSocketTransport;
use crate::{ServerConfig, WarfrontError};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// File name of the identity ledger inside the journal directory.
pub const IDENTITY_LEDGER: &str = "identities.jsonl";

/// Identity backends the server accepts: authenticate returning clients,
/// issue identities to new ones.
pub trait IdentityProvider: Authenticator + SessionService {}

impl<T: Authenticator + SessionService> IdentityProvider for T {}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<I: IdentityProvider> {
    pub(crate) games: GameManager,
    pub(crate) identities: I,
    pub(crate) codec: JsonCodec,
    pub(crate) config: ServerConfig,
    pub(crate) started: Instant,
}

impl<I: IdentityProvider> ServerState<I> {
    /// Milliseconds since the server started.
    pub(crate) fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Builder for configuring and starting a Warfront server.
///
/// # Example
///
/// ```rust,ignore
/// use warfront::prelude::*;
///
/// let server = WarfrontServer::builder()
///     .bind("0.0.0.0:8080")
///     .stat_table(table)
///     .build_with_registry()
///     .await?;
/// server.run().await
/// ```
pub struct WarfrontServerBuilder {
    config: ServerConfig,
    table: Option<Arc<StatTable>>,
    engine: Option<Arc<dyn CombatEngine>>,
}

impl WarfrontServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            table: None,
            engine: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.config.game = config;
        self
    }

    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.config.sync = config;
        self
    }

    /// Sets the faction and unit stats. Required.
    pub fn stat_table(mut self, table: StatTable) -> Self {
        self.table = Some(Arc::new(table));
        self
    }

    /// Replaces the standard combat engine.
    pub fn engine(mut self, engine: Arc<dyn CombatEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Builds with the standard [`IdentityRegistry`]. With a journal
    /// directory configured, identities are kept in [`IDENTITY_LEDGER`]
    /// next to the game journals and reloaded before any game is restored,
    /// so returning clients keep their seats across restarts.
    pub async fn build_with_registry(
        self,
    ) -> Result<WarfrontServer<IdentityRegistry>, WarfrontError> {
        let identities = match &self.config.sync.journal_dir {
            Some(dir) => IdentityRegistry::open(dir.join(IDENTITY_LEDGER)).await?,
            None => IdentityRegistry::new(),
        };
        self.build(identities).await
    }

    /// Validates the stat table, restores journaled games and binds the
    /// listener.
    pub async fn build<I: IdentityProvider>(
        self,
        identities: I,
    ) -> Result<WarfrontServer<I>, WarfrontError> {
        let table = self.table.ok_or(WarfrontError::MissingStatTable)?;
        table.validate()?;

        let games = match self.engine {
            Some(engine) => GameManager::with_engine(
                self.config.game.clone(),
                self.config.sync.clone(),
                table,
                engine,
            ),
            None => GameManager::new(self.config.game.clone(), self.config.sync.clone(), table),
        };
        let restored = games.restore().await?;
        if restored > 0 {
            tracing::info!(restored, "games restored from journal");
        }

        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let state = Arc::new(ServerState {
            games,
            identities,
            codec: JsonCodec,
            config: self.config,
            started: Instant::now(),
        });

        Ok(WarfrontServer { transport, state })
    }
}

impl Default for WarfrontServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Warfront game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct WarfrontServer<I: IdentityProvider> {
    transport: WebSocketTransport,
    state: Arc<ServerState<I>>,
}

impl WarfrontServer<IdentityRegistry> {
    /// Creates a new builder.
    pub fn builder() -> WarfrontServerBuilder {
        WarfrontServerBuilder::new()
    }
}

impl<I: IdentityProvider> WarfrontServer<I> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The games this server hosts.
    pub fn games(&self) -> &GameManager {
        &self.state.games
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), WarfrontError> {
        let games = self.state.games.game_count().await;
        tracing::info!(games, "Warfront server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
