//! Game manager: creates, tracks, archives and restores game actors.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures_util::StreamExt;
use tokio::sync::RwLock;
use warfront_combat::{CombatEngine, StatEngine, StatTable};
use warfront_protocol::{GameId, GameListEntry, GameSnapshot};
use warfront_sync::{EventLog, EventSource, EventStream, Subscription, SyncConfig, SyncError};

use crate::game::{GameDeps, spawn_game};
use crate::{GameConfig, GameError, GameHandle, GameState};

/// Owns every game on this server.
///
/// Cheap to clone; clones share the same games. This is the entry point
/// for game operations from the server layer.
#[derive(Clone)]
pub struct GameManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    directory: Arc<Directory>,
    next_id: AtomicU64,
    deps: GameDeps,
    sync: SyncConfig,
}

/// Live games, archived logs and the open-lobby count. Actors hold a weak
/// reference to archive themselves and release their lobby slot.
#[derive(Default)]
pub(crate) struct Directory {
    games: RwLock<HashMap<GameId, GameHandle>>,
    archive: RwLock<HashMap<GameId, Arc<EventLog>>>,
    lobbies: AtomicUsize,
}

impl Directory {
    /// Claims a lobby slot, or `false` when `limit` are already open.
    fn claim_lobby(&self, limit: usize) -> bool {
        self.lobbies
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < limit).then_some(open + 1)
            })
            .is_ok()
    }

    pub(crate) fn release_lobby(&self) {
        let _ = self
            .lobbies
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                Some(open.saturating_sub(1))
            });
    }

    /// Moves a finished game from the live set to the archive.
    pub(crate) async fn archive(&self, game_id: GameId, log: Arc<EventLog>) {
        self.games.write().await.remove(&game_id);
        self.archive.write().await.insert(game_id, log);
        tracing::info!(%game_id, "game archived");
    }

    async fn archived(&self, game_id: GameId) -> Option<Arc<EventLog>> {
        self.archive.read().await.get(&game_id).cloned()
    }
}

impl GameManager {
    /// A manager resolving combat with the standard engine over `table`.
    pub fn new(config: GameConfig, sync: SyncConfig, table: Arc<StatTable>) -> Self {
        let engine = Arc::new(StatEngine::new(Arc::clone(&table)));
        Self::with_engine(config, sync, table, engine)
    }

    /// A manager with a custom combat engine.
    pub fn with_engine(
        config: GameConfig,
        sync: SyncConfig,
        table: Arc<StatTable>,
        engine: Arc<dyn CombatEngine>,
    ) -> Self {
        let directory = Arc::new(Directory::default());
        Self {
            inner: Arc::new(ManagerInner {
                next_id: AtomicU64::new(1),
                deps: GameDeps {
                    config,
                    table,
                    engine,
                    directory: Arc::downgrade(&directory),
                },
                directory,
                sync,
            }),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.inner.deps.config
    }

    pub fn table(&self) -> &StatTable {
        &self.inner.deps.table
    }

    /// Opens a new lobby and returns its id.
    ///
    /// # Errors
    /// [`GameError::TooManyLobbies`] when `max_open_lobbies` lobbies are
    /// waiting for players. [`GameError::Sync`] if the game's journal can't
    /// be created.
    pub async fn create(&self) -> Result<GameId, GameError> {
        let directory = &self.inner.directory;
        let limit = self.inner.deps.config.max_open_lobbies;
        if !directory.claim_lobby(limit) {
            tracing::warn!(limit, "lobby limit reached, refusing to create a game");
            return Err(GameError::TooManyLobbies { limit });
        }

        let game_id = GameId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let log = match EventLog::create(game_id, &self.inner.sync).await {
            Ok(log) => log,
            Err(e) => {
                directory.release_lobby();
                return Err(e.into());
            }
        };
        let seed = self.inner.deps.config.seed.unwrap_or_else(rand::random);

        let handle = spawn_game(GameState::new(game_id), log, self.inner.deps.clone(), seed);
        directory.games.write().await.insert(game_id, handle);

        tracing::info!(%game_id, "game created");
        Ok(game_id)
    }

    /// The handle of a running game.
    ///
    /// # Errors
    /// [`GameError::Archived`] for a completed game,
    /// [`GameError::NotFound`] for an id this server never had.
    pub async fn get(&self, game_id: GameId) -> Result<GameHandle, GameError> {
        let live = self.inner.directory.games.read().await.get(&game_id).cloned();
        if let Some(handle) = live {
            return Ok(handle);
        }
        if self.inner.directory.archived(game_id).await.is_some() {
            return Err(GameError::Archived(game_id));
        }
        Err(GameError::NotFound(game_id))
    }

    /// The current snapshot of a live game, or the final one of an
    /// archived game.
    pub async fn snapshot(&self, game_id: GameId) -> Result<GameSnapshot, GameError> {
        match self.get(game_id).await {
            Ok(handle) => handle.snapshot().await,
            Err(GameError::Archived(_)) => {
                let log = self.log(game_id).await?;
                let events = log.events_after(0).await;
                Ok(GameState::replay(game_id, &events)?.snapshot())
            }
            Err(e) => Err(e),
        }
    }

    /// Events after `from_sequence`, live or archived.
    pub async fn subscribe(
        &self,
        game_id: GameId,
        from_sequence: u64,
    ) -> Result<Subscription, GameError> {
        Ok(self.log(game_id).await?.subscribe(from_sequence).await)
    }

    async fn log(&self, game_id: GameId) -> Result<Arc<EventLog>, GameError> {
        let live = self.inner.directory.games.read().await.get(&game_id).cloned();
        if let Some(handle) = live {
            return Ok(Arc::clone(handle.log()));
        }
        self.inner
            .directory
            .archived(game_id)
            .await
            .ok_or(GameError::NotFound(game_id))
    }

    /// Summaries of games still in the lobby, oldest first.
    ///
    /// Games that fail to respond (e.g., shutting down) are skipped.
    pub async fn list_joinable(&self) -> Vec<GameListEntry> {
        let mut entries = Vec::new();
        for handle in self.handles().await {
            if let Ok(entry) = handle.summary().await {
                if entry.status.is_joinable() {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by_key(|e| e.game_id);
        entries
    }

    /// Shuts a game down and forgets it. Its journal stays on disk.
    pub async fn remove(&self, game_id: GameId) -> Result<(), GameError> {
        let handle = self
            .inner
            .directory
            .games
            .write()
            .await
            .remove(&game_id)
            .ok_or(GameError::NotFound(game_id))?;
        let _ = handle.shutdown().await;
        tracing::info!(%game_id, "game removed");
        Ok(())
    }

    /// Games with a running actor: lobbies, active and halted games.
    pub async fn game_count(&self) -> usize {
        self.inner.directory.games.read().await.len()
    }

    /// Completed games whose history is kept for reading.
    pub async fn archived_count(&self) -> usize {
        self.inner.directory.archive.read().await.len()
    }

    /// Lobbies currently waiting for players.
    pub fn open_lobbies(&self) -> usize {
        self.inner.directory.lobbies.load(Ordering::Acquire)
    }

    /// Reloads every journaled game from `SyncConfig::journal_dir`.
    ///
    /// Each journal is replayed into a fresh actor, except completed games,
    /// which go straight to the archive. New games get ids past the highest
    /// restored one. Returns how many games came back.
    ///
    /// # Errors
    /// The first journal that fails to replay. Games restored before it
    /// stay registered.
    pub async fn restore(&self) -> Result<usize, GameError> {
        let Some(dir) = self.inner.sync.journal_dir.clone() else {
            return Ok(0);
        };
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(SyncError::Io(e).into()),
        };

        let mut restored = 0;
        while let Some(entry) = entries.next_entry().await.map_err(SyncError::Io)? {
            let Some(game_id) = SyncConfig::game_id_from_path(&entry.path()) else {
                continue;
            };
            let directory = &self.inner.directory;
            if directory.games.read().await.contains_key(&game_id)
                || directory.archived(game_id).await.is_some()
            {
                continue;
            }

            let log = EventLog::restore(game_id, &self.inner.sync).await?;
            let events = log.events_after(0).await;
            let state = GameState::replay(game_id, &events)?;
            let seed = if state.status.is_joinable() {
                self.inner.deps.config.seed.unwrap_or_else(rand::random)
            } else {
                state.seed
            };

            tracing::info!(
                %game_id,
                events = events.len(),
                status = %state.status,
                halted = state.is_halted(),
                "game restored"
            );
            self.inner.next_id.fetch_max(game_id.0 + 1, Ordering::Relaxed);
            restored += 1;

            if state.status.is_completed() {
                directory.archive.write().await.insert(game_id, log);
                continue;
            }
            if state.status.is_joinable() {
                // Restored lobbies count against the limit but are never
                // refused.
                directory.lobbies.fetch_add(1, Ordering::AcqRel);
            }
            let handle = spawn_game(state, log, self.inner.deps.clone(), seed);
            directory.games.write().await.insert(game_id, handle);
        }
        Ok(restored)
    }

    async fn handles(&self) -> Vec<GameHandle> {
        self.inner
            .directory
            .games
            .read()
            .await
            .values()
            .cloned()
            .collect()
    }
}

/// The manager serves event streams for every game it owns, archived ones
/// included.
impl EventSource for GameManager {
    async fn open(&self, game_id: GameId, from_sequence: u64) -> Result<EventStream, SyncError> {
        let subscription = self
            .subscribe(game_id, from_sequence)
            .await
            .map_err(|_| SyncError::NotFound(game_id))?;
        Ok(subscription.into_stream().map(Ok).boxed())
    }
}
