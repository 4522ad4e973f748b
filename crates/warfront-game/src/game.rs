//! Game actor: an isolated Tokio task that owns one game instance.
//!
//! The actor is the single writer for its game. Every mutation arrives as
//! a [`GameCommand`] on a bounded channel, is validated against the current
//! state, appended to the [`EventLog`] and applied, all before the next
//! command is dequeued. Readers never go through the actor: subscriptions
//! read the shared log directly.
//!
//! A completed game archives itself: the actor moves its log into the
//! manager's archive and stops. A halted game stays registered so that
//! every later mutation is answered with [`GameError::GameHalted`].

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot};
use warfront_combat::{CombatEngine, CombatError, StatTable, derive_seed, verify};
use warfront_protocol::{
    Action, CombatDeclaration, EventKind, GameId, GameListEntry, GameSnapshot, IdentityId,
    Participant, StateEvent,
};
use warfront_sync::{EventLog, Subscription};

use crate::manager::Directory;
use crate::registry::{JoinPlan, JoinRequest, plan_join, plan_leave};
use crate::rules::{Plan, check_start, completion, plan_action, start_event};
use crate::{GameConfig, GameError, GameState};

/// Commands sent to a game actor through its channel.
pub(crate) enum GameCommand {
    Join {
        request: JoinRequest,
        reply: oneshot::Sender<Result<Participant, GameError>>,
    },
    Leave {
        identity_id: IdentityId,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Start {
        identity_id: IdentityId,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Act {
        identity_id: IdentityId,
        action: Action,
        reply: oneshot::Sender<Result<Vec<StateEvent>, GameError>>,
    },
    Snapshot {
        reply: oneshot::Sender<GameSnapshot>,
    },
    Shutdown,
}

/// Handle to a running game actor.
///
/// Cheap to clone: a channel sender and the game's log.
#[derive(Clone)]
pub struct GameHandle {
    game_id: GameId,
    sender: mpsc::Sender<GameCommand>,
    log: Arc<EventLog>,
    max_participants: usize,
}

impl GameHandle {
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Claims a faction and color. A reconnecting identity gets its
    /// existing seat back instead.
    pub async fn join(&self, request: JoinRequest) -> Result<Participant, GameError> {
        self.request(|reply| GameCommand::Join { request, reply }).await?
    }

    /// Gives up a seat. Only possible in the lobby.
    pub async fn leave(&self, identity_id: IdentityId) -> Result<(), GameError> {
        self.request(|reply| GameCommand::Leave { identity_id, reply })
            .await?
    }

    /// Closes the lobby and starts the first turn.
    pub async fn start(&self, identity_id: IdentityId) -> Result<(), GameError> {
        self.request(|reply| GameCommand::Start { identity_id, reply })
            .await?
    }

    /// Submits a turn action. Returns the events it committed.
    pub async fn act(
        &self,
        identity_id: IdentityId,
        action: Action,
    ) -> Result<Vec<StateEvent>, GameError> {
        self.request(|reply| GameCommand::Act {
            identity_id,
            action,
            reply,
        })
        .await?
    }

    /// The current state, consistent with every event up to
    /// `snapshot.last_sequence`.
    pub async fn snapshot(&self) -> Result<GameSnapshot, GameError> {
        self.request(|reply| GameCommand::Snapshot { reply }).await
    }

    /// A lobby-list summary.
    pub async fn summary(&self) -> Result<GameListEntry, GameError> {
        let snapshot = self.snapshot().await?;
        Ok(GameListEntry {
            game_id: self.game_id,
            status: snapshot.status,
            participant_count: snapshot.participants.len(),
            max_participants: self.max_participants,
        })
    }

    /// Every event after `from_sequence`, then live events until the game
    /// ends.
    pub async fn subscribe(&self, from_sequence: u64) -> Subscription {
        self.log.subscribe(from_sequence).await
    }

    /// The game's event log.
    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    /// Stops the actor. The log stays readable.
    pub async fn shutdown(&self) -> Result<(), GameError> {
        self.sender
            .send(GameCommand::Shutdown)
            .await
            .map_err(|_| GameError::Unavailable(self.game_id))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> GameCommand,
    ) -> Result<T, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| GameError::Unavailable(self.game_id))?;
        reply_rx
            .await
            .map_err(|_| GameError::Unavailable(self.game_id))
    }
}

/// Everything a game actor needs besides its state.
#[derive(Clone)]
pub(crate) struct GameDeps {
    pub config: GameConfig,
    pub table: Arc<StatTable>,
    pub engine: Arc<dyn CombatEngine>,
    /// Where a finished game archives itself. Weak so dropping the manager
    /// still stops every actor.
    pub directory: Weak<Directory>,
}

/// The internal actor state. Runs inside a Tokio task.
struct GameActor {
    game_id: GameId,
    state: GameState,
    log: Arc<EventLog>,
    deps: GameDeps,
    /// Root for combat seeds, used when this game starts.
    seed: u64,
    /// Set once the game completed; the actor archives and stops.
    finished: bool,
    receiver: mpsc::Receiver<GameCommand>,
}

impl GameActor {
    async fn run(mut self) {
        tracing::info!(game_id = %self.game_id, "game actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                GameCommand::Join { request, reply } => {
                    let result = self.handle_join(request).await;
                    let _ = reply.send(result);
                }
                GameCommand::Leave { identity_id, reply } => {
                    let result = self.handle_leave(identity_id).await;
                    let _ = reply.send(result);
                }
                GameCommand::Start { identity_id, reply } => {
                    let result = self.handle_start(identity_id).await;
                    let _ = reply.send(result);
                }
                GameCommand::Act {
                    identity_id,
                    action,
                    reply,
                } => {
                    let result = self.handle_act(identity_id, action).await;
                    // Archive before replying so the caller never sees a
                    // completed game still registered as live.
                    if self.finished {
                        self.archive().await;
                    }
                    let _ = reply.send(result);
                }
                GameCommand::Snapshot { reply } => {
                    let _ = reply.send(self.state.snapshot());
                }
                GameCommand::Shutdown => {
                    tracing::info!(game_id = %self.game_id, "game shutting down");
                    if self.state.status.is_joinable() {
                        self.release_lobby();
                    }
                    break;
                }
            }
            if self.finished {
                break;
            }
        }

        tracing::info!(game_id = %self.game_id, "game actor stopped");
    }

    async fn handle_join(&mut self, request: JoinRequest) -> Result<Participant, GameError> {
        let identity_id = request.identity_id;
        match plan_join(&self.state, &self.deps.table, &self.deps.config, request)? {
            JoinPlan::Rebind(participant) => {
                tracing::info!(
                    game_id = %self.game_id,
                    %identity_id,
                    faction = %participant.faction_id,
                    "participant rebound"
                );
                Ok(participant)
            }
            JoinPlan::Admit(participant) => {
                self.ensure_running()?;
                self.commit(EventKind::ParticipantJoined {
                    participant: participant.clone(),
                })
                .await?;
                tracing::info!(
                    game_id = %self.game_id,
                    %identity_id,
                    faction = %participant.faction_id,
                    color = %participant.color,
                    participants = self.state.participants.len(),
                    "participant joined"
                );

                if self.deps.config.auto_start
                    && self.state.participants.len() >= self.deps.config.max_participants
                {
                    self.begin().await?;
                }
                Ok(participant)
            }
        }
    }

    async fn handle_leave(&mut self, identity_id: IdentityId) -> Result<(), GameError> {
        self.ensure_running()?;
        let event = plan_leave(&self.state, identity_id)?;
        self.commit(event).await?;
        tracing::info!(
            game_id = %self.game_id,
            %identity_id,
            participants = self.state.participants.len(),
            "participant left"
        );
        Ok(())
    }

    async fn handle_start(&mut self, identity_id: IdentityId) -> Result<(), GameError> {
        self.ensure_running()?;
        check_start(&self.state, &self.deps.config, identity_id)?;
        self.begin().await
    }

    async fn begin(&mut self) -> Result<(), GameError> {
        let event = start_event(&self.state, &self.deps.table, self.seed)?;
        self.commit(event).await?;
        self.release_lobby();
        tracing::info!(
            game_id = %self.game_id,
            participants = self.state.participants.len(),
            "game started"
        );
        Ok(())
    }

    async fn handle_act(
        &mut self,
        identity_id: IdentityId,
        action: Action,
    ) -> Result<Vec<StateEvent>, GameError> {
        self.ensure_running()?;
        let action_name = action.name();

        let events = match plan_action(&self.state, identity_id, action) {
            Ok(Plan::Commit(kind)) => vec![self.commit(kind).await?],
            Ok(Plan::Resolve(declaration)) => self.resolve(declaration).await?,
            Err(e) => {
                tracing::debug!(
                    game_id = %self.game_id,
                    %identity_id,
                    action = action_name,
                    reason = %e,
                    "action rejected"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            game_id = %self.game_id,
            %identity_id,
            action = action_name,
            committed = events.len(),
            "action committed"
        );
        Ok(events)
    }

    /// Resolves, verifies and commits a combat. The result is committed
    /// whole or not at all; a result that fails verification halts the
    /// game.
    async fn resolve(&mut self, declaration: CombatDeclaration) -> Result<Vec<StateEvent>, GameError> {
        let seed = derive_seed(self.state.seed, declaration.id);

        let result = match self.deps.engine.resolve(&declaration, seed) {
            Ok(result) => result,
            Err(e) if e.is_fatal() => return Err(self.halt(e).await),
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = verify(&result, &declaration) {
            return Err(self.halt(e).await);
        }

        tracing::info!(
            game_id = %self.game_id,
            declaration = %declaration.id,
            outcome = ?result.outcome,
            seed,
            "combat resolved"
        );

        let mut events = vec![self.commit(EventKind::CombatResolved { result }).await?];
        if let Some(end) = completion(&self.state) {
            events.push(self.commit(end).await?);
            self.finished = true;
            tracing::info!(game_id = %self.game_id, status = %self.state.status, "game completed");
        }
        Ok(events)
    }

    /// Appends and applies one event.
    async fn commit(&mut self, kind: EventKind) -> Result<StateEvent, GameError> {
        let event = self.log.append(kind).await?;
        if let Err(e) = self.state.apply(&event) {
            // The log and the state disagree; nothing after this can be
            // trusted.
            tracing::error!(game_id = %self.game_id, error = %e, "state diverged from log");
            self.state.halted = Some(format!("state diverged from log: {e}"));
            return Err(e);
        }
        Ok(event)
    }

    /// Stops the game for good. The halt is journaled so a restored game
    /// stays halted.
    async fn halt(&mut self, error: CombatError) -> GameError {
        tracing::error!(
            game_id = %self.game_id,
            error = %error,
            "combat resolution violated an invariant, game halted"
        );
        let reason = error.to_string();
        match self.log.append(EventKind::GameHalted { reason: reason.clone() }).await {
            Ok(event) => {
                let _ = self.state.apply(&event);
            }
            Err(e) => {
                tracing::error!(game_id = %self.game_id, error = %e, "halt could not be journaled");
            }
        }
        if !self.state.is_halted() {
            self.state.halted = Some(reason);
        }
        GameError::Combat(error)
    }

    fn ensure_running(&self) -> Result<(), GameError> {
        if self.state.is_halted() {
            Err(GameError::GameHalted(self.game_id))
        } else {
            Ok(())
        }
    }

    /// Frees this game's slot in the open-lobby count.
    fn release_lobby(&self) {
        if let Some(directory) = self.deps.directory.upgrade() {
            directory.release_lobby();
        }
    }

    async fn archive(&self) {
        if let Some(directory) = self.deps.directory.upgrade() {
            directory.archive(self.game_id, Arc::clone(&self.log)).await;
        }
    }
}

/// Spawns a game actor over `log` (empty or restored) and returns a handle.
pub(crate) fn spawn_game(
    state: GameState,
    log: Arc<EventLog>,
    deps: GameDeps,
    seed: u64,
) -> GameHandle {
    let (tx, rx) = mpsc::channel(deps.config.channel_size.max(1));
    let game_id = state.game_id;
    let max_participants = deps.config.max_participants;

    let actor = GameActor {
        game_id,
        state,
        log: Arc::clone(&log),
        deps,
        seed,
        finished: false,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    GameHandle {
        game_id,
        sender: tx,
        log,
        max_participants,
    }
}
