//! Per-connection handler: handshake, auth, and request routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Authenticate the token, or issue a new anonymous identity
//!   3. Send HandshakeAck → the identity is connected
//!   4. Loop: receive envelopes → dispatch requests
//!
//! Everything the server says after the handshake goes through one
//! outbound channel drained by a writer task, so subscription events and
//! request replies never interleave mid-frame.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use warfront_game::{GameError, JoinRequest};
use warfront_protocol::{
    ClientMessage, Codec, Envelope, GameId, Identity, ProtocolError, ServerMessage,
};
use warfront_session::SessionError;

use crate::WarfrontError;
use crate::server::{IdentityProvider, PROTOCOL_VERSION, ServerState};
use crate::transport::{FrameSink, FrameStream, WebSocketConnection};

/// What the connection does after a request.
enum Flow {
    Continue,
    Close,
}

/// One authenticated connection's state.
///
/// Dropping it stops every subscription forwarder, including when the
/// handler exits early with an error.
struct Connection<I: IdentityProvider> {
    identity: Identity,
    state: Arc<ServerState<I>>,
    outbound: mpsc::Sender<ServerMessage>,
    subscriptions: HashMap<GameId, JoinHandle<()>>,
}

impl<I: IdentityProvider> Drop for Connection<I> {
    fn drop(&mut self) {
        for (_, task) in self.subscriptions.drain() {
            task.abort();
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<I: IdentityProvider>(
    conn: WebSocketConnection,
    state: Arc<ServerState<I>>,
) -> Result<(), WarfrontError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");
    let (mut sink, mut stream) = conn.split();

    // --- Step 1: Handshake ---
    let identity = perform_handshake(&mut sink, &mut stream, &state).await?;
    tracing::info!(%conn_id, identity_id = %identity.id, "identity connected");

    // --- Step 2: Writer task ---
    let (outbound, receiver) = mpsc::channel(state.config.outbound_capacity.max(1));
    let writer = tokio::spawn(write_frames(sink, receiver, Arc::clone(&state)));

    let mut connection = Connection {
        identity,
        state: Arc::clone(&state),
        outbound,
        subscriptions: HashMap::new(),
    };

    // --- Step 3: Message loop ---
    let idle = Duration::from_millis(state.config.idle_timeout_ms);
    loop {
        let data = match tokio::time::timeout(idle, stream.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(identity_id = %connection.identity.id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(identity_id = %connection.identity.id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(identity_id = %connection.identity.id, "connection timed out");
                break;
            }
        };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(identity_id = %connection.identity.id, error = %e, "failed to decode envelope");
                connection
                    .send(ServerMessage::Error {
                        code: 400,
                        message: format!("invalid message: {e}"),
                    })
                    .await;
                continue;
            }
        };

        if let Flow::Close = connection.dispatch(envelope.payload).await {
            break;
        }
    }

    // Dropping the connection stops forwarders and closes the outbound
    // channel; the writer flushes what's queued and closes the socket.
    drop(connection);
    let _ = writer.await;
    Ok(())
}

/// Performs the initial handshake and returns the connected identity.
async fn perform_handshake<I: IdentityProvider>(
    sink: &mut FrameSink,
    stream: &mut FrameStream,
    state: &ServerState<I>,
) -> Result<Identity, WarfrontError> {
    let timeout = Duration::from_millis(state.config.handshake_timeout_ms);
    let data = match tokio::time::timeout(timeout, stream.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(invalid("connection closed before handshake"));
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(invalid("handshake timed out")),
    };

    let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            send_direct(sink, state, error(400, "expected Handshake")).await?;
            return Err(e.into());
        }
    };

    let ClientMessage::Handshake { version, token } = envelope.payload else {
        send_direct(sink, state, error(400, "expected Handshake")).await?;
        return Err(invalid("first message must be Handshake"));
    };

    if version != PROTOCOL_VERSION {
        let message = format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}");
        send_direct(sink, state, error(400, &message)).await?;
        return Err(invalid("protocol version mismatch"));
    }

    let result = match token.as_deref() {
        Some(token) => state.identities.authenticate(token).await,
        None => state.identities.create_anonymous_session().await,
    };
    let identity = match result {
        Ok(identity) => identity,
        Err(e) => {
            let code = match &e {
                SessionError::SessionUnavailable { .. } => 503,
                _ => 401,
            };
            send_direct(sink, state, error(code, &e.to_string())).await?;
            return Err(e.into());
        }
    };

    send_direct(
        sink,
        state,
        ServerMessage::HandshakeAck {
            identity: identity.clone(),
            server_time: state.now_ms(),
        },
    )
    .await?;
    Ok(identity)
}

impl<I: IdentityProvider> Connection<I> {
    async fn dispatch(&mut self, msg: ClientMessage) -> Flow {
        let identity_id = self.identity.id;
        let state = Arc::clone(&self.state);
        let games = &state.games;

        let reply = match msg {
            ClientMessage::Heartbeat { client_time } => Ok(ServerMessage::HeartbeatAck {
                client_time,
                server_time: state.now_ms(),
            }),

            ClientMessage::CreateGame => games
                .create()
                .await
                .map(|game_id| ServerMessage::GameCreated { game_id }),

            ClientMessage::ListGames => Ok(ServerMessage::GameList {
                games: games.list_joinable().await,
            }),

            ClientMessage::JoinGame {
                game_id,
                faction_id,
                color,
                display_name,
            } => {
                let request = JoinRequest {
                    identity_id,
                    faction_id,
                    color,
                    display_name,
                };
                match games.get(game_id).await {
                    Ok(game) => game
                        .join(request)
                        .await
                        .map(|participant| ServerMessage::Joined {
                            game_id,
                            participant,
                        }),
                    Err(e) => Err(e),
                }
            }

            ClientMessage::LeaveGame { game_id } => match games.get(game_id).await {
                Ok(game) => game.leave(identity_id).await.map(|()| ack(game_id)),
                Err(e) => Err(e),
            },

            ClientMessage::StartGame { game_id } => match games.get(game_id).await {
                Ok(game) => game.start(identity_id).await.map(|()| ack(game_id)),
                Err(e) => Err(e),
            },

            ClientMessage::Act { game_id, action } => match games.get(game_id).await {
                // Committed events reach clients through their subscriptions.
                Ok(game) => game.act(identity_id, action).await.map(|_| ack(game_id)),
                Err(e) => Err(e),
            },

            ClientMessage::GetSnapshot { game_id } => games
                .snapshot(game_id)
                .await
                .map(|snapshot| ServerMessage::Snapshot { snapshot }),

            ClientMessage::Subscribe {
                game_id,
                from_sequence,
            } => return self.subscribe(game_id, from_sequence).await,

            ClientMessage::Unsubscribe { game_id } => {
                if let Some(task) = self.subscriptions.remove(&game_id) {
                    task.abort();
                }
                Ok(ack(game_id))
            }

            ClientMessage::Disconnect { reason } => {
                tracing::info!(%identity_id, %reason, "client disconnected");
                return Flow::Close;
            }

            ClientMessage::Handshake { .. } => {
                self.send(error(400, "already connected")).await;
                return Flow::Continue;
            }
        };

        let message = match reply {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(%identity_id, error = %e, "request rejected");
                error(error_code(&e), &e.to_string())
            }
        };
        self.send(message).await;
        Flow::Continue
    }

    /// Acks, then forwards every event after `from_sequence` until the game
    /// ends or the client unsubscribes. Resubscribing replaces the previous
    /// forwarder for that game.
    async fn subscribe(&mut self, game_id: GameId, from_sequence: u64) -> Flow {
        let mut subscription = match self.state.games.subscribe(game_id, from_sequence).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.send(error(error_code(&e), &e.to_string())).await;
                return Flow::Continue;
            }
        };
        if let Some(previous) = self.subscriptions.remove(&game_id) {
            previous.abort();
        }
        self.send(ack(game_id)).await;

        let outbound = self.outbound.clone();
        let identity_id = self.identity.id;
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                if outbound
                    .send(ServerMessage::Event { game_id, event })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            tracing::debug!(%game_id, %identity_id, "subscription drained");
        });
        self.subscriptions.insert(game_id, task);
        tracing::debug!(%game_id, %identity_id, from_sequence, "subscribed");
        Flow::Continue
    }

    async fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).await.is_err() {
            tracing::debug!(identity_id = %self.identity.id, "writer gone, dropping reply");
        }
    }
}

/// Drains the outbound channel onto the socket.
async fn write_frames<I: IdentityProvider>(
    mut sink: FrameSink,
    mut receiver: mpsc::Receiver<ServerMessage>,
    state: Arc<ServerState<I>>,
) {
    // The handshake ack was seq 0.
    let mut seq: u64 = 1;
    while let Some(message) = receiver.recv().await {
        let envelope = Envelope::new(next_seq(&mut seq), state.now_ms(), message);
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode outbound message");
                continue;
            }
        };
        if let Err(e) = sink.send(bytes).await {
            tracing::debug!(error = %e, "send failed, stopping writer");
            return;
        }
    }
    let _ = sink.close().await;
}

/// Sends one frame before the writer task exists.
async fn send_direct<I: IdentityProvider>(
    sink: &mut FrameSink,
    state: &ServerState<I>,
    message: ServerMessage,
) -> Result<(), WarfrontError> {
    let envelope = Envelope::new(0, state.now_ms(), message);
    let bytes = state.codec.encode(&envelope)?;
    sink.send(bytes).await?;
    Ok(())
}

/// Maps a rejected request to the code clients see.
fn error_code(e: &GameError) -> u16 {
    match e {
        GameError::FactionConflict(_)
        | GameError::ColorConflict(_)
        | GameError::GameFull(_)
        | GameError::NotJoinable { .. } => 409,
        GameError::NotYourTurn { .. }
        | GameError::NotParticipant(_)
        | GameError::ParticipantLocked(_) => 403,
        GameError::NotFound(_) => 404,
        GameError::Archived(_) => 410,
        GameError::TooManyLobbies { .. } => 429,
        GameError::UnknownFaction(_)
        | GameError::InvalidDisplayName
        | GameError::InvalidColor
        | GameError::NotEnoughParticipants { .. }
        | GameError::WrongPhase { .. }
        | GameError::InvalidDeclaration(_) => 400,
        GameError::Unavailable(_) => 503,
        GameError::GameHalted(_)
        | GameError::OutOfOrder { .. }
        | GameError::Sync(_)
        | GameError::Combat(_) => 500,
    }
}

fn ack(game_id: GameId) -> ServerMessage {
    ServerMessage::Ack { game_id }
}

fn error(code: u16, message: &str) -> ServerMessage {
    ServerMessage::Error {
        code,
        message: message.to_string(),
    }
}

fn invalid(message: &str) -> WarfrontError {
    WarfrontError::Protocol(ProtocolError::InvalidMessage(message.to_string()))
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
