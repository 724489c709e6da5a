use std::collections::HashMap;
use std::num::Wrapping;
use std::time::Duration;

use tokio::sync::mpsc::{channel, Sender};

use system::{
    ClientCommand, ConnectionId, DocumentSnapshot, FailureReason, Millis, RoomId, ServerEvent,
    VideoState, WallClock,
};

use crate::clock::SystemClock;
use crate::config::ServerConfig;
use crate::connection::{ConnectionCommand, ConnectionEvent};
use crate::connection_tx_storage::ConnectionTxStorage;
use crate::registry::{RegistryError, SessionRegistry};
use crate::store::EpisodeStore;

pub type ServerTx = Sender<ConnectionCommand>;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Single writer of every room. Commands are handled one at a time, so each one is
/// atomic with respect to the sessions it touches.
pub struct Server<C: WallClock = SystemClock> {
    registry: SessionRegistry,
    connections: ConnectionTxStorage,
    store: EpisodeStore,
    clock: C,
    reconnect_grace: Duration,
    /// Connections whose socket dropped, with the wall time their membership expires.
    detached: HashMap<ConnectionId, Millis>,
    connection_id_source: Wrapping<ConnectionId>,
}

impl<C: WallClock> Server<C> {
    pub fn new(store: EpisodeStore, clock: C, reconnect_grace: Duration) -> Self {
        Self {
            registry: SessionRegistry::new(),
            connections: ConnectionTxStorage::new(),
            store,
            clock,
            reconnect_grace,
            detached: HashMap::new(),
            connection_id_source: Wrapping(0),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn is_detached(&self, connection_id: ConnectionId) -> bool {
        self.detached.contains_key(&connection_id)
    }

    pub async fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { tx } => {
                let connection_id = self.new_connection_id();
                self.connections.insert(connection_id, tx);
                log::info!("connection {} opened", connection_id);
                self.connections
                    .send(&connection_id, ConnectionEvent::Attached { connection_id })
                    .await;
            }
            ConnectionCommand::Disconnect { from, graceful } => {
                self.connections.remove(&from);
                if !graceful && self.registry.room_of(from).is_some() {
                    let deadline = self.clock.now_millis() + self.reconnect_grace.as_millis() as Millis;
                    self.detached.insert(from, deadline);
                    log::info!(
                        "connection {} dropped, keeping its room for {:?}",
                        from,
                        self.reconnect_grace
                    );
                } else {
                    self.registry.leave_session(from);
                    log::info!("connection {} closed", from);
                }
            }
            ConnectionCommand::Command { from, command } => {
                self.handle_client_command(from, command).await
            }
        }
    }

    async fn handle_client_command(&mut self, from: ConnectionId, command: ClientCommand) {
        match command {
            ClientCommand::GetEpisodes => match self.store.list_episodes().await {
                Ok(episodes) => self.send(from, ServerEvent::Episodes { episodes }).await,
                Err(e) => {
                    log::warn!("cannot list episodes: {}", e);
                    self.fail(from, FailureReason::Storage(e.to_string())).await;
                }
            },
            ClientCommand::CreateOrJoinRoom { room_id: Some(room_id) } => {
                self.join_room(from, room_id).await
            }
            ClientCommand::CreateOrJoinRoom { room_id: None } => {
                self.leave_room(from).await;
                let now = self.clock.now_millis();
                let room_id = self.registry.create_session(from, now);
                self.send(from, ServerEvent::JoinedRoom { room_id }).await;
            }
            ClientCommand::JoinRoom { room_id } => self.join_room(from, room_id).await,
            ClientCommand::LeaveRoom => {
                if !self.leave_room(from).await {
                    log::debug!("connection {} left while in no room", from);
                }
            }
            ClientCommand::SetEpisode { name } => self.set_episode(from, name).await,
            ClientCommand::FetchSubtitles => match self.registry.session_of(from) {
                Ok(session) => {
                    let document = session.document.clone();
                    self.send(from, ServerEvent::Subtitles { document }).await;
                }
                Err(e) => self.reject(from, e).await,
            },
            ClientCommand::NewSubtitles { document } => self.new_subtitles(from, document).await,
            ClientCommand::FetchVideoState => {
                let now = self.clock.now_millis();
                match self.registry.session_of(from) {
                    Ok(session) => {
                        let state = session.video_state(now);
                        self.send(from, ServerEvent::VideoState(state)).await;
                    }
                    Err(e) => self.reject(from, e).await,
                }
            }
            ClientCommand::TogglePause {
                playing,
                media_timestamp_ms,
                vocals_active,
            } => {
                if !media_timestamp_ms.is_finite() {
                    return self
                        .fail(
                            from,
                            FailureReason::MalformedMessage(format!(
                                "media timestamp {} is not finite",
                                media_timestamp_ms
                            )),
                        )
                        .await;
                }
                let now = self.clock.now_millis();
                let session = match self.registry.session_of_mut(from) {
                    Ok(session) => session,
                    Err(e) => return self.reject(from, e).await,
                };
                session
                    .clock
                    .set(playing, media_timestamp_ms, vocals_active, now);
                log::debug!(
                    "room {}: playing={} at {}ms",
                    session.id,
                    playing,
                    media_timestamp_ms
                );
                let others = session.others(from);
                let state = VideoState {
                    playing,
                    media_timestamp_ms,
                    vocals_active,
                    account_for_latency: playing,
                };
                self.broadcast(&others, ServerEvent::VideoState(state)).await;
            }
            ClientCommand::Resume { connection_id } => self.resume(from, connection_id).await,
        }
    }

    async fn join_room(&mut self, from: ConnectionId, room_id: RoomId) {
        if !self.registry.contains(&room_id) {
            log::info!("connection {} asked for unknown room {}", from, room_id);
            self.send(from, ServerEvent::UnavailableRoom { room_id })
                .await;
            return;
        }
        if self.registry.room_of(from) != Some(&room_id) {
            self.leave_room(from).await;
        }
        let now = self.clock.now_millis();
        let welcome = match self.registry.join_session(from, &room_id) {
            Ok(session) => session
                .episode
                .clone()
                .map(|name| (name, session.video_state(now))),
            Err(e) => return self.reject(from, e).await,
        };
        if let Some((name, state)) = welcome {
            self.send(from, ServerEvent::SetEpisode { name: Some(name) })
                .await;
            self.send(from, ServerEvent::VideoState(state)).await;
        }
        self.send(from, ServerEvent::JoinedRoom { room_id }).await;
    }

    /// Returns whether `from` was in a room.
    async fn leave_room(&mut self, from: ConnectionId) -> bool {
        match self.registry.leave_session(from) {
            Some(_) => {
                self.send(from, ServerEvent::LeftRoom).await;
                true
            }
            None => false,
        }
    }

    /// The episode document is loaded before the session changes, so a missing or broken
    /// captions file leaves the room untouched.
    async fn set_episode(&mut self, from: ConnectionId, name: Option<String>) {
        if let Err(e) = self.registry.session_of(from) {
            return self.reject(from, e).await;
        }
        let document = match &name {
            Some(episode) => match self.store.read_document(episode).await {
                Ok(document) => Some(document),
                Err(e) => {
                    log::warn!("cannot load episode {}: {}", episode, e);
                    return self.fail(from, FailureReason::Storage(e.to_string())).await;
                }
            },
            None => None,
        };
        let now = self.clock.now_millis();
        let session = match self.registry.session_of_mut(from) {
            Ok(session) => session,
            Err(e) => return self.reject(from, e).await,
        };
        session.episode = name.clone();
        session.document = document;
        log::info!("room {} switched to episode {:?}", session.id, name);
        let members = session.connections.clone();
        let state = session.video_state(now);

        for member in members {
            self.send(member, ServerEvent::SetEpisode { name: name.clone() })
                .await;
            if member != from && name.is_some() {
                self.send(member, ServerEvent::VideoState(state)).await;
            }
        }
    }

    /// Persists first and commits after, so a failed write is never broadcast.
    async fn new_subtitles(&mut self, from: ConnectionId, document: DocumentSnapshot) {
        let (episode, unchanged) = match self.registry.session_of(from) {
            Ok(session) => (
                session.episode.clone(),
                session
                    .document
                    .as_ref()
                    .map_or(false, |current| current.to_json() == document.to_json()),
            ),
            Err(e) => return self.reject(from, e).await,
        };
        let episode = match episode {
            Some(episode) => episode,
            None => {
                log::debug!("connection {} sent captions without an episode", from);
                return;
            }
        };
        if unchanged {
            return;
        }
        if let Err(e) = document.validate() {
            return self
                .fail(from, FailureReason::MalformedMessage(e.to_string()))
                .await;
        }
        if let Err(e) = self.store.write_document(&episode, &document).await {
            log::warn!("cannot persist episode {}: {}", episode, e);
            return self.fail(from, FailureReason::Storage(e.to_string())).await;
        }
        let session = match self.registry.session_of_mut(from) {
            Ok(session) => session,
            Err(e) => return self.reject(from, e).await,
        };
        log::info!(
            "connection {} rewrote captions of {} in room {}",
            from,
            episode,
            session.id
        );
        session.document = Some(document.clone());
        let others = session.others(from);
        self.broadcast(
            &others,
            ServerEvent::Subtitles {
                document: Some(document),
            },
        )
        .await;
    }

    /// Hands the socket of `from` over to the detached connection `previous`.
    async fn resume(&mut self, from: ConnectionId, previous: ConnectionId) {
        if from == previous {
            return self
                .send(from, ServerEvent::Connected { connection_id: from })
                .await;
        }
        if self.detached.remove(&previous).is_none() {
            log::info!("connection {} cannot resume {}", from, previous);
            return self.fail(from, FailureReason::NotInRoom).await;
        }
        if self.registry.room_of(from).is_some() {
            self.registry.leave_session(from);
        }
        if let Some(tx) = self.connections.remove(&from) {
            self.connections.insert(previous, tx);
        }
        log::info!("connection {} resumed as {}", from, previous);
        self.connections
            .send(
                &previous,
                ConnectionEvent::Attached {
                    connection_id: previous,
                },
            )
            .await;
    }

    /// Lets connections whose grace window elapsed leave their room.
    pub async fn sweep_detached(&mut self) {
        let now = self.clock.now_millis();
        let expired = self
            .detached
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for connection_id in expired {
            self.detached.remove(&connection_id);
            log::info!("connection {} did not come back", connection_id);
            self.registry.leave_session(connection_id);
        }
    }

    async fn send(&self, to: ConnectionId, event: ServerEvent) {
        self.connections
            .send(&to, ConnectionEvent::Event(event))
            .await;
    }

    async fn broadcast(&self, to: &[ConnectionId], event: ServerEvent) {
        for connection_id in to {
            self.send(*connection_id, event.clone()).await;
        }
    }

    async fn fail(&self, to: ConnectionId, reason: FailureReason) {
        self.send(to, ServerEvent::Failure { reason }).await;
    }

    async fn reject(&self, to: ConnectionId, error: RegistryError) {
        log::debug!("connection {}: {}", to, error);
        match error {
            RegistryError::RoomUnavailable(room_id) => {
                self.send(to, ServerEvent::UnavailableRoom { room_id }).await
            }
            RegistryError::NotInRoom => self.fail(to, FailureReason::NotInRoom).await,
        }
    }

    fn new_connection_id(&mut self) -> ConnectionId {
        loop {
            self.connection_id_source += Wrapping(1);
            let candidate = self.connection_id_source.0;
            if !self.connections.contains(&candidate)
                && !self.detached.contains_key(&candidate)
                && self.registry.room_of(candidate).is_none()
            {
                return candidate;
            }
        }
    }
}

pub fn spawn_server(config: &ServerConfig) -> ServerTx {
    let (srv_tx, mut srv_rx) = channel::<ConnectionCommand>(64);
    let mut server = Server::new(
        EpisodeStore::new(config.media_dir.clone()),
        SystemClock,
        config.reconnect_grace,
    );

    tokio::spawn(async move {
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                command = srv_rx.recv() => match command {
                    Some(command) => server.handle_connection_command(command).await,
                    None => break,
                },
                _ = sweep.tick() => server.sweep_detached().await,
            }
        }
        log::info!("server loop terminated");
    });

    srv_tx
}
