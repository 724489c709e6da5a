use crate::session::Session;
use rand::Rng;
use std::collections::HashMap;
use system::{ConnectionId, Millis, RoomId};
use thiserror::Error;

pub const ROOM_CODE_LENGTH: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("room {0} does not exist")]
    RoomUnavailable(RoomId),
    #[error("connection is not in any room")]
    NotInRoom,
}

/// Every live room of the process. A room exists from its first join until its last
/// member leaves. A connection belongs to at most one room.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<RoomId, Session>,
    connection_locations: HashMap<ConnectionId, RoomId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.sessions.contains_key(room_id)
    }

    pub fn get(&self, room_id: &str) -> Option<&Session> {
        self.sessions.get(room_id)
    }

    pub fn room_of(&self, connection_id: ConnectionId) -> Option<&RoomId> {
        self.connection_locations.get(&connection_id)
    }

    pub fn session_of(&self, connection_id: ConnectionId) -> Result<&Session, RegistryError> {
        self.connection_locations
            .get(&connection_id)
            .and_then(|room_id| self.sessions.get(room_id))
            .ok_or(RegistryError::NotInRoom)
    }

    pub fn session_of_mut(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<&mut Session, RegistryError> {
        match self.connection_locations.get(&connection_id) {
            Some(room_id) => self
                .sessions
                .get_mut(room_id)
                .ok_or(RegistryError::NotInRoom),
            None => Err(RegistryError::NotInRoom),
        }
    }

    pub fn members(&self, room_id: &str) -> &[ConnectionId] {
        self.sessions
            .get(room_id)
            .map(|s| s.connections.as_slice())
            .unwrap_or(&[])
    }

    /// Opens a room under a fresh code and puts `from` in it.
    pub fn create_session(&mut self, from: ConnectionId, now: Millis) -> RoomId {
        self.create_session_with(from, now, &mut rand::thread_rng())
    }

    pub fn create_session_with(
        &mut self,
        from: ConnectionId,
        now: Millis,
        rng: &mut impl Rng,
    ) -> RoomId {
        let room_id = loop {
            let candidate = generate_room_code(rng);
            if !self.sessions.contains_key(&candidate) {
                break candidate;
            }
            log::debug!("room code {} already taken", candidate);
        };
        self.sessions
            .insert(room_id.clone(), Session::new(room_id.clone(), now));
        log::info!("created room {}", room_id);
        self.attach(from, &room_id);
        room_id
    }

    pub fn join_session(
        &mut self,
        from: ConnectionId,
        room_id: &str,
    ) -> Result<&Session, RegistryError> {
        if !self.sessions.contains_key(room_id) {
            return Err(RegistryError::RoomUnavailable(room_id.into()));
        }
        self.attach(from, room_id);
        self.sessions
            .get(room_id)
            .ok_or_else(|| RegistryError::RoomUnavailable(room_id.into()))
    }

    fn attach(&mut self, from: ConnectionId, room_id: &str) {
        if let Some(session) = self.sessions.get_mut(room_id) {
            if !session.connections.contains(&from) {
                session.connections.push(from);
            }
            self.connection_locations.insert(from, room_id.into());
            log::info!(
                "connection {} joined room {} ({} members)",
                from,
                room_id,
                session.connections.len()
            );
        }
    }

    /// Removes `from` from its room, deleting the room when it was the last member.
    pub fn leave_session(&mut self, from: ConnectionId) -> Option<RoomId> {
        let room_id = self.connection_locations.remove(&from)?;
        let now_empty = match self.sessions.get_mut(&room_id) {
            Some(session) => {
                session.connections.retain(|c| *c != from);
                session.connections.is_empty()
            }
            None => false,
        };
        log::info!("connection {} left room {}", from, room_id);
        if now_empty {
            self.sessions.remove(&room_id);
            log::info!("deleted empty room {}", room_id);
        }
        Some(room_id)
    }
}

pub fn generate_room_code(rng: &mut impl Rng) -> RoomId {
    (0..ROOM_CODE_LENGTH)
        .map(|_| rng.gen_range(b'A'..=b'Z') as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn it_generates_uppercase_codes() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = generate_room_code(&mut rng);
        assert_eq!(code.len(), ROOM_CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn it_never_reuses_a_live_code() {
        let mut registry = SessionRegistry::new();
        let first = registry.create_session_with(1, 0.0, &mut StdRng::seed_from_u64(1));
        let second = registry.create_session_with(2, 0.0, &mut StdRng::seed_from_u64(1));
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn it_remove_session_when_all_connections_leave() {
        let mut registry = SessionRegistry::new();
        let room_id = registry.create_session(1, 0.0);
        registry.join_session(2, &room_id).expect("room exists");
        assert_eq!(registry.members(&room_id), &[1, 2]);

        assert_eq!(registry.leave_session(1), Some(room_id.clone()));
        assert!(registry.contains(&room_id));
        assert_eq!(registry.leave_session(2), Some(room_id.clone()));
        assert!(registry.is_empty());
        assert_eq!(
            registry.join_session(3, &room_id).map(|s| s.id.clone()),
            Err(RegistryError::RoomUnavailable(room_id))
        );
    }

    #[test]
    fn it_tracks_location_of_connections() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.session_of(1).map(|s| s.id.clone()), Err(RegistryError::NotInRoom));
        let room_id = registry.create_session(1, 0.0);
        assert_eq!(registry.room_of(1), Some(&room_id));
        assert_eq!(registry.leave_session(1), Some(room_id));
        assert_eq!(registry.leave_session(1), None);
    }
}
