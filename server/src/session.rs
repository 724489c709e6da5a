use system::{ConnectionId, DocumentSnapshot, Millis, PlaybackClock, RoomId, VideoState};

/// One room: its members, the episode being watched and the authoritative clock.
#[derive(Debug)]
pub struct Session {
    pub id: RoomId,
    pub episode: Option<String>,
    /// Absent until an episode is set, and again after `setEpisode(null)`.
    pub document: Option<DocumentSnapshot>,
    pub clock: PlaybackClock,
    pub connections: Vec<ConnectionId>,
}

impl Session {
    pub fn new(id: RoomId, now: Millis) -> Self {
        Self {
            id,
            episode: None,
            document: None,
            clock: PlaybackClock::new(now),
            connections: Vec::new(),
        }
    }

    pub fn video_state(&self, now: Millis) -> VideoState {
        self.clock.snapshot(now)
    }

    pub fn others(&self, except: ConnectionId) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .copied()
            .filter(|c| *c != except)
            .collect()
    }
}
