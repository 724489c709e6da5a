use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wall-clock instant or span in milliseconds.
pub type Millis = f64;

/// A local player only seeks when it is further than this from the reconciled target.
pub const SNAP_THRESHOLD_SECS: f64 = 0.3;

/// Period of the drift-correction poll, which doubles as the session liveness heartbeat.
pub const DRIFT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub trait WallClock {
    fn now_millis(&self) -> Millis;
}

/// Hand-driven clock, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, now: Millis) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta: Millis) {
        self.set(self.now_millis() + delta);
    }
}

impl WallClock for ManualClock {
    fn now_millis(&self) -> Millis {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Authoritative playback state as carried by `videoState`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoState {
    pub playing: bool,
    pub media_timestamp_ms: Millis,
    pub vocals_active: bool,
    pub account_for_latency: bool,
}

/// One-way delay estimate: half of the round trip since the state was requested.
pub fn estimate_latency(sent_at: Millis, received_at: Millis) -> Millis {
    (received_at - sent_at) / 2.0
}

/// Media position, in seconds, a player should be at when `state` arrives with
/// `latency` milliseconds of delay.
pub fn target_position(state: &VideoState, latency: Millis) -> f64 {
    if state.playing && state.account_for_latency {
        state.media_timestamp_ms / 1000.0 + latency / 1000.0
    } else {
        state.media_timestamp_ms / 1000.0
    }
}

pub fn needs_seek(current_secs: f64, target_secs: f64) -> bool {
    (target_secs - current_secs).abs() > SNAP_THRESHOLD_SECS
}

/// Canonical clock of a session, held by the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    pub playing: bool,
    pub play_start_wall_time: Millis,
    pub paused_at_media_time: Millis,
    pub vocals_active: bool,
}

impl PlaybackClock {
    pub fn new(now: Millis) -> Self {
        Self {
            playing: false,
            play_start_wall_time: now,
            paused_at_media_time: 0.0,
            vocals_active: false,
        }
    }

    pub fn position_at(&self, now: Millis) -> Millis {
        if self.playing {
            now - self.play_start_wall_time
        } else {
            self.paused_at_media_time
        }
    }

    pub fn set(&mut self, playing: bool, media_timestamp: Millis, vocals_active: bool, now: Millis) {
        self.playing = playing;
        self.paused_at_media_time = media_timestamp;
        self.play_start_wall_time = now - media_timestamp;
        self.vocals_active = vocals_active;
    }

    pub fn snapshot(&self, now: Millis) -> VideoState {
        VideoState {
            playing: self.playing,
            media_timestamp_ms: self.position_at(now),
            vocals_active: self.vocals_active,
            account_for_latency: true,
        }
    }
}

/// What a client player must do after reconciling against an authoritative state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub seek_to: Option<f64>,
    pub playing: bool,
    pub vocals_active: bool,
}

/// Client half of clock reconciliation: remembers when state was last requested and
/// turns incoming states into corrections.
#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    last_fetch: Option<Millis>,
    last_state: Option<Millis>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_fetch(&mut self, now: Millis) {
        self.last_fetch = Some(now);
    }

    /// The room answered, whether or not the state gets applied.
    pub fn mark_answer(&mut self, now: Millis) {
        self.last_state = Some(now);
    }

    pub fn poll_due(&self, now: Millis) -> bool {
        self.last_fetch.map_or(true, |sent| {
            now - sent >= DRIFT_POLL_INTERVAL.as_millis() as Millis
        })
    }

    /// True when polls went unanswered for more than two intervals.
    pub fn is_stale(&self, now: Millis) -> bool {
        let limit = 2.0 * DRIFT_POLL_INTERVAL.as_millis() as Millis;
        match (self.last_fetch, self.last_state) {
            (Some(sent), Some(received)) => sent > received && now - received > limit,
            (Some(sent), None) => now - sent > limit,
            _ => false,
        }
    }

    pub fn reconcile(&mut self, state: &VideoState, now: Millis, current_secs: f64) -> Correction {
        self.mark_answer(now);
        let latency = self
            .last_fetch
            .map_or(0.0, |sent| estimate_latency(sent, now));
        let target = target_position(state, latency);
        Correction {
            seek_to: if needs_seek(current_secs, target) {
                Some(target)
            } else {
                None
            },
            playing: state.playing,
            vocals_active: state.vocals_active,
        }
    }
}
