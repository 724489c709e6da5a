mod utils;

use std::collections::VecDeque;

use system::{
    bincode, serde_json, ClientCommand, ClientSession, GestureMode, ServerEvent, Surface,
};
use wasm_bindgen::prelude::*;

/// Which part of a caption the pointer grabbed.
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionGrip {
    Body,
    LeftEdge,
    RightEdge,
}

impl From<CaptionGrip> for GestureMode {
    fn from(grip: CaptionGrip) -> Self {
        match grip {
            CaptionGrip::Body => GestureMode::CaptionEdit,
            CaptionGrip::LeftEdge => GestureMode::CaptionCropLeft,
            CaptionGrip::RightEdge => GestureMode::CaptionCropRight,
        }
    }
}

/// Browser handle on a [`ClientSession`]. The host owns the socket and the media
/// elements: it feeds server frames in, ships pending commands out and applies player
/// directives.
#[wasm_bindgen]
pub struct DubbingSession {
    session: ClientSession,
    pending_commands: VecDeque<ClientCommand>,
}

#[wasm_bindgen]
impl DubbingSession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        utils::set_panic_hook();

        DubbingSession {
            session: ClientSession::new(),
            pending_commands: VecDeque::new(),
        }
    }

    /// Returns false when the frame is not a server event.
    pub fn handle_event(&mut self, json: String, now: f64, current_secs: f64) -> bool {
        match serde_json::from_str::<ServerEvent>(&json) {
            Ok(event) => {
                self.session.handle_event(event, now, current_secs);
                true
            }
            Err(e) => {
                log::warn!("unreadable server event: {}", e);
                false
            }
        }
    }

    pub fn handle_event_bytes(&mut self, bytes: &[u8], now: f64, current_secs: f64) -> bool {
        match bincode::deserialize::<ServerEvent>(bytes) {
            Ok(event) => {
                self.session.handle_event(event, now, current_secs);
                true
            }
            Err(e) => {
                log::warn!("unreadable server event: {}", e);
                false
            }
        }
    }

    fn collect_commands(&mut self) {
        self.pending_commands.extend(self.session.take_commands());
    }

    pub fn consume_pending_command(&mut self) -> Option<String> {
        self.collect_commands();
        self.pending_commands
            .pop_front()
            .and_then(|command| serde_json::to_string(&command).ok())
    }

    pub fn consume_pending_command_bytes(&mut self) -> Option<Box<[u8]>> {
        self.collect_commands();
        self.pending_commands.pop_front().and_then(|command| {
            log::trace!("Consumed: {:?}", command);
            bincode::serialize(&command)
                .ok()
                .map(|v| v.into_boxed_slice())
        })
    }

    /// JSON array of player directives issued since the last call.
    pub fn consume_directives(&mut self) -> String {
        serde_json::to_string(&self.session.take_directives()).unwrap_or_else(|_| "[]".into())
    }

    pub fn tick(&mut self, now: f64) {
        self.session.tick(now);
    }

    pub fn is_stale(&self, now: f64) -> bool {
        self.session.is_stale(now)
    }

    pub fn get_episodes(&mut self) {
        self.session.get_episodes();
    }

    pub fn create_or_join_room(&mut self, room_id: Option<String>) {
        self.session.create_or_join_room(room_id);
    }

    pub fn join_room(&mut self, room_id: String) {
        self.session.join_room(room_id);
    }

    pub fn leave_room(&mut self) {
        self.session.leave_room();
    }

    pub fn set_episode(&mut self, name: Option<String>) {
        self.session.set_episode(name);
    }

    pub fn toggle_pause(&mut self, position: f64) {
        self.session.toggle_pause(position);
    }

    pub fn seek(&mut self, position: f64) {
        self.session.seek(position);
    }

    pub fn toggle_vocals(&mut self, position: f64) {
        self.session.toggle_vocals(position);
    }

    pub fn step_forward(&mut self, playhead: f64) -> Option<u32> {
        self.session.step_forward(playhead)
    }

    pub fn step_backward(&mut self, playhead: f64) -> Option<u32> {
        self.session.step_backward(playhead)
    }

    pub fn toggle_edit_mode(&mut self) -> bool {
        self.session.toggle_edit_mode()
    }

    pub fn select(&mut self, id: Option<u32>) {
        self.session.select(id);
    }

    pub fn delete_selected(&mut self) -> bool {
        self.session.delete_selected()
    }

    pub fn duplicate_selected(&mut self) -> Option<u32> {
        self.session.duplicate_selected()
    }

    pub fn edit_selected_text(&mut self, text: String) -> bool {
        self.session.edit_selected_text(text)
    }

    pub fn split_selected(&mut self, playhead: f64) -> bool {
        self.session.split_selected(playhead)
    }

    pub fn undo(&mut self) -> bool {
        self.session.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.session.redo()
    }

    pub fn set_character_color(&mut self, name: String, color: Option<String>) -> bool {
        self.session.set_character_color(&name, color)
    }

    pub fn pointer_down_timeline(&mut self) {
        self.session.pointer_down_timeline();
    }

    pub fn pointer_down_lanes(&mut self, pointer_x: f64, playhead: f64) {
        self.session.pointer_down_lanes(pointer_x, playhead);
    }

    pub fn pointer_down_caption(&mut self, grip: CaptionGrip, pointer_x: f64, playhead: f64, id: u32) {
        self.session
            .pointer_down_caption(grip.into(), pointer_x, playhead, id);
    }

    pub fn hover_track(&mut self, character: Option<String>) {
        self.session.hover_track(character);
    }

    pub fn pointer_move(&mut self, pointer_x: f64, playhead: f64, width: f64, media_duration: f64) {
        self.session.pointer_move(
            pointer_x,
            playhead,
            Surface {
                width,
                media_duration,
            },
        );
    }

    pub fn pointer_up(&mut self, playhead: f64) {
        self.session.pointer_up(playhead);
    }

    pub fn pointer_leave(&mut self, playhead: f64) {
        self.session.pointer_leave(playhead);
    }

    /// JSON [`system::FrameView`] for the current playhead.
    pub fn frame(&mut self, playhead: f64, surface_width: f64) -> String {
        let frame = self.session.frame(playhead, surface_width);
        serde_json::to_string(&frame).unwrap_or_default()
    }

    pub fn connection_id(&self) -> Option<u32> {
        self.session.connection_id()
    }

    pub fn room(&self) -> Option<String> {
        self.session.room().cloned()
    }

    pub fn unavailable_room(&self) -> Option<String> {
        self.session.unavailable_room().cloned()
    }

    pub fn episode(&self) -> Option<String> {
        self.session.episode().map(String::from)
    }

    pub fn episodes(&self) -> String {
        serde_json::to_string(self.session.episodes()).unwrap_or_else(|_| "[]".into())
    }

    pub fn last_failure(&self) -> Option<String> {
        self.session
            .last_failure()
            .and_then(|reason| serde_json::to_string(reason).ok())
    }

    pub fn is_editing(&self) -> bool {
        self.session.is_editing()
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_playing()
    }

    pub fn vocals_active(&self) -> bool {
        self.session.vocals_active()
    }

    pub fn selected(&self) -> Option<u32> {
        self.session.selected()
    }

    pub fn can_undo(&self) -> bool {
        self.session.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.session.can_redo()
    }
}

impl Default for DubbingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_json_frames() {
        let mut session = DubbingSession::new();
        assert!(session.handle_event(r#"{"joinedRoom":{"roomId":"ABCDE"}}"#.into(), 0.0, 0.0));
        assert_eq!(session.room(), Some("ABCDE".to_string()));
        assert!(!session.handle_event("nonsense".into(), 0.0, 0.0));

        session.toggle_pause(1.5);
        assert_eq!(
            session.consume_pending_command(),
            Some(
                r#"{"togglePause":{"playing":true,"mediaTimestampMs":1500.0,"vocalsActive":false}}"#
                    .to_string()
            )
        );
        assert_eq!(session.consume_pending_command(), None);
        assert_eq!(session.consume_directives(), r#"["play"]"#);
    }

    #[test]
    fn it_exposes_loaded_captions_in_frames() {
        let mut session = DubbingSession::new();
        session.handle_event(r#"{"setEpisode":{"name":"ep1"}}"#.into(), 0.0, 0.0);
        session.handle_event(
            r#"{"subtitles":{"document":{"captions":[{"character":null,"start":0.5,"end":1.5,"text":"hi"}]}}}"#
                .into(),
            0.0,
            0.0,
        );
        let frame = session.frame(1.0, 600.0);
        assert!(frame.contains(r#""text":"hi""#));
        assert!(frame.contains(r#""time":"00:01,000""#));
    }
}
