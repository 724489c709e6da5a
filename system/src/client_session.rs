use crate::action_log::ActionLog;
use crate::clock::{ClockSync, Millis};
use crate::document::{Document, Subtitle, SubtitleId};
use crate::interaction::{DragUpdate, GestureMode, GestureOutcome, InteractionMachine, Surface};
use crate::message::{ClientCommand, ConnectionId, FailureReason, RoomId, ServerEvent};
use crate::timeline::{self, CaptionPlacement, LaneAssignment};
use serde::Serialize;
use std::collections::VecDeque;

/// Instruction for the host's media player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerDirective {
    Seek(f64),
    Play,
    Pause,
    /// Switch to the vocals stem (`true`) or the instrumental one.
    SwitchVocals(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionView {
    pub placement: CaptionPlacement,
    pub lane: usize,
    pub color: String,
    pub text: String,
    pub selected: bool,
}

/// Everything the host needs to draw one refresh of the caption lanes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameView {
    pub time: String,
    pub lanes: Vec<Option<String>>,
    pub captions: Vec<CaptionView>,
}

/// Client side of one connection: room membership, the local copy of the episode
/// document, playback reconciliation and the gesture machine.
///
/// It never touches the network. Outgoing messages pile up in an outbox drained with
/// [`ClientSession::take_commands`], player instructions in
/// [`ClientSession::take_directives`].
#[derive(Debug, Default)]
pub struct ClientSession {
    connection_id: Option<ConnectionId>,
    /// Id handed to the current socket while it asks to resume an older one.
    fresh_connection_id: Option<ConnectionId>,
    room: Option<RoomId>,
    unavailable_room: Option<RoomId>,
    episodes: Vec<String>,
    episode: Option<String>,
    log: Option<ActionLog>,
    interaction: InteractionMachine,
    sync: ClockSync,
    lanes: LaneAssignment,
    edit_mode: bool,
    selected: Option<SubtitleId>,
    playing: bool,
    vocals_active: bool,
    last_failure: Option<FailureReason>,
    outbox: VecDeque<ClientCommand>,
    directives: VecDeque<PlayerDirective>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn unavailable_room(&self) -> Option<&RoomId> {
        self.unavailable_room.as_ref()
    }

    pub fn episodes(&self) -> &[String] {
        &self.episodes
    }

    pub fn episode(&self) -> Option<&str> {
        self.episode.as_deref()
    }

    pub fn document(&self) -> Option<&Document> {
        self.log.as_ref().map(|log| log.document())
    }

    pub fn is_editing(&self) -> bool {
        self.edit_mode
    }

    pub fn selected(&self) -> Option<SubtitleId> {
        self.selected
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn vocals_active(&self) -> bool {
        self.vocals_active
    }

    pub fn is_dragging(&self) -> bool {
        self.interaction.is_dragging()
    }

    pub fn can_undo(&self) -> bool {
        self.log.as_ref().map_or(false, |log| log.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.log.as_ref().map_or(false, |log| log.can_redo())
    }

    pub fn last_failure(&self) -> Option<&FailureReason> {
        self.last_failure.as_ref()
    }

    pub fn take_commands(&mut self) -> Vec<ClientCommand> {
        self.outbox.drain(..).collect()
    }

    pub fn take_directives(&mut self) -> Vec<PlayerDirective> {
        self.directives.drain(..).collect()
    }

    /// `now` is the local wall clock, `current_secs` the player's current position.
    pub fn handle_event(&mut self, event: ServerEvent, now: Millis, current_secs: f64) {
        match event {
            ServerEvent::Connected { connection_id } => match self.connection_id {
                Some(previous) if previous == connection_id => {
                    log::debug!("resumed connection {}", connection_id);
                    self.fresh_connection_id = None;
                }
                Some(previous) if self.room.is_some() => {
                    log::info!("socket replaced, resuming connection {}", previous);
                    self.fresh_connection_id = Some(connection_id);
                    self.outbox.push_back(ClientCommand::Resume {
                        connection_id: previous,
                    });
                }
                _ => self.connection_id = Some(connection_id),
            },
            ServerEvent::Episodes { episodes } => self.episodes = episodes,
            ServerEvent::JoinedRoom { room_id } => {
                self.unavailable_room = None;
                self.room = Some(room_id);
            }
            ServerEvent::LeftRoom => {
                self.room = None;
                self.reset_episode(None);
            }
            ServerEvent::UnavailableRoom { room_id } => {
                self.room = None;
                self.unavailable_room = Some(room_id);
            }
            ServerEvent::SetEpisode { name } => {
                let loaded = name.is_some();
                self.reset_episode(name);
                if loaded {
                    self.outbox.push_back(ClientCommand::FetchSubtitles);
                    self.fetch_video_state(now);
                }
            }
            ServerEvent::Subtitles { document } => {
                if self.edit_mode {
                    log::debug!("ignoring replacement document while editing");
                    return;
                }
                self.selected = None;
                self.lanes.clear();
                match document {
                    Some(snapshot) => {
                        if let Some(log) = self.log.as_mut() {
                            log.replace(&snapshot);
                        } else {
                            self.log = Some(ActionLog::new(Document::from(&snapshot)));
                        }
                    }
                    None => self.log = None,
                }
            }
            ServerEvent::VideoState(state) => {
                if self.interaction.is_dragging() {
                    self.sync.mark_answer(now);
                    return;
                }
                let correction = self.sync.reconcile(&state, now, current_secs);
                if let Some(target) = correction.seek_to {
                    self.directives.push_back(PlayerDirective::Seek(target));
                }
                if correction.playing != self.playing {
                    self.playing = correction.playing;
                    self.directives.push_back(if self.playing {
                        PlayerDirective::Play
                    } else {
                        PlayerDirective::Pause
                    });
                }
                if correction.vocals_active != self.vocals_active {
                    self.vocals_active = correction.vocals_active;
                    self.directives
                        .push_back(PlayerDirective::SwitchVocals(self.vocals_active));
                }
            }
            ServerEvent::Failure { reason } => {
                log::warn!("server reported {:?}", reason);
                if reason == FailureReason::NotInRoom {
                    if let Some(fresh) = self.fresh_connection_id.take() {
                        self.connection_id = Some(fresh);
                    }
                    self.room = None;
                    self.reset_episode(None);
                }
                self.last_failure = Some(reason);
            }
        }
    }

    fn reset_episode(&mut self, name: Option<String>) {
        self.episode = name;
        self.log = None;
        self.edit_mode = false;
        self.selected = None;
        self.lanes.clear();
        self.interaction.cancel();
    }

    fn fetch_video_state(&mut self, now: Millis) {
        self.outbox.push_back(ClientCommand::FetchVideoState);
        self.sync.mark_fetch(now);
    }

    /// Drives the drift-correction poll. Call it from any periodic timer.
    pub fn tick(&mut self, now: Millis) {
        if self.room.is_some() && self.sync.poll_due(now) {
            self.fetch_video_state(now);
        }
    }

    /// The room stopped answering drift polls.
    pub fn is_stale(&self, now: Millis) -> bool {
        self.room.is_some() && self.sync.is_stale(now)
    }

    pub fn get_episodes(&mut self) {
        self.outbox.push_back(ClientCommand::GetEpisodes);
    }

    pub fn create_or_join_room(&mut self, room_id: Option<RoomId>) {
        self.outbox
            .push_back(ClientCommand::CreateOrJoinRoom { room_id });
    }

    pub fn join_room(&mut self, room_id: RoomId) {
        self.outbox.push_back(ClientCommand::JoinRoom { room_id });
    }

    pub fn leave_room(&mut self) {
        self.outbox.push_back(ClientCommand::LeaveRoom);
    }

    pub fn set_episode(&mut self, name: Option<String>) {
        self.outbox.push_back(ClientCommand::SetEpisode { name });
    }

    fn announce_playback(&mut self, position: f64) {
        self.outbox.push_back(ClientCommand::TogglePause {
            playing: self.playing,
            media_timestamp_ms: position * 1000.0,
            vocals_active: self.vocals_active,
        });
    }

    pub fn toggle_pause(&mut self, position: f64) {
        self.playing = !self.playing;
        self.directives.push_back(if self.playing {
            PlayerDirective::Play
        } else {
            PlayerDirective::Pause
        });
        self.announce_playback(position);
    }

    pub fn seek(&mut self, position: f64) {
        self.directives.push_back(PlayerDirective::Seek(position));
        self.announce_playback(position);
    }

    pub fn toggle_vocals(&mut self, position: f64) {
        self.vocals_active = !self.vocals_active;
        self.directives
            .push_back(PlayerDirective::SwitchVocals(self.vocals_active));
        self.announce_playback(position);
    }

    pub fn step_forward(&mut self, playhead: f64) -> Option<SubtitleId> {
        let target = self
            .document()
            .and_then(|doc| timeline::next_caption(doc, playhead))
            .map(|st| (st.id, st.start))?;
        self.step_to(target)
    }

    pub fn step_backward(&mut self, playhead: f64) -> Option<SubtitleId> {
        let target = self
            .document()
            .and_then(|doc| timeline::previous_caption(doc, playhead))
            .map(|st| (st.id, st.start))?;
        self.step_to(target)
    }

    fn step_to(&mut self, (id, start): (SubtitleId, f64)) -> Option<SubtitleId> {
        self.selected = Some(id);
        self.seek(start);
        Some(id)
    }

    pub fn select(&mut self, id: Option<SubtitleId>) {
        self.selected = id.filter(|id| self.document().and_then(|doc| doc.get(*id)).is_some());
    }

    /// Entering requires a loaded document. Leaving flushes the whole document to the room.
    pub fn toggle_edit_mode(&mut self) -> bool {
        if self.edit_mode {
            self.edit_mode = false;
            self.interaction.cancel();
            self.lanes.clear();
            if let Some(log) = self.log.as_ref() {
                self.outbox.push_back(ClientCommand::NewSubtitles {
                    document: log.snapshot(),
                });
            }
        } else if self.log.is_some() {
            self.edit_mode = true;
        }
        self.edit_mode
    }

    fn editing_log(&mut self) -> Option<&mut ActionLog> {
        if self.edit_mode {
            self.log.as_mut()
        } else {
            None
        }
    }

    pub fn delete_selected(&mut self) -> bool {
        let id = match self.selected {
            Some(id) => id,
            None => return false,
        };
        let deleted = self.editing_log().map_or(false, |log| log.delete(id));
        if deleted {
            self.selected = None;
        }
        deleted
    }

    pub fn duplicate_selected(&mut self) -> Option<SubtitleId> {
        let id = self.selected?;
        self.editing_log()?.duplicate(id)
    }

    pub fn edit_selected_text(&mut self, text: String) -> bool {
        match self.selected {
            Some(id) => self
                .editing_log()
                .map_or(false, |log| log.edit_text(id, text)),
            None => false,
        }
    }

    pub fn split_selected(&mut self, playhead: f64) -> bool {
        match self.selected {
            Some(id) => self
                .editing_log()
                .map_or(false, |log| log.split(id, playhead)),
            None => false,
        }
    }

    pub fn undo(&mut self) -> bool {
        self.editing_log().map_or(false, |log| log.undo())
    }

    pub fn redo(&mut self) -> bool {
        self.editing_log().map_or(false, |log| log.redo())
    }

    pub fn set_character_color(&mut self, name: &str, color: Option<String>) -> bool {
        self.editing_log()
            .map_or(false, |log| log.set_character_color(name, color))
    }

    /// Pointer pressed on the global timeline bar.
    pub fn pointer_down_timeline(&mut self) {
        self.interaction.begin_scroll();
    }

    /// Pointer pressed on the caption lanes outside of any caption.
    pub fn pointer_down_lanes(&mut self, pointer_x: f64, playhead: f64) {
        if !self.edit_mode {
            self.interaction.begin_captions_scroll(pointer_x, playhead);
        }
    }

    /// Pointer pressed on caption `id`. Outside of edit mode this pans the lanes instead.
    pub fn pointer_down_caption(
        &mut self,
        mode: GestureMode,
        pointer_x: f64,
        playhead: f64,
        id: SubtitleId,
    ) {
        if !self.edit_mode {
            self.interaction.begin_captions_scroll(pointer_x, playhead);
            return;
        }
        let subtitle = match self.document().and_then(|doc| doc.get(id)) {
            Some(subtitle) => subtitle.clone(),
            None => return,
        };
        self.selected = Some(id);
        self.interaction
            .begin_caption_drag(mode, pointer_x, &subtitle);
    }

    pub fn hover_track(&mut self, character: Option<String>) {
        self.interaction.hover_track(character);
    }

    pub fn pointer_move(&mut self, pointer_x: f64, playhead: f64, surface: Surface) -> DragUpdate {
        let update = self.interaction.pointer_move(pointer_x, playhead, surface);
        if let DragUpdate::Seek(position) = update {
            self.directives.push_back(PlayerDirective::Seek(position));
        }
        update
    }

    pub fn pointer_up(&mut self, playhead: f64) {
        let outcome = self.interaction.pointer_up(playhead);
        self.finish_gesture(outcome);
    }

    pub fn pointer_leave(&mut self, playhead: f64) {
        let outcome = self.interaction.pointer_leave(playhead);
        self.finish_gesture(outcome);
    }

    fn finish_gesture(&mut self, outcome: GestureOutcome) {
        match outcome {
            GestureOutcome::Seek(position) => self.announce_playback(position),
            GestureOutcome::Edit(action) => match self.editing_log() {
                Some(log) => log.apply(action.group()),
                None => log::debug!("dropping caption drag outside of edit mode"),
            },
            GestureOutcome::Nothing => {}
        }
    }

    /// Projection of the document onto a surface `surface_width` pixels wide. Outside of
    /// edit mode, lanes follow the visible characters; in edit mode there is one lane per
    /// palette character plus a last one for captions without character.
    pub fn frame(&mut self, playhead: f64, surface_width: f64) -> FrameView {
        let time = timeline::format_time(playhead);
        let document = match self.log.as_ref() {
            Some(log) => log.document(),
            None => {
                return FrameView {
                    time,
                    lanes: vec![],
                    captions: vec![],
                }
            }
        };
        let preview = self
            .interaction
            .dragging()
            .and_then(|dragging| dragging.preview.as_ref());
        let visible = timeline::visible_captions(document, playhead, surface_width)
            .into_iter()
            .map(|st| match preview {
                Some(preview) if preview.id == st.id => preview,
                _ => st,
            })
            .collect::<Vec<&Subtitle>>();

        let lanes = if self.edit_mode {
            document
                .characters()
                .iter()
                .map(|c| Some(c.name.clone()))
                .chain(std::iter::once(None))
                .collect::<Vec<_>>()
        } else {
            self.lanes.update(&visible);
            self.lanes.lanes().to_vec()
        };

        let captions = visible
            .iter()
            .map(|st| CaptionView {
                placement: timeline::place(st, playhead),
                lane: lanes
                    .iter()
                    .position(|lane| lane == &st.character)
                    .unwrap_or(0),
                color: document.color_of(st.character.as_deref()),
                text: st.text.clone(),
                selected: self.selected == Some(st.id),
            })
            .collect();

        FrameView {
            time,
            lanes,
            captions,
        }
    }
}
