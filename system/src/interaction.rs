use crate::action::{Action, PartialSubtitle};
use crate::document::{Subtitle, SubtitleId};

/// Pixels one second of media occupies on the caption lanes.
pub const PIXELS_PER_SECOND: f64 = 300.0;

/// A dragged caption boundary closer than this to the playhead lands on the playhead.
pub const SNAP_DISTANCE_SECS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureMode {
    /// Global timeline cursor.
    Scroll,
    /// Panning the caption lanes outside of edit mode.
    CaptionsScroll,
    CaptionEdit,
    CaptionCropLeft,
    CaptionCropRight,
}

impl GestureMode {
    pub fn is_scroll(&self) -> bool {
        matches!(self, GestureMode::Scroll | GestureMode::CaptionsScroll)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub start: f64,
    pub end: f64,
}

/// Live state of one pointer-down to pointer-up gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct DraggingState {
    pub mode: GestureMode,
    pub anchor_pointer_x: f64,
    pub anchor_media_time: f64,
    pub affected_track: Option<String>,
    pub original_bounds: Option<Bounds>,
    pub original_character: Option<String>,
    /// Caption being dragged, with the bounds and character it would get on release.
    pub preview: Option<Subtitle>,
    /// Last playhead position a scroll gesture asked for.
    pub seek: Option<f64>,
}

/// Geometry the host reports for scroll gestures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub width: f64,
    pub media_duration: f64,
}

impl Surface {
    /// Keeps a seek target inside the media. A zero duration means it is not loaded yet.
    pub fn clamp(&self, position: f64) -> f64 {
        if self.media_duration > 0.0 {
            position.clamp(0.0, self.media_duration)
        } else {
            position.max(0.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragUpdate {
    Seek(f64),
    Preview(Subtitle),
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    /// A scroll ended here; the room must be told.
    Seek(f64),
    /// A caption drag ended; apply as a one-action group.
    Edit(Action),
    Nothing,
}

#[derive(Debug, Default)]
pub struct InteractionMachine {
    dragging: Option<DraggingState>,
}

impl InteractionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dragging(&self) -> Option<&DraggingState> {
        self.dragging.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    pub fn begin_scroll(&mut self) {
        self.dragging = Some(DraggingState {
            mode: GestureMode::Scroll,
            anchor_pointer_x: 0.0,
            anchor_media_time: 0.0,
            affected_track: None,
            original_bounds: None,
            original_character: None,
            preview: None,
            seek: None,
        });
    }

    pub fn begin_captions_scroll(&mut self, pointer_x: f64, playhead: f64) {
        self.dragging = Some(DraggingState {
            mode: GestureMode::CaptionsScroll,
            anchor_pointer_x: pointer_x,
            anchor_media_time: playhead,
            affected_track: None,
            original_bounds: None,
            original_character: None,
            preview: None,
            seek: None,
        });
    }

    /// `mode` must be one of the caption modes.
    pub fn begin_caption_drag(&mut self, mode: GestureMode, pointer_x: f64, subtitle: &Subtitle) {
        if mode.is_scroll() {
            return;
        }
        let anchor_media_time = match mode {
            GestureMode::CaptionCropRight => subtitle.end,
            _ => subtitle.start,
        };
        self.dragging = Some(DraggingState {
            mode,
            anchor_pointer_x: pointer_x,
            anchor_media_time,
            affected_track: subtitle.character.clone(),
            original_bounds: Some(Bounds {
                start: subtitle.start,
                end: subtitle.end,
            }),
            original_character: subtitle.character.clone(),
            preview: Some(subtitle.clone()),
            seek: None,
        });
    }

    /// The pointer entered the lane of `character`.
    pub fn hover_track(&mut self, character: Option<String>) {
        if let Some(dragging) = self.dragging.as_mut() {
            dragging.affected_track = character;
        }
    }

    pub fn pointer_move(&mut self, pointer_x: f64, playhead: f64, surface: Surface) -> DragUpdate {
        let dragging = match self.dragging.as_mut() {
            Some(dragging) => dragging,
            None => return DragUpdate::Ignored,
        };
        match dragging.mode {
            GestureMode::Scroll => {
                if surface.width <= 0.0 {
                    return DragUpdate::Ignored;
                }
                let position = surface.clamp(pointer_x / surface.width * surface.media_duration);
                dragging.seek = Some(position);
                DragUpdate::Seek(position)
            }
            GestureMode::CaptionsScroll => {
                let position = surface.clamp(
                    dragging.anchor_media_time
                        + (dragging.anchor_pointer_x - pointer_x) / PIXELS_PER_SECOND,
                );
                dragging.seek = Some(position);
                DragUpdate::Seek(position)
            }
            mode => {
                let candidate = dragging.anchor_media_time
                    + (pointer_x - dragging.anchor_pointer_x) / PIXELS_PER_SECOND;
                let track = dragging.affected_track.clone();
                let preview = match dragging.preview.as_mut() {
                    Some(preview) => preview,
                    None => return DragUpdate::Ignored,
                };
                let duration = preview.duration();
                let (start, end) = match mode {
                    GestureMode::CaptionEdit => (Some(candidate), Some(candidate + duration)),
                    GestureMode::CaptionCropLeft => (Some(candidate), None),
                    _ => (None, Some(candidate)),
                };
                let whole = mode == GestureMode::CaptionEdit;
                let (start, end) = snap(start, end, playhead, duration, whole);
                let start = start.unwrap_or(preview.start);
                let end = end.unwrap_or(preview.end);
                if !(start < end) {
                    return DragUpdate::Ignored;
                }
                if whole {
                    preview.character = track;
                }
                preview.start = start;
                preview.end = end;
                DragUpdate::Preview(preview.clone())
            }
        }
    }

    /// Ends the gesture. The dragging state is cleared whatever happens.
    pub fn pointer_up(&mut self, playhead: f64) -> GestureOutcome {
        let dragging = match self.dragging.take() {
            Some(dragging) => dragging,
            None => return GestureOutcome::Nothing,
        };
        if dragging.mode.is_scroll() {
            return GestureOutcome::Seek(dragging.seek.unwrap_or(playhead));
        }
        match (dragging.preview, dragging.original_bounds) {
            (Some(preview), Some(bounds)) => {
                let unchanged = preview.start == bounds.start
                    && preview.end == bounds.end
                    && preview.character == dragging.original_character;
                if unchanged {
                    return GestureOutcome::Nothing;
                }
                let from = PartialSubtitle {
                    character: dragging.original_character,
                    start: Some(bounds.start),
                    end: Some(bounds.end),
                    ..PartialSubtitle::from(&preview)
                };
                GestureOutcome::Edit(Action::edit(from, PartialSubtitle::from(&preview)))
            }
            _ => GestureOutcome::Nothing,
        }
    }

    /// Pointer left the interactive surface: the gesture ends as if released there.
    pub fn pointer_leave(&mut self, playhead: f64) -> GestureOutcome {
        self.pointer_up(playhead)
    }

    /// Drops the gesture without producing anything, e.g. when the view is torn down.
    pub fn cancel(&mut self) {
        self.dragging = None;
    }

    pub fn dragged_caption(&self) -> Option<SubtitleId> {
        self.dragging
            .as_ref()
            .and_then(|d| d.preview.as_ref())
            .map(|st| st.id)
    }
}

/// Clamps a boundary lying within [`SNAP_DISTANCE_SECS`] of the playhead onto it. When a
/// whole caption is dragged the other boundary follows to keep the duration.
fn snap(
    start: Option<f64>,
    end: Option<f64>,
    playhead: f64,
    duration: f64,
    whole: bool,
) -> (Option<f64>, Option<f64>) {
    match (start, end) {
        (Some(s), _) if (s - playhead).abs() < SNAP_DISTANCE_SECS => {
            let end = end.map(|e| if whole { playhead + duration } else { e });
            (Some(playhead), end)
        }
        (_, Some(e)) if (e - playhead).abs() < SNAP_DISTANCE_SECS => {
            let start = start.map(|s| if whole { playhead - duration } else { s });
            (start, Some(playhead))
        }
        other => other,
    }
}
