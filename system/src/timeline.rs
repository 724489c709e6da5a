use crate::document::{Document, Subtitle, SubtitleId};
use crate::interaction::PIXELS_PER_SECOND;
use serde::Serialize;
use std::time::Duration;

/// Period of the on-screen refresh of caption positions.
pub const UPDATE_RATE: Duration = Duration::from_millis(10);

/// Where a caption is drawn relative to the playhead line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionPlacement {
    pub id: SubtitleId,
    pub character: Option<String>,
    pub offset_px: f64,
    pub width_px: f64,
    /// Width of the already-spoken overlay.
    pub progress_px: f64,
}

/// Captions close enough to the playhead to be on a surface `surface_width` pixels wide,
/// plus any caption containing the playhead.
pub fn visible_captions(document: &Document, playhead: f64, surface_width: f64) -> Vec<&Subtitle> {
    let visible_time = surface_width / PIXELS_PER_SECOND;
    document
        .captions()
        .iter()
        .filter(|st| {
            let nearest = (st.start - playhead).abs().min((st.end - playhead).abs());
            nearest < visible_time || st.contains(playhead)
        })
        .collect()
}

pub fn place(subtitle: &Subtitle, playhead: f64) -> CaptionPlacement {
    CaptionPlacement {
        id: subtitle.id,
        character: subtitle.character.clone(),
        offset_px: (subtitle.start - playhead) * PIXELS_PER_SECOND,
        width_px: subtitle.duration() * PIXELS_PER_SECOND,
        progress_px: (playhead - subtitle.start).max(0.0) * PIXELS_PER_SECOND,
    }
}

/// Which character occupies which visual lane while not editing. A newly visible
/// character takes over the first lane whose character has no visible caption left,
/// otherwise a new lane is appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneAssignment {
    lanes: Vec<Option<String>>,
}

impl LaneAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lanes(&self) -> &[Option<String>] {
        &self.lanes
    }

    pub fn clear(&mut self) {
        self.lanes.clear();
    }

    pub fn update(&mut self, visible: &[&Subtitle]) {
        for st in visible {
            if self.lanes.contains(&st.character) {
                continue;
            }
            let free = self
                .lanes
                .iter()
                .position(|lane| !visible.iter().any(|v| &v.character == lane));
            match free {
                Some(index) => self.lanes[index] = st.character.clone(),
                None => self.lanes.push(st.character.clone()),
            }
        }
    }
}

fn by_start(document: &Document) -> Vec<&Subtitle> {
    let mut sorted = document.captions().iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
    sorted
}

/// First caption starting after the playhead.
pub fn next_caption(document: &Document, playhead: f64) -> Option<&Subtitle> {
    by_start(document)
        .into_iter()
        .find(|st| st.start - playhead > 0.001)
}

/// Last caption starting before the playhead.
pub fn previous_caption(document: &Document, playhead: f64) -> Option<&Subtitle> {
    by_start(document)
        .into_iter()
        .rev()
        .find(|st| playhead - st.start > 0.0001)
}

/// `H:MM:SS,mmm`, hours omitted when zero.
pub fn format_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = total_ms / 60_000 % 60;
    let secs = total_ms / 1000 % 60;
    let millis = total_ms % 1000;
    if hours > 0 {
        format!("{}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
    } else {
        format!("{:02}:{:02},{:03}", minutes, secs, millis)
    }
}
