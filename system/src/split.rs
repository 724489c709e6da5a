use crate::action::{Action, ActionGroup, PartialSubtitle};
use crate::document::Subtitle;

/// Splits `text` at the word boundary nearest to the character offset `index`, never
/// inside a word. Both halves are trimmed. Returns `None` when `index` lies outside
/// the text.
pub fn smart_split(text: &str, index: usize) -> Option<(String, String)> {
    let chars = text.char_indices().collect::<Vec<_>>();
    if index > chars.len() {
        return None;
    }
    let byte_at = |offset: usize| chars.get(offset).map_or(text.len(), |(byte, _)| *byte);
    let halves = |offset: usize| {
        let (left, right) = text.split_at(byte_at(offset));
        (left.trim().to_string(), right.trim().to_string())
    };

    let mut word_start = None;
    for offset in 0..=chars.len() {
        let in_word = chars
            .get(offset)
            .map_or(false, |(_, c)| !c.is_whitespace());
        match (word_start, in_word) {
            (None, true) => word_start = Some(offset),
            (Some(start), false) => {
                if (start..=offset).contains(&index) {
                    return Some(if index - start < offset - index {
                        halves(start)
                    } else {
                        halves(offset)
                    });
                }
                word_start = None;
            }
            _ => {}
        }
    }
    // Between words: the offset already is a boundary.
    Some(halves(index))
}

/// Splits `subtitle` at `playhead`: the original is shrunk to end at the playhead and a
/// new caption covers the rest, as one undo step. The text is divided proportionally to
/// the playhead's position in the caption's span.
pub fn split_at_playhead(subtitle: &Subtitle, playhead: f64) -> Option<ActionGroup> {
    if !(subtitle.start < playhead && playhead < subtitle.end) {
        return None;
    }
    let length = subtitle.text.chars().count();
    let fraction = (playhead - subtitle.start) / subtitle.duration();
    let letter_index = (fraction * length as f64).round() as usize;
    let (left, right) = smart_split(&subtitle.text, letter_index)?;
    if left.is_empty() || right.is_empty() {
        return None;
    }

    let original = PartialSubtitle::from(subtitle);
    let shrink = Action::edit(
        original.clone(),
        PartialSubtitle {
            end: Some(playhead),
            text: Some(left),
            ..original.clone()
        },
    );
    let tail = Action::add(PartialSubtitle {
        id: None,
        start: Some(playhead),
        text: Some(right),
        ..original
    });
    Some(ActionGroup::new(vec![shrink, tail]))
}
