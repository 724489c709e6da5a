use crate::action::{Action, ActionGroup, PartialSubtitle};
use crate::document::{Document, DocumentSnapshot, SubtitleId};
use crate::split::split_at_playhead;

/// Undo/redo engine owning the editing client's [`Document`].
///
/// The stacks only hold action descriptions; every mutation of the document goes through
/// [`ActionLog::apply`], [`ActionLog::undo`] or [`ActionLog::redo`].
#[derive(Debug, Default)]
pub struct ActionLog {
    document: Document,
    undo_stack: Vec<ActionGroup>,
    redo_stack: Vec<ActionGroup>,
}

impl ActionLog {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        self.document.snapshot()
    }

    /// Wholesale replacement by a document received from the room. History refers to
    /// ids of the old document, so it is dropped.
    pub fn replace(&mut self, snapshot: &DocumentSnapshot) {
        self.document = Document::from(snapshot);
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn apply(&mut self, group: ActionGroup) {
        self.push(group, true);
    }

    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(group) => {
                group.undo(&mut self.document);
                self.redo_stack.push(group);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(group) => {
                self.push(group, false);
                true
            }
            None => false,
        }
    }

    fn push(&mut self, mut group: ActionGroup, clear_redo: bool) {
        group.apply(&mut self.document);
        if clear_redo {
            self.redo_stack.clear();
        }
        self.undo_stack.push(group);
    }

    pub fn delete(&mut self, id: SubtitleId) -> bool {
        if self.document.get(id).is_none() {
            return false;
        }
        self.apply(Action::delete(id).group());
        true
    }

    /// Adds a copy of caption `id` detached from any character. Returns the new id.
    pub fn duplicate(&mut self, id: SubtitleId) -> Option<SubtitleId> {
        let copy = PartialSubtitle {
            id: None,
            character: None,
            ..PartialSubtitle::from(self.document.get(id)?)
        };
        self.apply(Action::add(copy).group());
        self.undo_stack
            .last()
            .and_then(|group| group.actions[0].to.id)
    }

    pub fn edit_text(&mut self, id: SubtitleId, text: String) -> bool {
        let original = match self.document.get(id) {
            Some(subtitle) => PartialSubtitle::from(subtitle),
            None => return false,
        };
        let edited = PartialSubtitle {
            text: Some(text),
            ..original.clone()
        };
        self.apply(Action::edit(original, edited).group());
        true
    }

    pub fn split(&mut self, id: SubtitleId, playhead: f64) -> bool {
        match self
            .document
            .get(id)
            .and_then(|subtitle| split_at_playhead(subtitle, playhead))
        {
            Some(group) => {
                self.apply(group);
                true
            }
            None => false,
        }
    }

    /// Palette colors are not part of the undo history.
    pub fn set_character_color(&mut self, name: &str, color: Option<String>) -> bool {
        self.document.set_character_color(name, color)
    }
}
