use crate::document::{Document, Subtitle, SubtitleId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Delete,
    Add,
    Edit,
}

/// Subtitle fields an action knows about. `character: None` means "no character", not
/// "unspecified".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartialSubtitle {
    pub id: Option<SubtitleId>,
    pub character: Option<String>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub text: Option<String>,
}

impl PartialSubtitle {
    pub fn with_id(id: SubtitleId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Start, end and text, when all three are present.
    fn content(&self) -> Option<(f64, f64, &str)> {
        match (self.start, self.end, &self.text) {
            (Some(start), Some(end), Some(text)) => Some((start, end, text.as_str())),
            _ => None,
        }
    }

    fn to_subtitle(&self, id: SubtitleId) -> Option<Subtitle> {
        self.content().map(|(start, end, text)| Subtitle {
            id,
            character: self.character.clone(),
            start,
            end,
            text: text.to_string(),
        })
    }

    fn write_into(&self, subtitle: &mut Subtitle) -> bool {
        match self.content() {
            Some((start, end, text)) => {
                subtitle.text = text.to_string();
                subtitle.character = self.character.clone();
                subtitle.start = start;
                subtitle.end = end;
                true
            }
            None => false,
        }
    }
}

impl From<&Subtitle> for PartialSubtitle {
    fn from(subtitle: &Subtitle) -> Self {
        Self {
            id: Some(subtitle.id),
            character: subtitle.character.clone(),
            start: Some(subtitle.start),
            end: Some(subtitle.end),
            text: Some(subtitle.text.clone()),
        }
    }
}

/// Description of one reversible mutation. Applying it may resolve details (the id of
/// an added caption, the content of a deleted one) back into the action so that
/// [`Action::undo`] can find them again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub from: PartialSubtitle,
    pub to: PartialSubtitle,
    #[serde(skip)]
    slot: Option<usize>,
    #[serde(skip)]
    introduced_character: Option<String>,
}

impl Action {
    pub fn new(kind: ActionKind, from: PartialSubtitle, to: PartialSubtitle) -> Self {
        Self {
            kind,
            from,
            to,
            slot: None,
            introduced_character: None,
        }
    }

    pub fn delete(id: SubtitleId) -> Self {
        Self::new(
            ActionKind::Delete,
            PartialSubtitle::with_id(id),
            PartialSubtitle::default(),
        )
    }

    pub fn add(to: PartialSubtitle) -> Self {
        Self::new(ActionKind::Add, PartialSubtitle::default(), to)
    }

    pub fn edit(from: PartialSubtitle, to: PartialSubtitle) -> Self {
        Self::new(ActionKind::Edit, from, to)
    }

    pub fn group(self) -> ActionGroup {
        ActionGroup::new(vec![self])
    }

    pub fn apply(&mut self, document: &mut Document) {
        match self.kind {
            ActionKind::Delete => {
                let position = self.from.id.and_then(|id| document.position(id));
                if let Some(position) = position {
                    let removed = document.remove_at(position);
                    self.from = PartialSubtitle::from(&removed);
                    self.slot = Some(position);
                } else {
                    log::debug!("Delete of unknown caption {:?} ignored", self.from.id);
                }
            }
            ActionKind::Edit => {
                let applied = match self.to.id.and_then(|id| document.get_mut(id)) {
                    Some(subtitle) => self.to.write_into(subtitle),
                    None => false,
                };
                if applied {
                    self.introduce_character(document);
                } else {
                    log::debug!("Malformed edit ignored: {:?}", self.to);
                }
            }
            ActionKind::Add => {
                let id = document.next_id();
                if let Some(subtitle) = self.to.to_subtitle(id) {
                    document.push(subtitle);
                    self.to.id = Some(id);
                    self.introduce_character(document);
                } else {
                    log::debug!("Malformed add ignored: {:?}", self.to);
                }
            }
        }
    }

    pub fn undo(&self, document: &mut Document) {
        match self.kind {
            ActionKind::Delete => {
                if let Some(subtitle) = self.from.id.and_then(|id| self.from.to_subtitle(id)) {
                    match self.slot {
                        Some(position) => document.insert(position, subtitle),
                        None => document.push(subtitle),
                    }
                }
            }
            ActionKind::Edit => {
                if let Some(subtitle) = self.from.id.and_then(|id| document.get_mut(id)) {
                    self.from.write_into(subtitle);
                }
                self.forget_character(document);
            }
            ActionKind::Add => {
                if let Some(position) = self.to.id.and_then(|id| document.position(id)) {
                    document.remove_at(position);
                }
                self.forget_character(document);
            }
        }
    }

    fn introduce_character(&mut self, document: &mut Document) {
        self.introduced_character = match &self.to.character {
            Some(name) if document.ensure_character(name) => Some(name.clone()),
            _ => None,
        };
    }

    fn forget_character(&self, document: &mut Document) {
        if let Some(name) = &self.introduced_character {
            document.forget_character(name);
        }
    }
}

/// Actions applied and undone as a single step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionGroup {
    pub actions: Vec<Action>,
}

impl ActionGroup {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn apply(&mut self, document: &mut Document) {
        for action in self.actions.iter_mut() {
            action.apply(document);
        }
    }

    /// Members are undone last-to-first so that dependent actions unwind correctly.
    pub fn undo(&self, document: &mut Document) {
        for action in self.actions.iter().rev() {
            action.undo(document);
        }
    }
}
