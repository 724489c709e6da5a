use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type SubtitleId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }
}

/// Caption entry as stored on disk and sent over the wire. It carries no id: ids are
/// derived from array order every time a [`DocumentSnapshot`] is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    #[serde(default)]
    pub character: Option<String>,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Unit of replacement between clients and the server. Never merged, only overwritten.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub characters: Vec<Character>,
    pub captions: Vec<CaptionRecord>,
}

#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("caption #{index} has start {start} not before end {end}")]
    InvalidBounds { index: usize, start: f64, end: f64 },
    #[error("caption #{index} has a non-finite bound")]
    NonFinite { index: usize },
    #[error("character {0:?} is listed twice")]
    DuplicateCharacter(String),
    #[error("cannot parse captions: {0}")]
    Parse(String),
}

impl DocumentSnapshot {
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| DocumentError::Parse(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Canonical serialized form, used both for persisting and for change detection.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), DocumentError> {
        for (index, record) in self.captions.iter().enumerate() {
            if !record.start.is_finite() || !record.end.is_finite() {
                return Err(DocumentError::NonFinite { index });
            }
            if !(record.start < record.end) {
                return Err(DocumentError::InvalidBounds {
                    index,
                    start: record.start,
                    end: record.end,
                });
            }
        }
        for (i, character) in self.characters.iter().enumerate() {
            if self.characters[..i].iter().any(|c| c.name == character.name) {
                return Err(DocumentError::DuplicateCharacter(character.name.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subtitle {
    pub id: SubtitleId,
    pub character: Option<String>,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Subtitle {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Caption timeline plus character palette of one episode, as held by the editing client.
///
/// Captions keep insertion order. Mutation is crate-private: everything outside goes
/// through [`crate::ActionLog`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    characters: Vec<Character>,
    captions: Vec<Subtitle>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn captions(&self) -> &[Subtitle] {
        &self.captions
    }

    pub fn get(&self, id: SubtitleId) -> Option<&Subtitle> {
        self.captions.iter().find(|st| st.id == id)
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            characters: self.characters.clone(),
            captions: self
                .captions
                .iter()
                .map(|st| CaptionRecord {
                    character: st.character.clone(),
                    start: st.start,
                    end: st.end,
                    text: st.text.clone(),
                })
                .collect(),
        }
    }

    pub fn character_index(&self, name: &str) -> Option<usize> {
        self.characters.iter().position(|c| c.name == name)
    }

    /// Lane color of a character, `None` standing for the "no character" lane.
    /// Falls back to a hue derived from the palette index.
    pub fn color_of(&self, character: Option<&str>) -> String {
        let index = match character {
            Some(name) => match self.character_index(name) {
                Some(index) => {
                    if let Some(color) = &self.characters[index].color {
                        return color.clone();
                    }
                    index
                }
                None => self.characters.len(),
            },
            None => self.characters.len(),
        };
        let hue = index as f64 / (self.characters.len() + 1) as f64 * 360.0;
        format!("hsl({}deg, 100%, 70%)", hue)
    }

    pub(crate) fn position(&self, id: SubtitleId) -> Option<usize> {
        self.captions.iter().position(|st| st.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: SubtitleId) -> Option<&mut Subtitle> {
        self.captions.iter_mut().find(|st| st.id == id)
    }

    pub(crate) fn next_id(&self) -> SubtitleId {
        self.captions.iter().map(|st| st.id).max().unwrap_or(0) + 1
    }

    pub(crate) fn push(&mut self, subtitle: Subtitle) {
        self.captions.push(subtitle);
    }

    pub(crate) fn insert(&mut self, position: usize, subtitle: Subtitle) {
        let position = position.min(self.captions.len());
        self.captions.insert(position, subtitle);
    }

    pub(crate) fn remove_at(&mut self, position: usize) -> Subtitle {
        self.captions.remove(position)
    }

    /// Appends `name` to the palette if missing. Returns whether it was appended.
    pub(crate) fn ensure_character(&mut self, name: &str) -> bool {
        if self.character_index(name).is_some() {
            false
        } else {
            self.characters.push(Character::new(name));
            true
        }
    }

    pub(crate) fn forget_character(&mut self, name: &str) {
        if let Some(index) = self.character_index(name) {
            self.characters.remove(index);
        }
    }

    pub(crate) fn set_character_color(&mut self, name: &str, color: Option<String>) -> bool {
        match self.characters.iter_mut().find(|c| c.name == name) {
            Some(character) => {
                character.color = color;
                true
            }
            None => false,
        }
    }
}

impl From<&DocumentSnapshot> for Document {
    /// Ids are the on-disk order. Characters referenced by captions but absent from the
    /// palette are appended without a color.
    fn from(snapshot: &DocumentSnapshot) -> Self {
        let mut document = Document {
            characters: snapshot.characters.clone(),
            captions: snapshot
                .captions
                .iter()
                .enumerate()
                .map(|(index, record)| Subtitle {
                    id: index as SubtitleId,
                    character: record.character.clone(),
                    start: record.start,
                    end: record.end,
                    text: record.text.clone(),
                })
                .collect(),
        };
        let referenced = document
            .captions
            .iter()
            .filter_map(|st| st.character.clone())
            .collect::<Vec<_>>();
        for name in referenced {
            document.ensure_character(&name);
        }
        document
    }
}
