use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpriteId(pub u64);

impl fmt::Display for SpriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct SpriteIdAllocator {
    next: u64,
}

impl SpriteIdAllocator {
    pub fn allocate(&mut self) -> SpriteId {
        self.next = self.next.saturating_add(1);
        SpriteId(self.next)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechKind {
    Say,
    Think,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    pub id: SpriteId,
    pub label: String,
    pub position: Vec2,
    pub rotation_degrees: f32,
    pub speech: String,
    pub speech_kind: Option<SpeechKind>,
    pub has_collided: bool,
    pub scale: f32,
}

impl Sprite {
    pub fn new(id: SpriteId, label: impl Into<String>, position: Vec2) -> Self {
        Self {
            id,
            label: label.into(),
            position,
            rotation_degrees: 0.0,
            speech: String::new(),
            speech_kind: None,
            has_collided: false,
            scale: 1.0,
        }
    }

    /// Name used in notices and swap speech; unnamed sprites become `Friend<id>`.
    pub fn display_name(&self) -> String {
        let label = self.label.trim();
        if label.is_empty() {
            format!("Friend{}", self.id.0)
        } else {
            label.to_string()
        }
    }

    pub fn speak(&mut self, kind: SpeechKind, text: impl Into<String>) {
        self.speech = text.into();
        self.speech_kind = Some(kind);
    }

    pub fn clear_speech(&mut self) {
        self.speech.clear();
        self.speech_kind = None;
    }

    /// Clears speech, collision feedback and scale; position and rotation are kept.
    pub fn reset_transient(&mut self) {
        self.clear_speech();
        self.has_collided = false;
        self.scale = 1.0;
    }
}
