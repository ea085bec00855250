mod sprite;
mod store;

pub use sprite::{SpeechKind, Sprite, SpriteId, SpriteIdAllocator, Vec2};
pub use store::{ActionQueue, SpritePair, StageHandle, StageState, StageUpdate};
