use thiserror::Error;

use crate::stage::SpriteId;

/// User-facing rejection of a sandbox command. Notices are shown to the user and
/// leave the stage untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Notice {
    #[error("Pick a character first!")]
    NoSpriteSelected,
    #[error("character {0} is not on the stage")]
    UnknownSprite(SpriteId),
    #[error("{name} has no actions yet! Add some blocks first.")]
    EmptyQueue { name: String },
    #[error("No characters have actions to perform!")]
    NothingToPlay,
    #[error("can't edit actions while the show is running")]
    PlaybackInProgress,
    #[error("the show is already running")]
    AlreadyPlaying,
    #[error("action {index} is out of range for a queue of {len}")]
    ActionIndexOutOfRange { index: usize, len: usize },
}
