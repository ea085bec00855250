pub mod actions;
pub mod collision;
pub mod config;
pub mod events;
mod notice;
pub mod playback;
mod sandbox;
pub mod stage;

pub use actions::{ActionDescriptor, ActionInterpreter, ExecOutcome, MoveDirection};
pub use collision::{CollisionEvent, SwapHandler, SwapOutcome};
pub use config::{
    ActionTimings, CollisionConfig, ConfigError, EngineConfig, StageBounds, SPAWN_SEED_ENV_VAR,
    STAGE_SIZE_ENV_VAR,
};
pub use events::{EngineEvent, EventLog, LoggedEvent};
pub use notice::Notice;
pub use playback::{PlayMode, PlaybackReport, RunOutcome};
pub use sandbox::Sandbox;
pub use stage::{SpeechKind, Sprite, SpriteId, StageHandle, StageUpdate, Vec2};
