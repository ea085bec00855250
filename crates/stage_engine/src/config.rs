use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::stage::Vec2;

pub const STAGE_SIZE_ENV_VAR: &str = "BLOCKSTAGE_STAGE_SIZE";
pub const SPAWN_SEED_ENV_VAR: &str = "BLOCKSTAGE_SPAWN_SEED";

pub const DEFAULT_STAGE_WIDTH: f32 = 650.0;
pub const DEFAULT_STAGE_HEIGHT: f32 = 487.0;
pub const DEFAULT_STAGE_MARGIN: f32 = 30.0;
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 64;

/// Playable stage area. Sprite centres stay `margin` pixels inside each edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageBounds {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl Default for StageBounds {
    fn default() -> Self {
        Self {
            width: DEFAULT_STAGE_WIDTH,
            height: DEFAULT_STAGE_HEIGHT,
            margin: DEFAULT_STAGE_MARGIN,
        }
    }
}

impl StageBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn min_x(&self) -> f32 {
        self.margin
    }

    pub fn max_x(&self) -> f32 {
        (self.width - self.margin).max(self.margin)
    }

    pub fn min_y(&self) -> f32 {
        self.margin
    }

    pub fn max_y(&self) -> f32 {
        (self.height - self.margin).max(self.margin)
    }

    pub fn clamp_x(&self, x: f32) -> f32 {
        clamp_axis(x, self.min_x(), self.max_x())
    }

    pub fn clamp_y(&self, y: f32) -> f32 {
        clamp_axis(y, self.min_y(), self.max_y())
    }

    pub fn clamp(&self, position: Vec2) -> Vec2 {
        Vec2 {
            x: self.clamp_x(position.x),
            y: self.clamp_y(position.y),
        }
    }

    pub fn contains(&self, position: Vec2) -> bool {
        (self.min_x()..=self.max_x()).contains(&position.x)
            && (self.min_y()..=self.max_y()).contains(&position.y)
    }
}

fn clamp_axis(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

/// Wait durations reported by the interpreter and runner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionTimings {
    pub move_per_step: Duration,
    pub move_max: Duration,
    pub min_action: Duration,
    pub turn: Duration,
    pub go_to: Duration,
    pub repeat_pause: Duration,
    pub step_pause: Duration,
}

impl Default for ActionTimings {
    fn default() -> Self {
        Self {
            move_per_step: Duration::from_millis(20),
            move_max: Duration::from_millis(500),
            min_action: Duration::from_millis(100),
            turn: Duration::from_millis(300),
            go_to: Duration::from_millis(500),
            repeat_pause: Duration::from_millis(200),
            step_pause: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionConfig {
    pub poll_interval: Duration,
    /// Radius of a sprite at scale 1. A pair collides when closer than the sum of radii.
    pub sprite_radius: f32,
    pub feedback_window: Duration,
    pub cooldown_window: Duration,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            sprite_radius: 25.0,
            feedback_window: Duration::from_secs(2),
            cooldown_window: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub bounds: StageBounds,
    pub timings: ActionTimings,
    pub collision: CollisionConfig,
    pub event_log_capacity: usize,
    pub spawn_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bounds: StageBounds::default(),
            timings: ActionTimings::default(),
            collision: CollisionConfig::default(),
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            spawn_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read environment variable {var}: value is not valid unicode")]
    NotUnicode { var: &'static str },
    #[error("invalid {var} value '{value}' (expected WIDTHxHEIGHT, e.g. 650x487)")]
    InvalidStageSize { var: &'static str, value: String },
    #[error("invalid {var} value '{value}' (expected u64)")]
    InvalidSeed { var: &'static str, value: String },
}

impl EngineConfig {
    /// Defaults with overrides from `BLOCKSTAGE_STAGE_SIZE` and `BLOCKSTAGE_SPAWN_SEED`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = read_env(STAGE_SIZE_ENV_VAR)? {
            let (width, height) = parse_stage_size(&raw).ok_or(ConfigError::InvalidStageSize {
                var: STAGE_SIZE_ENV_VAR,
                value: raw.clone(),
            })?;
            config.bounds.width = width;
            config.bounds.height = height;
        }
        if let Some(raw) = read_env(SPAWN_SEED_ENV_VAR)? {
            let seed = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidSeed {
                var: SPAWN_SEED_ENV_VAR,
                value: raw.clone(),
            })?;
            config.spawn_seed = Some(seed);
        }
        Ok(config)
    }
}

fn read_env(var: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(var) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { var }),
    }
}

pub(crate) fn parse_stage_size(raw: &str) -> Option<(f32, f32)> {
    let (width, height) = raw.trim().split_once(['x', 'X'])?;
    let width = width.trim().parse::<f32>().ok()?;
    let height = height.trim().parse::<f32>().ok()?;
    let valid = |value: f32| value.is_finite() && value > 2.0 * DEFAULT_STAGE_MARGIN;
    (valid(width) && valid(height)).then_some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_positions_inside_margins() {
        let bounds = StageBounds::default();
        let clamped = bounds.clamp(Vec2 {
            x: -500.0,
            y: 10_000.0,
        });
        assert_eq!(clamped.x, 30.0);
        assert_eq!(clamped.y, 457.0);
        assert!(bounds.contains(clamped));
    }

    #[test]
    fn clamp_maps_nan_to_lower_margin() {
        let bounds = StageBounds::default();
        assert_eq!(bounds.clamp_x(f32::NAN), bounds.min_x());
        assert_eq!(bounds.clamp_y(f32::INFINITY), bounds.max_y());
    }

    #[test]
    fn degenerate_stage_does_not_invert_range() {
        let bounds = StageBounds {
            width: 20.0,
            height: 20.0,
            margin: 30.0,
        };
        assert_eq!(bounds.clamp_x(100.0), 30.0);
        assert_eq!(bounds.clamp_y(-100.0), 30.0);
    }

    #[test]
    fn parses_stage_size_overrides() {
        assert_eq!(parse_stage_size("650x487"), Some((650.0, 487.0)));
        assert_eq!(parse_stage_size(" 350 X 262 "), Some((350.0, 262.0)));
        for raw in ["", "650", "x487", "abcxdef", "10x10", "NaNx400"] {
            assert_eq!(parse_stage_size(raw), None, "raw={raw}");
        }
    }
}
