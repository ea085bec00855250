use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use super::descriptor::{ActionDescriptor, MoveDirection};
use crate::config::{ActionTimings, StageBounds};
use crate::stage::{SpeechKind, Sprite, SpriteId, StageHandle};

/// Work left after an action's hold time has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    ClearSpeech,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionEffect {
    pub sprite: Sprite,
    pub hold: Duration,
    pub follow_up: Option<FollowUp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Completed,
    /// Stopped between nested steps because the caller asked to stop.
    Aborted,
    SpriteMissing,
}

/// Consulted between nested `repeat` steps.
pub trait StepControl: Send + Sync {
    fn should_continue(&self) -> bool;
}

/// Control for one-off execution outside playback; never interrupts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uninterrupted;

impl StepControl for Uninterrupted {
    fn should_continue(&self) -> bool {
        true
    }
}

type ExecFuture<'a> = Pin<Box<dyn Future<Output = ExecOutcome> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct ActionInterpreter {
    bounds: StageBounds,
    timings: ActionTimings,
}

impl ActionInterpreter {
    pub fn new(bounds: StageBounds, timings: ActionTimings) -> Self {
        Self { bounds, timings }
    }

    pub fn timings(&self) -> &ActionTimings {
        &self.timings
    }

    /// Resulting sprite state and total duration of `action`, without waiting.
    /// A `repeat` folds its nested steps, pauses and speech clears into one effect.
    pub fn apply(&self, sprite: &Sprite, action: &ActionDescriptor) -> ActionEffect {
        let mut next = sprite.clone();
        match action {
            ActionDescriptor::MoveSteps { steps, direction } => {
                let steps = if steps.is_nan() { 0.0 } else { *steps };
                match direction {
                    Some(MoveDirection::Up) => {
                        next.position.y = self.bounds.clamp_y(sprite.position.y - steps);
                    }
                    Some(MoveDirection::Down) => {
                        next.position.y = self.bounds.clamp_y(sprite.position.y + steps);
                    }
                    None => {
                        let (dx, dy) = heading_displacement(steps, sprite.rotation_degrees);
                        next.position.x = self.bounds.clamp_x(sprite.position.x + dx);
                        next.position.y = self.bounds.clamp_y(sprite.position.y + dy);
                    }
                }
                ActionEffect {
                    sprite: next,
                    hold: self.move_duration(steps),
                    follow_up: None,
                }
            }
            ActionDescriptor::TurnDegrees { degrees } => {
                if degrees.is_finite() {
                    next.rotation_degrees += degrees;
                }
                ActionEffect {
                    sprite: next,
                    hold: self.timings.turn.max(self.timings.min_action),
                    follow_up: None,
                }
            }
            ActionDescriptor::GoToXy { x, y } => {
                next.position.x = self.bounds.clamp_x(*x);
                next.position.y = self.bounds.clamp_y(*y);
                ActionEffect {
                    sprite: next,
                    hold: self.timings.go_to.max(self.timings.min_action),
                    follow_up: None,
                }
            }
            ActionDescriptor::SayFor { text, seconds } => {
                next.speak(SpeechKind::Say, text.clone());
                ActionEffect {
                    sprite: next,
                    hold: self.speech_duration(*seconds),
                    follow_up: Some(FollowUp::ClearSpeech),
                }
            }
            ActionDescriptor::ThinkFor { text, seconds } => {
                next.speak(SpeechKind::Think, text.clone());
                ActionEffect {
                    sprite: next,
                    hold: self.speech_duration(*seconds),
                    follow_up: Some(FollowUp::ClearSpeech),
                }
            }
            ActionDescriptor::Repeat { times, actions } => {
                let mut hold = Duration::ZERO;
                for _ in 0..repeat_count(*times) {
                    for nested in actions {
                        let effect = self.apply(&next, nested);
                        next = effect.sprite;
                        if effect.follow_up == Some(FollowUp::ClearSpeech) {
                            next.clear_speech();
                        }
                        hold = hold
                            .saturating_add(effect.hold)
                            .saturating_add(self.timings.repeat_pause);
                    }
                }
                ActionEffect {
                    sprite: next,
                    hold,
                    follow_up: None,
                }
            }
            ActionDescriptor::Unknown => ActionEffect {
                sprite: next,
                hold: Duration::ZERO,
                follow_up: None,
            },
        }
    }

    /// Applies `action` to the live sprite and waits out its duration. Each step reads
    /// the sprite by id inside the stage lock, so concurrent changes are never lost.
    pub fn execute<'a>(
        &'a self,
        stage: &'a StageHandle,
        sprite_id: SpriteId,
        action: &'a ActionDescriptor,
        control: &'a dyn StepControl,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            match action {
                ActionDescriptor::Repeat { times, actions } => {
                    for iteration in 0..repeat_count(*times) {
                        for nested in actions {
                            if !control.should_continue() {
                                debug!(sprite = %sprite_id, iteration, "repeat_aborted");
                                return ExecOutcome::Aborted;
                            }
                            match self.execute(stage, sprite_id, nested, control).await {
                                ExecOutcome::Completed => {}
                                other => return other,
                            }
                            sleep(self.timings.repeat_pause).await;
                        }
                    }
                    ExecOutcome::Completed
                }
                ActionDescriptor::Unknown => {
                    warn!(sprite = %sprite_id, "unknown_action_skipped");
                    ExecOutcome::Completed
                }
                _ => self.execute_single(stage, sprite_id, action).await,
            }
        })
    }

    async fn execute_single(
        &self,
        stage: &StageHandle,
        sprite_id: SpriteId,
        action: &ActionDescriptor,
    ) -> ExecOutcome {
        let effect = stage.write(|state| {
            let sprite = state.sprite_mut(sprite_id)?;
            let effect = self.apply(sprite, action);
            *sprite = effect.sprite.clone();
            Some(effect)
        });
        let Some(effect) = effect else {
            return ExecOutcome::SpriteMissing;
        };
        debug!(
            sprite = %sprite_id,
            action = action.kind_name(),
            x = effect.sprite.position.x,
            y = effect.sprite.position.y,
            rotation = effect.sprite.rotation_degrees,
            hold_ms = effect.hold.as_millis() as u64,
            "action_applied"
        );

        sleep(effect.hold).await;

        if effect.follow_up == Some(FollowUp::ClearSpeech) {
            stage.write(|state| {
                if let Some(sprite) = state.sprite_mut(sprite_id) {
                    sprite.clear_speech();
                }
            });
        }
        ExecOutcome::Completed
    }

    fn move_duration(&self, steps: f32) -> Duration {
        let max = self.timings.move_max;
        let nanos = f64::from(steps.abs()) * self.timings.move_per_step.as_nanos() as f64;
        let duration = if !nanos.is_finite() || nanos >= max.as_nanos() as f64 {
            max
        } else {
            Duration::from_nanos(nanos.round() as u64)
        };
        duration.max(self.timings.min_action)
    }

    fn speech_duration(&self, seconds: f32) -> Duration {
        if !seconds.is_finite() || seconds <= 0.0 {
            return self.timings.min_action;
        }
        Duration::try_from_secs_f32(seconds)
            .unwrap_or(self.timings.min_action)
            .max(self.timings.min_action)
    }
}

/// Descriptors decoded or built without the constructor may carry `times = 0`;
/// every repeat runs its body at least once.
fn repeat_count(times: u32) -> u32 {
    times.max(1)
}

/// Pixel displacement of `steps` along a heading of `rotation_degrees`
/// (0° points along +x, positive angles turn clockwise on screen).
fn heading_displacement(steps: f32, rotation_degrees: f32) -> (f32, f32) {
    let radians = rotation_degrees.to_radians();
    let finite_or_zero = |value: f32| if value.is_nan() { 0.0 } else { value };
    (
        finite_or_zero(steps * radians.cos()),
        finite_or_zero(steps * radians.sin()),
    )
}
