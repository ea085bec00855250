use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::monitor::{CollisionEvent, CollisionListener};
use crate::config::CollisionConfig;
use crate::events::{EngineEvent, EventLog};
use crate::stage::{SpeechKind, SpriteId, SpritePair, StageHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwapOutcome {
    Swapped {
        distance: f32,
        a_had: usize,
        b_had: usize,
    },
    CoolingDown,
    SpriteMissing,
    Ignored,
}

/// Exchanges the queues of two colliding sprites and schedules the feedback reset
/// and cooldown expiry.
#[derive(Debug, Clone)]
pub struct SwapHandler {
    stage: StageHandle,
    events: EventLog,
    config: CollisionConfig,
    swaps: Arc<AtomicUsize>,
}

impl SwapHandler {
    pub fn new(stage: StageHandle, events: EventLog, config: CollisionConfig) -> Self {
        Self {
            stage,
            events,
            config,
            swaps: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Swaps performed since the handler was created, shared by every clone.
    pub fn swap_count(&self) -> usize {
        self.swaps.load(Ordering::SeqCst)
    }

    /// Validation, cooldown insert, queue exchange and feedback all happen in one
    /// write scope, so no monitor tick or runner step observes a half-done swap.
    pub fn on_collision(&self, a: SpriteId, b: SpriteId) -> SwapOutcome {
        if a == b {
            return SwapOutcome::Ignored;
        }
        let pair = SpritePair::new(a, b);
        let outcome = self.stage.write(|state| {
            let (Some(first), Some(second)) = (state.sprite(a), state.sprite(b)) else {
                return SwapOutcome::SpriteMissing;
            };
            let distance = first.position.distance(second.position);
            let name_a = first.display_name();
            let name_b = second.display_name();

            if !state.insert_cooldown(pair) {
                return SwapOutcome::CoolingDown;
            }
            let Some((a_had, b_had)) = state.swap_queues(a, b) else {
                state.remove_cooldown(pair);
                return SwapOutcome::SpriteMissing;
            };
            for (id, other) in [(a, &name_b), (b, &name_a)] {
                if let Some(sprite) = state.sprite_mut(id) {
                    sprite.has_collided = true;
                    sprite.speak(SpeechKind::Say, format!("Got {other}'s moves! ✨"));
                }
            }
            SwapOutcome::Swapped {
                distance,
                a_had,
                b_had,
            }
        });

        match outcome {
            SwapOutcome::Swapped {
                distance,
                a_had,
                b_had,
            } => {
                self.swaps.fetch_add(1, Ordering::SeqCst);
                info!(a = %a, b = %b, distance, a_had, b_had, "queues_swapped");
                self.events.record(EngineEvent::Collision { a, b, distance });
                self.events.record(EngineEvent::QueuesSwapped {
                    a,
                    b,
                    a_had,
                    b_had,
                });
                self.schedule_reset(pair);
            }
            SwapOutcome::CoolingDown => debug!(a = %a, b = %b, "swap_suppressed_cooldown"),
            SwapOutcome::SpriteMissing => debug!(a = %a, b = %b, "swap_aborted_missing_sprite"),
            SwapOutcome::Ignored => {}
        }
        outcome
    }

    fn schedule_reset(&self, pair: SpritePair) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(pair = ?pair.ids(), "swap_reset_not_scheduled_no_runtime");
            return;
        };
        let stage = self.stage.clone();
        let feedback_window = self.config.feedback_window;
        let cooldown_window = self.config.cooldown_window;
        runtime.spawn(async move {
            sleep(feedback_window).await;
            let (a, b) = pair.ids();
            stage.write(|state| {
                for id in [a, b] {
                    if let Some(sprite) = state.sprite_mut(id) {
                        sprite.has_collided = false;
                        sprite.clear_speech();
                    }
                }
            });
            debug!(a = %a, b = %b, "collision_feedback_cleared");

            sleep(cooldown_window).await;
            stage.write(|state| state.remove_cooldown(pair));
            debug!(a = %a, b = %b, "collision_cooldown_expired");
        });
    }
}

impl CollisionListener for SwapHandler {
    fn on_collision_event(&self, event: &CollisionEvent) {
        self.on_collision(event.a, event.b);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::actions::ActionDescriptor;
    use crate::config::StageBounds;
    use crate::stage::Vec2;

    fn setup() -> (SwapHandler, StageHandle, EventLog, SpriteId, SpriteId) {
        let stage = StageHandle::new(StageBounds::default());
        let events = EventLog::with_capacity(64);
        let (a, b) = stage.write(|state| {
            let a = state.spawn_sprite("Cat", Vec2::new(100.0, 200.0));
            let b = state.spawn_sprite("Dog", Vec2::new(130.0, 200.0));
            state.push_action(a, ActionDescriptor::move_steps(15.0));
            state.push_action(a, ActionDescriptor::turn(15.0));
            state.push_action(b, ActionDescriptor::move_steps(-15.0));
            (a, b)
        });
        let handler = SwapHandler::new(stage.clone(), events.clone(), CollisionConfig::default());
        (handler, stage, events, a, b)
    }

    #[tokio::test(start_paused = true)]
    async fn swap_exchanges_queues_and_marks_both_sprites() {
        let (handler, stage, events, a, b) = setup();

        let outcome = handler.on_collision(a, b);

        assert_eq!(
            outcome,
            SwapOutcome::Swapped {
                distance: 30.0,
                a_had: 2,
                b_had: 1
            }
        );
        assert_eq!(
            stage.queue_actions(a),
            vec![ActionDescriptor::move_steps(-15.0)]
        );
        assert_eq!(
            stage.queue_actions(b),
            vec![
                ActionDescriptor::move_steps(15.0),
                ActionDescriptor::turn(15.0)
            ]
        );
        let cat = stage.sprite(a).expect("cat");
        let dog = stage.sprite(b).expect("dog");
        assert!(cat.has_collided && dog.has_collided);
        assert_eq!(cat.speech, "Got Dog's moves! ✨");
        assert_eq!(dog.speech, "Got Cat's moves! ✨");
        assert_eq!(
            events.count_matching(|event| matches!(event, EngineEvent::QueuesSwapped { .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_collisions_during_cooldown_swap_once() {
        let (handler, stage, _, a, b) = setup();

        assert!(matches!(handler.on_collision(a, b), SwapOutcome::Swapped { .. }));
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(handler.on_collision(b, a), SwapOutcome::CoolingDown);
        }

        assert_eq!(stage.queue_actions(a).len(), 1);
        assert_eq!(stage.queue_actions(b).len(), 2);
        assert_eq!(handler.clone().swap_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn feedback_clears_before_cooldown_expires() {
        let (handler, stage, _, a, b) = setup();
        handler.on_collision(a, b);

        tokio::time::sleep(Duration::from_millis(2_050)).await;
        let cat = stage.sprite(a).expect("cat");
        assert!(!cat.has_collided);
        assert!(cat.speech.is_empty());
        assert_eq!(handler.on_collision(a, b), SwapOutcome::CoolingDown);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(stage.read(|state| state.cooldown_count()), 0);
        assert!(matches!(handler.on_collision(a, b), SwapOutcome::Swapped { .. }));
        assert_eq!(stage.queue_actions(a).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_sprite_aborts_without_cooldown() {
        let (handler, stage, events, a, b) = setup();
        stage.write(|state| state.remove_sprite(b));

        assert_eq!(handler.on_collision(a, b), SwapOutcome::SpriteMissing);
        assert_eq!(handler.on_collision(a, a), SwapOutcome::Ignored);
        assert_eq!(stage.read(|state| state.cooldown_count()), 0);
        assert_eq!(stage.queue_actions(a).len(), 2);
        assert!(events.events().is_empty());
    }
}
