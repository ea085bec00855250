use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::CollisionConfig;
use crate::stage::{SpriteId, SpritePair, StageHandle, StageState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub a: SpriteId,
    pub b: SpriteId,
    pub distance: f32,
}

pub trait CollisionListener: Send + Sync + 'static {
    fn on_collision_event(&self, event: &CollisionEvent);
}

/// Every unordered pair closer than `radius * (scale_a + scale_b)`, in stage order.
/// Pairs where either sprite is still showing collision feedback, or that are
/// cooling down, are skipped.
pub fn detect_collisions(state: &StageState, radius: f32) -> Vec<CollisionEvent> {
    let sprites = state.sprites();
    let mut found = Vec::new();
    for (index, first) in sprites.iter().enumerate() {
        if first.has_collided {
            continue;
        }
        for second in &sprites[index + 1..] {
            if second.has_collided || state.is_cooling_down(SpritePair::new(first.id, second.id)) {
                continue;
            }
            let distance = first.position.distance(second.position);
            let threshold = radius * (first.scale + second.scale);
            if distance < threshold {
                found.push(CollisionEvent {
                    a: first.id,
                    b: second.id,
                    distance,
                });
            }
        }
    }
    found
}

/// Polls sprite positions on a fixed interval and hands each collision to a listener.
pub struct CollisionMonitor {
    stage: StageHandle,
    config: CollisionConfig,
    listener: Arc<dyn CollisionListener>,
}

impl fmt::Debug for CollisionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollisionMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CollisionMonitor {
    pub fn new(
        stage: StageHandle,
        config: CollisionConfig,
        listener: Arc<dyn CollisionListener>,
    ) -> Self {
        Self {
            stage,
            config,
            listener,
        }
    }

    /// One poll. Detection runs under the stage lock; the listener is called after
    /// it is released. Returns how many collisions were raised.
    pub fn tick(&self) -> usize {
        let collisions = self
            .stage
            .read(|state| detect_collisions(state, self.config.sprite_radius));
        for event in &collisions {
            debug!(
                a = %event.a,
                b = %event.b,
                distance = event.distance,
                "collision_detected"
            );
            self.listener.on_collision_event(event);
        }
        collisions.len()
    }

    /// Starts polling on the current runtime until the returned handle is dropped.
    pub fn spawn(self) -> MonitorHandle {
        let poll_interval = self.config.poll_interval;
        info!(poll_ms = poll_interval.as_millis() as u64, "collision_monitor_started");
        let task = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick();
            }
        });
        MonitorHandle { task }
    }
}

#[derive(Debug)]
pub struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::config::StageBounds;
    use crate::stage::Vec2;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<CollisionEvent>>,
    }

    impl CollisionListener for Recorder {
        fn on_collision_event(&self, event: &CollisionEvent) {
            self.seen.lock().expect("recorder lock").push(*event);
        }
    }

    fn state_with(positions: &[(f32, f32)]) -> (StageState, Vec<SpriteId>) {
        let mut state = StageState::new(StageBounds::default());
        let ids = positions
            .iter()
            .map(|&(x, y)| state.spawn_sprite("", Vec2::new(x, y)))
            .collect();
        (state, ids)
    }

    #[test]
    fn threshold_is_strict() {
        let (state, _) = state_with(&[(100.0, 100.0), (150.0, 100.0)]);
        assert!(detect_collisions(&state, 25.0).is_empty());

        let (state, ids) = state_with(&[(100.0, 100.0), (149.5, 100.0)]);
        let found = detect_collisions(&state, 25.0);
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].a, found[0].b), (ids[0], ids[1]));
        assert_eq!(found[0].distance, 49.5);
    }

    #[test]
    fn threshold_grows_with_scale() {
        let (mut state, ids) = state_with(&[(100.0, 100.0), (160.0, 100.0)]);
        assert!(detect_collisions(&state, 25.0).is_empty());

        if let Some(sprite) = state.sprite_mut(ids[1]) {
            sprite.scale = 1.5;
        }
        assert_eq!(detect_collisions(&state, 25.0).len(), 1);
    }

    #[test]
    fn skips_flagged_sprites_and_cooling_pairs() {
        let (mut state, ids) = state_with(&[(100.0, 100.0), (110.0, 100.0), (120.0, 100.0)]);
        assert_eq!(detect_collisions(&state, 25.0).len(), 3);

        state.insert_cooldown(SpritePair::new(ids[1], ids[0]));
        assert_eq!(detect_collisions(&state, 25.0).len(), 2);

        if let Some(sprite) = state.sprite_mut(ids[2]) {
            sprite.has_collided = true;
        }
        assert!(detect_collisions(&state, 25.0).is_empty());
    }

    #[test]
    fn tick_notifies_listener_for_each_pair() {
        let stage = StageHandle::new(StageBounds::default());
        stage.write(|state| {
            state.spawn_sprite("a", Vec2::new(100.0, 100.0));
            state.spawn_sprite("b", Vec2::new(120.0, 100.0));
            state.spawn_sprite("c", Vec2::new(400.0, 300.0));
            state.spawn_sprite("d", Vec2::new(400.0, 330.0));
        });
        let recorder = Arc::new(Recorder::default());
        let monitor = CollisionMonitor::new(stage, CollisionConfig::default(), recorder.clone());

        assert_eq!(monitor.tick(), 2);
        assert_eq!(recorder.seen.lock().expect("recorder lock").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_monitor_polls_until_dropped() {
        let stage = StageHandle::new(StageBounds::default());
        stage.write(|state| {
            state.spawn_sprite("a", Vec2::new(100.0, 100.0));
            state.spawn_sprite("b", Vec2::new(110.0, 100.0));
        });
        let recorder = Arc::new(Recorder::default());
        let handle = CollisionMonitor::new(
            stage.clone(),
            CollisionConfig::default(),
            recorder.clone(),
        )
        .spawn();

        // ticks at 0, 100, 200 and 300 ms
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(handle.is_running());
        let seen = recorder.seen.lock().expect("recorder lock").len();
        assert_eq!(seen, 4);

        drop(handle);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(recorder.seen.lock().expect("recorder lock").len(), seen);
    }
}
