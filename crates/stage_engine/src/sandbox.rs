use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::actions::{ActionDescriptor, ActionInterpreter, ExecOutcome, Uninterrupted};
use crate::collision::{CollisionMonitor, MonitorHandle, SwapHandler};
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventLog};
use crate::notice::Notice;
use crate::playback::{PlayMode, PlaybackCoordinator, PlaybackReport, SequenceRunner};
use crate::stage::{Sprite, SpriteId, StageHandle, StageUpdate, Vec2};

/// Distance kept from the stage edge when a sprite is added without a position.
const RANDOM_SPAWN_INSET: f32 = 50.0;

static SESSION_POISON_WARNED: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
struct SandboxSession {
    selected: Option<SpriteId>,
    rng: SmallRng,
}

/// The sandbox as a whole: stage, playback, collision handling and the event log
/// behind one command surface. Commands that would conflict with a running show are
/// rejected with a [`Notice`].
#[derive(Debug)]
pub struct Sandbox {
    config: EngineConfig,
    stage: StageHandle,
    events: EventLog,
    interpreter: Arc<ActionInterpreter>,
    coordinator: PlaybackCoordinator,
    swap_handler: SwapHandler,
    session: Mutex<SandboxSession>,
    monitor: Option<MonitorHandle>,
}

impl Sandbox {
    /// Builds the sandbox without a running collision monitor.
    pub fn new(config: EngineConfig) -> Self {
        let stage = StageHandle::new(config.bounds);
        let events = EventLog::with_capacity(config.event_log_capacity);
        let interpreter = Arc::new(ActionInterpreter::new(config.bounds, config.timings));
        let runner = SequenceRunner::new(stage.clone(), interpreter.clone(), events.clone());
        let coordinator = PlaybackCoordinator::new(stage.clone(), runner, events.clone());
        let swap_handler = SwapHandler::new(stage.clone(), events.clone(), config.collision);
        let rng = match config.spawn_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        Self {
            config,
            stage,
            events,
            interpreter,
            coordinator,
            swap_handler,
            session: Mutex::new(SandboxSession {
                selected: None,
                rng,
            }),
            monitor: None,
        }
    }

    /// Builds the sandbox and starts the collision monitor on the current tokio
    /// runtime. The monitor runs until the sandbox is dropped.
    pub fn start(config: EngineConfig) -> Self {
        let mut sandbox = Self::new(config);
        let monitor = CollisionMonitor::new(
            sandbox.stage.clone(),
            sandbox.config.collision,
            Arc::new(sandbox.swap_handler.clone()),
        );
        sandbox.monitor = Some(monitor.spawn());
        info!(
            width = sandbox.config.bounds.width,
            height = sandbox.config.bounds.height,
            "sandbox_started"
        );
        sandbox
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stage(&self) -> &StageHandle {
        &self.stage
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn swap_count(&self) -> usize {
        self.swap_handler.swap_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageUpdate> {
        self.stage.subscribe()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.as_ref().is_some_and(MonitorHandle::is_running)
    }

    pub fn is_playing(&self) -> bool {
        self.coordinator.is_playing()
    }

    /// Adds a sprite at `position`, or at a random spot inside the stage, and
    /// selects it.
    pub fn add_sprite(&self, label: impl Into<String>, position: Option<Vec2>) -> SpriteId {
        let bounds = self.config.bounds;
        let mut session = self.session();
        let position = position.unwrap_or_else(|| {
            let span_x = (bounds.width - 2.0 * RANDOM_SPAWN_INSET).max(0.0);
            let span_y = (bounds.height - 2.0 * RANDOM_SPAWN_INSET).max(0.0);
            Vec2::new(
                session.rng.gen::<f32>() * span_x + RANDOM_SPAWN_INSET,
                session.rng.gen::<f32>() * span_y + RANDOM_SPAWN_INSET,
            )
        });
        let (sprite_id, name, position) = self.stage.write(|state| {
            let id = state.spawn_sprite(label, position);
            let sprite = state.sprite(id).map(|sprite| (sprite.display_name(), sprite.position));
            let (name, position) = sprite.unwrap_or_default();
            (id, name, position)
        });
        session.selected = Some(sprite_id);
        drop(session);

        info!(sprite = %sprite_id, name = %name, x = position.x, y = position.y, "sprite_added");
        self.events
            .record(EngineEvent::SpriteAdded { sprite_id, name });
        sprite_id
    }

    /// Removes the sprite, its queue and its cooldowns. A run in progress for it
    /// ends as `SpriteRemoved`.
    pub fn remove_sprite(&self, sprite_id: SpriteId) -> Result<Sprite, Notice> {
        let Some(sprite) = self.stage.write(|state| state.remove_sprite(sprite_id)) else {
            return Err(self.reject(Notice::UnknownSprite(sprite_id)));
        };
        {
            let mut session = self.session();
            if session.selected == Some(sprite_id) {
                session.selected = None;
            }
        }
        let name = sprite.display_name();
        info!(sprite = %sprite_id, name = %name, "sprite_removed");
        self.events
            .record(EngineEvent::SpriteRemoved { sprite_id, name });
        Ok(sprite)
    }

    /// Drags a sprite to `position` (clamped). Returns where it ended up.
    pub fn move_sprite(&self, sprite_id: SpriteId, position: Vec2) -> Result<Vec2, Notice> {
        self.ensure_idle()?;
        let moved = self.stage.write(|state| {
            let bounds = state.bounds();
            let sprite = state.sprite_mut(sprite_id)?;
            sprite.position = bounds.clamp(position);
            Some(sprite.position)
        });
        moved.ok_or_else(|| self.reject(Notice::UnknownSprite(sprite_id)))
    }

    /// Selecting the selected sprite again clears the selection.
    pub fn select_sprite(&self, sprite_id: SpriteId) -> Result<Option<SpriteId>, Notice> {
        if !self.stage.read(|state| state.contains(sprite_id)) {
            return Err(self.reject(Notice::UnknownSprite(sprite_id)));
        }
        let mut session = self.session();
        session.selected = if session.selected == Some(sprite_id) {
            None
        } else {
            Some(sprite_id)
        };
        Ok(session.selected)
    }

    pub fn selected_sprite(&self) -> Option<SpriteId> {
        self.session().selected
    }

    pub fn sprite(&self, sprite_id: SpriteId) -> Option<Sprite> {
        self.stage.sprite(sprite_id)
    }

    pub fn sprites(&self) -> Vec<Sprite> {
        self.stage.sprites()
    }

    pub fn queue(&self, sprite_id: SpriteId) -> Vec<ActionDescriptor> {
        self.stage.queue_actions(sprite_id)
    }

    /// Appends to the sprite's queue and returns the new queue length.
    pub fn enqueue_action(
        &self,
        sprite_id: SpriteId,
        action: ActionDescriptor,
    ) -> Result<usize, Notice> {
        self.ensure_idle()?;
        let label = action.label();
        let queued = self.stage.write(|state| {
            state
                .push_action(sprite_id, action)
                .then(|| state.queue_actions(sprite_id).len())
        });
        let len = queued.ok_or_else(|| self.reject(Notice::UnknownSprite(sprite_id)))?;
        info!(sprite = %sprite_id, action = %label, queue_len = len, "action_queued");
        self.events
            .record(EngineEvent::ActionQueued { sprite_id, label });
        Ok(len)
    }

    pub fn remove_action(
        &self,
        sprite_id: SpriteId,
        index: usize,
    ) -> Result<ActionDescriptor, Notice> {
        self.ensure_idle()?;
        let removed = self.stage.write(|state| {
            let len = state.queue(sprite_id)?.len();
            Some(state.remove_action(sprite_id, index).ok_or(len))
        });
        match removed {
            None => Err(self.reject(Notice::UnknownSprite(sprite_id))),
            Some(Err(len)) => Err(self.reject(Notice::ActionIndexOutOfRange { index, len })),
            Some(Ok(action)) => {
                info!(sprite = %sprite_id, index, "action_removed");
                Ok(action)
            }
        }
    }

    /// Empties the sprite's queue and returns how many actions were dropped.
    pub fn clear_actions(&self, sprite_id: SpriteId) -> Result<usize, Notice> {
        self.ensure_idle()?;
        let cleared = self.stage.write(|state| {
            let len = state.queue(sprite_id)?.len();
            state.clear_actions(sprite_id);
            Some(len)
        });
        let len = cleared.ok_or_else(|| self.reject(Notice::UnknownSprite(sprite_id)))?;
        info!(sprite = %sprite_id, cleared = len, "actions_cleared");
        Ok(len)
    }

    /// `Single` plays the selected sprite; `AllActive` plays every sprite with actions.
    pub async fn play(&self, mode: PlayMode) -> Result<PlaybackReport, Notice> {
        let selection = self.selected_sprite();
        self.coordinator.play(mode, selection).await
    }

    pub fn pause(&self) -> bool {
        self.coordinator.pause()
    }

    pub fn stop(&self) -> bool {
        self.coordinator.stop()
    }

    /// Applies one action to a sprite right away, outside any playback.
    pub async fn run_action_now(
        &self,
        sprite_id: SpriteId,
        action: &ActionDescriptor,
    ) -> Result<ExecOutcome, Notice> {
        self.ensure_idle()?;
        if !self.stage.read(|state| state.contains(sprite_id)) {
            return Err(self.reject(Notice::UnknownSprite(sprite_id)));
        }
        info!(sprite = %sprite_id, action = action.kind_name(), "action_run_now");
        Ok(self
            .interpreter
            .execute(&self.stage, sprite_id, action, &Uninterrupted)
            .await)
    }

    /// Stops any show, then removes every sprite, queue and cooldown.
    pub fn clear_all(&self) -> usize {
        if self.coordinator.is_playing() {
            self.coordinator.stop();
        }
        let removed = self.stage.write(|state| {
            let count = state.sprite_count();
            state.clear();
            count
        });
        self.session().selected = None;
        info!(removed, "stage_cleared");
        removed
    }

    fn ensure_idle(&self) -> Result<(), Notice> {
        if self.coordinator.is_playing() {
            return Err(self.reject(Notice::PlaybackInProgress));
        }
        Ok(())
    }

    fn reject(&self, notice: Notice) -> Notice {
        warn!(notice = %notice, "command_rejected");
        self.events.record(EngineEvent::Notice(notice.to_string()));
        notice
    }

    fn session(&self) -> MutexGuard<'_, SandboxSession> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                if SESSION_POISON_WARNED
                    .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    warn!("sandbox session lock poisoned; recovered inner value");
                }
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageBounds;

    fn seeded() -> Sandbox {
        Sandbox::new(EngineConfig {
            spawn_seed: Some(7),
            ..EngineConfig::default()
        })
    }

    #[test]
    fn random_spawn_stays_inside_inset() {
        let sandbox = seeded();
        let bounds = StageBounds::default();
        for _ in 0..50 {
            let id = sandbox.add_sprite("", None);
            let position = sandbox.sprite(id).expect("sprite").position;
            assert!(position.x >= 50.0 && position.x <= bounds.width - 50.0);
            assert!(position.y >= 50.0 && position.y <= bounds.height - 50.0);
        }
    }

    #[test]
    fn same_seed_gives_same_positions() {
        let first = seeded();
        let second = seeded();
        let a = first.add_sprite("a", None);
        let b = second.add_sprite("a", None);
        assert_eq!(
            first.sprite(a).expect("a").position,
            second.sprite(b).expect("b").position
        );
    }

    #[test]
    fn newest_sprite_is_selected_and_selection_toggles() {
        let sandbox = seeded();
        let cat = sandbox.add_sprite("Cat", Some(Vec2::new(100.0, 100.0)));
        let dog = sandbox.add_sprite("Dog", Some(Vec2::new(300.0, 100.0)));
        assert_eq!(sandbox.selected_sprite(), Some(dog));

        assert_eq!(sandbox.select_sprite(cat), Ok(Some(cat)));
        assert_eq!(sandbox.select_sprite(cat), Ok(None));
        assert_eq!(
            sandbox.select_sprite(SpriteId(99)),
            Err(Notice::UnknownSprite(SpriteId(99)))
        );

        sandbox.select_sprite(dog).expect("select");
        sandbox.remove_sprite(dog).expect("remove");
        assert_eq!(sandbox.selected_sprite(), None);
    }

    #[test]
    fn queue_edits_report_lengths_and_bad_indices() {
        let sandbox = seeded();
        let id = sandbox.add_sprite("Cat", None);

        assert_eq!(sandbox.enqueue_action(id, ActionDescriptor::turn(15.0)), Ok(1));
        assert_eq!(sandbox.enqueue_action(id, ActionDescriptor::move_steps(10.0)), Ok(2));
        assert_eq!(
            sandbox.remove_action(id, 5),
            Err(Notice::ActionIndexOutOfRange { index: 5, len: 2 })
        );
        assert_eq!(sandbox.remove_action(id, 0), Ok(ActionDescriptor::turn(15.0)));
        assert_eq!(sandbox.queue(id), vec![ActionDescriptor::move_steps(10.0)]);
        assert_eq!(sandbox.clear_actions(id), Ok(1));
        assert!(sandbox.queue(id).is_empty());
        assert_eq!(
            sandbox.enqueue_action(SpriteId(42), ActionDescriptor::turn(1.0)),
            Err(Notice::UnknownSprite(SpriteId(42)))
        );
    }

    #[test]
    fn drag_is_clamped() {
        let sandbox = seeded();
        let id = sandbox.add_sprite("Cat", None);
        assert_eq!(
            sandbox.move_sprite(id, Vec2::new(-100.0, 9_000.0)),
            Ok(Vec2::new(30.0, 457.0))
        );
    }

    #[test]
    fn rejections_are_logged_as_notices() {
        let sandbox = seeded();
        let _ = sandbox.remove_sprite(SpriteId(3));
        let notices = sandbox
            .events()
            .count_matching(|event| matches!(event, EngineEvent::Notice(_)));
        assert_eq!(notices, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_action_now_applies_immediately() {
        let sandbox = seeded();
        let id = sandbox.add_sprite("Cat", Some(Vec2::new(100.0, 100.0)));

        let outcome = sandbox
            .run_action_now(id, &ActionDescriptor::go_to(200.0, 150.0))
            .await;

        assert_eq!(outcome, Ok(ExecOutcome::Completed));
        assert_eq!(
            sandbox.sprite(id).expect("sprite").position,
            Vec2::new(200.0, 150.0)
        );
        // queue is untouched
        assert!(sandbox.queue(id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_all_resets_stage_and_selection() {
        let sandbox = Sandbox::start(EngineConfig::default());
        assert!(sandbox.is_monitoring());
        sandbox.add_sprite("Cat", Some(Vec2::new(100.0, 100.0)));
        sandbox.add_sprite("Dog", Some(Vec2::new(300.0, 100.0)));

        assert_eq!(sandbox.clear_all(), 2);
        assert!(sandbox.sprites().is_empty());
        assert_eq!(sandbox.selected_sprite(), None);
    }
}
