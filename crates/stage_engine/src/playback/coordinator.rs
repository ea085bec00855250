use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::runner::{CancelFlag, RunOutcome, SequenceRunner};
use crate::events::{EngineEvent, EventLog};
use crate::notice::Notice;
use crate::stage::{SpriteId, StageHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    /// Only the selected sprite performs.
    Single,
    /// Every sprite with a non-empty queue performs at the same time.
    AllActive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    pub mode: PlayMode,
    pub outcomes: Vec<(SpriteId, RunOutcome)>,
}

impl PlaybackReport {
    pub fn outcome_for(&self, sprite_id: SpriteId) -> Option<RunOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| *id == sprite_id)
            .map(|(_, outcome)| *outcome)
    }

    pub fn all_completed(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| *outcome == RunOutcome::Completed)
    }
}

#[derive(Debug)]
struct CoordinatorShared {
    stage: StageHandle,
    runner: SequenceRunner,
    events: EventLog,
    playing: AtomicBool,
    active_cancel: Mutex<Option<CancelFlag>>,
}

/// Owns one playback's runner tasks. Dropping it, whether `play` finished or its
/// future was dropped, cancels and aborts every run before reopening the gate.
struct PlayingGate<'a> {
    shared: &'a CoordinatorShared,
    cancel: CancelFlag,
    runs: Vec<(SpriteId, JoinHandle<RunOutcome>)>,
}

impl Drop for PlayingGate<'_> {
    fn drop(&mut self) {
        self.cancel.cancel();
        for (_, handle) in &self.runs {
            handle.abort();
        }
        self.shared.set_active_cancel(None);
        self.shared.playing.store(false, Ordering::SeqCst);
    }
}

impl CoordinatorShared {
    fn set_active_cancel(&self, cancel: Option<CancelFlag>) {
        let mut guard = match self.active_cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = cancel;
    }

    fn cancel_active(&self) -> bool {
        let guard = match self.active_cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackCoordinator {
    shared: Arc<CoordinatorShared>,
}

impl PlaybackCoordinator {
    pub fn new(stage: StageHandle, runner: SequenceRunner, events: EventLog) -> Self {
        Self {
            shared: Arc::new(CoordinatorShared {
                stage,
                runner,
                events,
                playing: AtomicBool::new(false),
                active_cancel: Mutex::new(None),
            }),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    /// Runs the selected sprite (`Single`) or every sprite with queued actions
    /// (`AllActive`) and resolves once every run has finished or been cancelled.
    /// A run that panics is reported as `Failed` without disturbing the others.
    pub async fn play(
        &self,
        mode: PlayMode,
        selection: Option<SpriteId>,
    ) -> Result<PlaybackReport, Notice> {
        let shared = self.shared.as_ref();
        if shared
            .playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(self.reject(Notice::AlreadyPlaying));
        }
        let mut gate = PlayingGate {
            shared,
            cancel: CancelFlag::default(),
            runs: Vec::new(),
        };

        let targets = self.resolve_targets(mode, selection)?;
        shared.set_active_cancel(Some(gate.cancel.clone()));

        info!(mode = ?mode, sprite_count = targets.len(), "playback_started");
        shared.events.record(EngineEvent::PlaybackStarted {
            mode,
            sprite_count: targets.len(),
        });

        for sprite_id in targets {
            let runner = shared.runner.clone();
            let cancel = gate.cancel.clone();
            let handle = tokio::spawn(async move { runner.run(sprite_id, cancel).await });
            gate.runs.push((sprite_id, handle));
        }

        let mut outcomes = Vec::with_capacity(gate.runs.len());
        for (sprite_id, handle) in gate.runs.iter_mut() {
            let sprite_id = *sprite_id;
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(sprite = %sprite_id, error = %join_error, "run_failed");
                    shared.events.record(EngineEvent::RunFinished {
                        sprite_id,
                        outcome: RunOutcome::Failed,
                    });
                    RunOutcome::Failed
                }
            };
            outcomes.push((sprite_id, outcome));
        }

        info!(mode = ?mode, "playback_finished");
        shared.events.record(EngineEvent::PlaybackFinished);
        Ok(PlaybackReport { mode, outcomes })
    }

    /// Cancels in-flight runs and leaves sprites as they are.
    pub fn pause(&self) -> bool {
        let cancelled = self.shared.cancel_active();
        info!(was_playing = cancelled, "playback_paused");
        self.shared.events.record(EngineEvent::PlaybackPaused);
        cancelled
    }

    /// Cancels in-flight runs and resets every sprite's speech, collision flag and scale.
    pub fn stop(&self) -> bool {
        let cancelled = self.shared.cancel_active();
        self.shared
            .stage
            .write(|state| state.for_each_sprite_mut(|sprite| sprite.reset_transient()));
        info!(was_playing = cancelled, "playback_stopped");
        self.shared.events.record(EngineEvent::PlaybackStopped);
        cancelled
    }

    fn resolve_targets(
        &self,
        mode: PlayMode,
        selection: Option<SpriteId>,
    ) -> Result<Vec<SpriteId>, Notice> {
        match mode {
            PlayMode::AllActive => {
                let active = self.shared.stage.read(|state| state.active_sprite_ids());
                if active.is_empty() {
                    return Err(self.reject(Notice::NothingToPlay));
                }
                Ok(active)
            }
            PlayMode::Single => {
                let Some(sprite_id) = selection else {
                    return Err(self.reject(Notice::NoSpriteSelected));
                };
                let queued = self.shared.stage.read(|state| {
                    state
                        .sprite(sprite_id)
                        .map(|sprite| (sprite.display_name(), state.queue_actions(sprite_id).len()))
                });
                match queued {
                    None => Err(self.reject(Notice::UnknownSprite(sprite_id))),
                    Some((name, 0)) => Err(self.reject(Notice::EmptyQueue { name })),
                    Some(_) => Ok(vec![sprite_id]),
                }
            }
        }
    }

    fn reject(&self, notice: Notice) -> Notice {
        warn!(notice = %notice, "playback_rejected");
        self.shared
            .events
            .record(EngineEvent::Notice(notice.to_string()));
        notice
    }
}
