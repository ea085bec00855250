use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::actions::{ActionInterpreter, ExecOutcome, StepControl};
use crate::events::{EngineEvent, EventLog};
use crate::stage::{SpriteId, StageHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Paused or stopped before the queue was exhausted.
    Interrupted,
    SpriteRemoved,
    Failed,
}

/// Cooperative cancellation shared by every runner of one playback.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Position in the live queue, valid only for the queue revision it was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExecutionCursor {
    index: usize,
    revision: u64,
}

struct RunControl<'a> {
    stage: &'a StageHandle,
    sprite_id: SpriteId,
    revision: u64,
    cancel: &'a CancelFlag,
}

impl StepControl for RunControl<'_> {
    fn should_continue(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.stage.queue_revision(self.sprite_id) == Some(self.revision)
    }
}

/// Drives one sprite through its queue. The queue is re-read by id before every
/// step; when a swap replaced it the run starts over at the top of the new queue.
#[derive(Debug, Clone)]
pub struct SequenceRunner {
    stage: StageHandle,
    interpreter: Arc<ActionInterpreter>,
    events: EventLog,
    step_pause: Duration,
    #[cfg(test)]
    panic_for: Option<SpriteId>,
}

impl SequenceRunner {
    pub fn new(stage: StageHandle, interpreter: Arc<ActionInterpreter>, events: EventLog) -> Self {
        let step_pause = interpreter.timings().step_pause;
        Self {
            stage,
            interpreter,
            events,
            step_pause,
            #[cfg(test)]
            panic_for: None,
        }
    }

    /// Runner whose run for `sprite_id` panics before its first step.
    #[cfg(test)]
    pub(crate) fn panicking_for(mut self, sprite_id: SpriteId) -> Self {
        self.panic_for = Some(sprite_id);
        self
    }

    pub async fn run(&self, sprite_id: SpriteId, cancel: CancelFlag) -> RunOutcome {
        let outcome = self.run_inner(sprite_id, &cancel).await;
        info!(sprite = %sprite_id, outcome = ?outcome, "run_finished");
        self.events
            .record(EngineEvent::RunFinished { sprite_id, outcome });
        outcome
    }

    async fn run_inner(&self, sprite_id: SpriteId, cancel: &CancelFlag) -> RunOutcome {
        #[cfg(test)]
        if self.panic_for == Some(sprite_id) {
            panic!("run for sprite {sprite_id} panicked");
        }
        let Some(revision) = self.stage.queue_revision(sprite_id) else {
            return RunOutcome::SpriteRemoved;
        };
        let mut cursor = ExecutionCursor { index: 0, revision };

        loop {
            let live = self.stage.read(|state| {
                state.queue(sprite_id).map(|queue| {
                    (
                        queue.revision(),
                        queue.len(),
                        queue.actions().get(cursor.index).cloned(),
                    )
                })
            });
            let Some((revision, total, next)) = live else {
                return RunOutcome::SpriteRemoved;
            };

            if revision != cursor.revision {
                cursor = ExecutionCursor { index: 0, revision };
                info!(sprite = %sprite_id, queue_len = total, "queue_adopted");
                self.events.record(EngineEvent::QueueAdopted {
                    sprite_id,
                    queue_len: total,
                });
                continue;
            }

            let Some(action) = next else {
                return RunOutcome::Completed;
            };
            if cancel.is_cancelled() {
                return RunOutcome::Interrupted;
            }

            debug!(
                sprite = %sprite_id,
                index = cursor.index,
                total,
                action = action.kind_name(),
                "step_started"
            );
            self.events.record(EngineEvent::StepStarted {
                sprite_id,
                index: cursor.index,
                total,
                label: action.label(),
            });

            let control = RunControl {
                stage: &self.stage,
                sprite_id,
                revision: cursor.revision,
                cancel,
            };
            match self
                .interpreter
                .execute(&self.stage, sprite_id, &action, &control)
                .await
            {
                ExecOutcome::Completed => {}
                // Cancelled or swapped mid-repeat; the top of the loop decides which.
                ExecOutcome::Aborted => continue,
                ExecOutcome::SpriteMissing => return RunOutcome::SpriteRemoved,
            }

            debug!(sprite = %sprite_id, index = cursor.index, "step_finished");
            self.events.record(EngineEvent::StepFinished {
                sprite_id,
                index: cursor.index,
            });
            sleep(self.step_pause).await;
            cursor.index += 1;
        }
    }
}
