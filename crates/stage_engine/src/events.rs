use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::playback::{PlayMode, RunOutcome};
use crate::stage::SpriteId;

static EVENT_LOG_POISON_WARNED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Notice(String),
    SpriteAdded {
        sprite_id: SpriteId,
        name: String,
    },
    SpriteRemoved {
        sprite_id: SpriteId,
        name: String,
    },
    ActionQueued {
        sprite_id: SpriteId,
        label: String,
    },
    PlaybackStarted {
        mode: PlayMode,
        sprite_count: usize,
    },
    StepStarted {
        sprite_id: SpriteId,
        index: usize,
        total: usize,
        label: String,
    },
    StepFinished {
        sprite_id: SpriteId,
        index: usize,
    },
    QueueAdopted {
        sprite_id: SpriteId,
        queue_len: usize,
    },
    RunFinished {
        sprite_id: SpriteId,
        outcome: RunOutcome,
    },
    PlaybackFinished,
    PlaybackPaused,
    PlaybackStopped,
    Collision {
        a: SpriteId,
        b: SpriteId,
        distance: f32,
    },
    QueuesSwapped {
        a: SpriteId,
        b: SpriteId,
        a_had: usize,
        b_had: usize,
    },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notice(message) => write!(f, "notice: {message}"),
            Self::SpriteAdded { name, .. } => write!(f, "welcome {name} to the stage"),
            Self::SpriteRemoved { name, .. } => write!(f, "{name} has left the stage"),
            Self::ActionQueued { sprite_id, label } => write!(f, "added \"{label}\" to {sprite_id}"),
            Self::PlaybackStarted { mode, sprite_count } => {
                write!(f, "show time ({mode:?}, {sprite_count} performers)")
            }
            Self::StepStarted {
                sprite_id,
                index,
                total,
                label,
            } => write!(f, "{sprite_id}: action {}/{total} {label}", index + 1),
            Self::StepFinished { sprite_id, index } => {
                write!(f, "{sprite_id}: action {} done", index + 1)
            }
            Self::QueueAdopted {
                sprite_id,
                queue_len,
            } => write!(f, "{sprite_id} starts over with {queue_len} inherited actions"),
            Self::RunFinished { sprite_id, outcome } => {
                write!(f, "{sprite_id} run finished: {outcome:?}")
            }
            Self::PlaybackFinished => write!(f, "show complete"),
            Self::PlaybackPaused => write!(f, "show paused"),
            Self::PlaybackStopped => write!(f, "show stopped and characters reset"),
            Self::Collision { a, b, distance } => {
                write!(f, "bump! {a} and {b} collided at {distance:.2}px")
            }
            Self::QueuesSwapped { a, b, a_had, b_had } => write!(
                f,
                "swap complete: {a} had {a_had} actions, {b} had {b_had} actions"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub seq: u64,
    pub event: EngineEvent,
}

#[derive(Debug)]
struct EventLogState {
    capacity: usize,
    next_seq: u64,
    recent: VecDeque<LoggedEvent>,
    dropped: u64,
}

/// Bounded ring of recent engine events backing the debug log panel.
#[derive(Debug, Clone)]
pub struct EventLog {
    state: Arc<Mutex<EventLogState>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(crate::config::DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(EventLogState {
                capacity: capacity.max(1),
                next_seq: 0,
                recent: VecDeque::new(),
                dropped: 0,
            })),
        }
    }

    pub fn record(&self, event: EngineEvent) {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq = state.next_seq.saturating_add(1);
        state.recent.push_back(LoggedEvent { seq, event });
        while state.recent.len() > state.capacity {
            state.recent.pop_front();
            state.dropped = state.dropped.saturating_add(1);
        }
    }

    pub fn snapshot(&self) -> Vec<LoggedEvent> {
        self.lock().recent.iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.lock()
            .recent
            .iter()
            .map(|logged| logged.event.clone())
            .collect()
    }

    pub fn count_matching(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.lock()
            .recent
            .iter()
            .filter(|logged| predicate(&logged.event))
            .count()
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> MutexGuard<'_, EventLogState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                if EVENT_LOG_POISON_WARNED
                    .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    warn!("event log lock poisoned; recovered inner value");
                }
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_keeps_most_recent_and_counts_dropped() {
        let log = EventLog::with_capacity(5);
        for index in 0..8 {
            log.record(EngineEvent::StepFinished {
                sprite_id: SpriteId(1),
                index,
            });
        }

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[0].seq, 3);
        assert_eq!(snapshot[4].seq, 7);
        assert_eq!(log.dropped(), 3);
    }

    #[test]
    fn display_renders_one_based_step_numbers() {
        let event = EngineEvent::StepStarted {
            sprite_id: SpriteId(2),
            index: 0,
            total: 3,
            label: "Walk 15 pixels".to_string(),
        };
        assert_eq!(event.to_string(), "#2: action 1/3 Walk 15 pixels");
    }
}
