mod coordinator;
mod runner;

pub use coordinator::{PlayMode, PlaybackCoordinator, PlaybackReport};
pub use runner::{CancelFlag, RunOutcome, SequenceRunner};
