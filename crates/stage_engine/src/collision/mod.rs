mod monitor;
mod swap;

pub use monitor::{
    detect_collisions, CollisionEvent, CollisionListener, CollisionMonitor, MonitorHandle,
};
pub use swap::{SwapHandler, SwapOutcome};
