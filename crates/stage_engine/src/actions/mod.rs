mod descriptor;
mod interpreter;

pub use descriptor::{ActionDescriptor, MoveDirection};
pub use interpreter::{
    ActionEffect, ActionInterpreter, ExecOutcome, FollowUp, StepControl, Uninterrupted,
};
