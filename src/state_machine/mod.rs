mod item;
mod state;

pub use item::{ItemStatus, RunOutcome, RunReport, WorkItem};
pub use state::{CallState, StateMachine, StepOutcome, Transition};
