mod events;
mod runner;
mod steps;

pub use events::{RunEvent, RunStatus};
pub use runner::{RunEmitter, RunPlan, expand_master, run_plan};
