//! Execution engine for parsed pipelines

pub mod condition;
pub mod executor;
pub mod step;

pub use executor::{Executor, Flow, RunOutcome, RunReport};
pub use step::{ResolvedScript, StepRunner, DEFAULT_MOUNT_POINT, DEFAULT_SCRIPT_DIR};
