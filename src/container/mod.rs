//! Container lifecycle for pipeline execution
//!
//! Pipelines that declare `helper_image` get their own container; every
//! other pipeline runs its steps in the nearest ancestor's container.
//! - `runtime`: the three-operation boundary to a container runtime
//! - `manager`: starts, tracks and tears down containers
//! - `cli`, `recording`: runtime implementations

mod cli;
mod manager;
mod recording;
mod runtime;
mod scope;

pub use cli::{CliRuntime, RuntimeKind, PIPELINE_LABEL};
pub use manager::{LifecycleManager, TeardownFailure, DEFAULT_KEEP_ALIVE};
pub use recording::{RecordedExec, RecordedStart, RecordingRuntime, RuntimeCall};
pub use runtime::{ContainerHandle, ContainerRuntime, ExecOutput, Mount, StartRequest};
pub use scope::ContainerScope;
