//! Pipeline file handling for wrci
//!
//! Loads, validates, explains and executes .wrci pipeline files.

pub mod explain;
pub mod pipeline_runner;
pub mod validator;

pub use explain::explain_pipeline;
pub use pipeline_runner::{PipelineRunner, RunConfig};
pub use validator::{
    has_errors, has_warnings, validate_pipeline, ValidationIssue, ValidationOptions, ValidationSeverity,
    DEFAULT_MAX_NESTING_DEPTH,
};
