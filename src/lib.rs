//! wrci - a small DSL for container-isolated CI pipelines
//!
//! A pipeline file declares a tree of pipelines. Each pipeline may run in
//! its own container (`helper_image`) and executes STEP scripts, messages,
//! variable assignments and conditionals in document order.
//!
//! # Example
//!
//! ```no_run
//! use wrci::{CapturedOutput, PipelineRunner, RecordingRuntime, RunConfig};
//!
//! let source = r#"
//! PIPELINE(name="p", helper_image="alpine:3")
//!     $arch = "armv7"
//!     IF $arch == "armv7": MSG("building for $arch") END
//! END
//! "#;
//!
//! let output = CapturedOutput::new();
//! let runner = PipelineRunner::new(
//!     RunConfig::default(),
//!     Box::new(RecordingRuntime::new()),
//!     Box::new(output.clone()),
//! );
//! let report = runner.run_source(source).unwrap();
//! println!("{} ({} containers)", report.outcome, report.containers_started);
//! ```

pub mod cli;
pub mod container;
pub mod engine;
pub mod environment;
pub mod error;
pub mod logging;
pub mod output;
pub mod parser;
pub mod runner;

pub use container::{CliRuntime, ContainerRuntime, LifecycleManager, RecordingRuntime, RuntimeKind};
pub use engine::{Executor, RunOutcome, RunReport, StepRunner};
pub use environment::Environment;
pub use error::{ExecutionError, ParseError, Result, RuntimeError, WrciError};
pub use output::{CapturedOutput, ConsoleSink, OutputEvent, OutputFormat, OutputSink};
pub use parser::{parse_pipeline, Pipeline, Statement, StatementKind};
pub use runner::{explain_pipeline, validate_pipeline, PipelineRunner, RunConfig};
