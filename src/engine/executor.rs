//! Statement executor
//!
//! Walks the pipeline tree in document order with one frame per running
//! pipeline. A frame owns its [`Environment`] and [`ContainerScope`] and
//! borrows its parent's, so scoping follows the tree without any shared
//! mutable state besides the lifecycle manager's container stack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::container::{ContainerScope, LifecycleManager, TeardownFailure};
use crate::engine::condition::evaluate;
use crate::engine::step::StepRunner;
use crate::environment::Environment;
use crate::error::{ExecutionError, RuntimeError};
use crate::output::{OutputEvent, OutputSink};
use crate::parser::{Pipeline, Statement, StatementKind};

/// What the caller should do after a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// EXIT was reached; unwind every enclosing frame
    Exit,
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every statement of the root pipeline ran
    Completed,
    /// Stopped early by EXIT
    Exited,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Exited => write!(f, "exited"),
        }
    }
}

/// Summary of a successful run
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub steps_run: usize,
    pub containers_started: usize,
    pub containers_stopped: usize,
    /// Containers that failed to stop; never affects the outcome
    pub teardown_failures: Vec<TeardownFailure>,
}

/// Execution state of one running pipeline
struct Frame<'p> {
    pipeline: &'p Pipeline,
    env: Environment<'p>,
    containers: ContainerScope<'p>,
}

/// Tree-walking interpreter for parsed pipelines
pub struct Executor {
    lifecycle: LifecycleManager,
    steps: StepRunner,
    sink: Box<dyn OutputSink>,
    interrupt: Option<Arc<AtomicBool>>,
    steps_run: usize,
}

impl Executor {
    pub fn new(lifecycle: LifecycleManager, steps: StepRunner, sink: Box<dyn OutputSink>) -> Self {
        Self {
            lifecycle,
            steps,
            sink,
            interrupt: None,
            steps_run: 0,
        }
    }

    /// Abort the run once `flag` is set, checked after every statement
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Run the root pipeline. Every container started during the run is
    /// stopped before this returns, whether the run completes, hits EXIT or
    /// fails.
    pub fn run(&mut self, root: &Pipeline) -> Result<RunReport, ExecutionError> {
        info!(pipeline = %root.name, "running pipeline");
        let result = self.run_frame(root, None);

        let teardown_failures = self.lifecycle.release_all();

        let outcome = match result? {
            Flow::Continue => RunOutcome::Completed,
            Flow::Exit => {
                info!("pipeline stopped by EXIT");
                RunOutcome::Exited
            }
        };

        Ok(RunReport {
            outcome,
            steps_run: self.steps_run,
            containers_started: self.lifecycle.started(),
            containers_stopped: self.lifecycle.stopped(),
            teardown_failures,
        })
    }

    fn run_frame<'p>(
        &mut self,
        pipeline: &'p Pipeline,
        parent: Option<&'p Frame<'p>>,
    ) -> Result<Flow, ExecutionError> {
        let span = info_span!("pipeline", name = %pipeline.name);
        let _entered = span.enter();

        let containers = self
            .lifecycle
            .acquire(pipeline, parent.map(|p| &p.containers))
            .map_err(|source| ExecutionError::new(&pipeline.name, pipeline.line, source))?;

        let mut frame = Frame {
            pipeline,
            env: Environment::for_pipeline(pipeline, parent.map(|p| &p.env)),
            containers,
        };

        let flow = self.run_block(&pipeline.statements, &mut frame)?;

        // On EXIT the driver's release_all tears everything down at once.
        if flow == Flow::Continue {
            self.lifecycle.release(&mut frame.containers);
        }
        Ok(flow)
    }

    fn run_block<'p>(
        &mut self,
        statements: &'p [Statement],
        frame: &mut Frame<'p>,
    ) -> Result<Flow, ExecutionError> {
        for statement in statements {
            if self.run_statement(statement, frame)? == Flow::Exit {
                return Ok(Flow::Exit);
            }
            if self.interrupted() {
                return Err(ExecutionError::new(
                    &frame.pipeline.name,
                    statement.line,
                    RuntimeError::Interrupted,
                ));
            }
        }
        Ok(Flow::Continue)
    }

    fn run_statement<'p>(
        &mut self,
        statement: &'p Statement,
        frame: &mut Frame<'p>,
    ) -> Result<Flow, ExecutionError> {
        let pipeline = frame.pipeline;
        let located =
            |source: RuntimeError| ExecutionError::new(&pipeline.name, statement.line, source);

        match &statement.kind {
            StatementKind::Assign { name, value } => {
                let value = frame.env.interpolate(value).map_err(located)?;
                debug!(variable = %name, %value, "assign");
                frame.env.set(name.as_str(), value).map_err(located)?;
            }
            StatementKind::Step { script } => {
                self.run_step(script, frame).map_err(located)?;
            }
            StatementKind::Msg { text } => {
                let text = frame.env.interpolate(text).map_err(located)?;
                self.sink.emit(OutputEvent::Message { text });
            }
            StatementKind::If(if_stmt) => {
                let taken = evaluate(&if_stmt.condition, &frame.env).map_err(located)?;
                debug!(condition = %if_stmt.condition, taken, "if");

                let branch = if taken {
                    Some(&if_stmt.then_branch)
                } else {
                    if_stmt.else_branch.as_ref()
                };
                if let Some(branch) = branch {
                    return self.run_block(branch, frame);
                }
            }
            StatementKind::Exit => {
                info!(line = statement.line, "EXIT");
                return Ok(Flow::Exit);
            }
            StatementKind::Pipeline(nested) => {
                return self.run_frame(nested, Some(&*frame));
            }
        }
        Ok(Flow::Continue)
    }

    fn run_step(&mut self, script: &str, frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
        let container = self.lifecycle.resolve(&frame.containers)?.clone();
        let resolved = self.steps.locate(&frame.pipeline.name, script)?;
        let env = frame.env.flatten();

        let output = self
            .steps
            .run(self.lifecycle.runtime(), &container, &resolved, &env)?;

        info!(script, %container, exit_code = output.exit_code, "step finished");
        frame.env.record_exit_code(output.exit_code);
        self.steps_run += 1;

        self.sink.emit(OutputEvent::StepOutput {
            pipeline: frame.pipeline.name.clone(),
            script: script.to_string(),
            exit_code: output.exit_code,
            output: output.output,
        });
        Ok(())
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
