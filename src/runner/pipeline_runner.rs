//! Pipeline runner for executing .wrci files

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{info, warn};

use crate::container::{ContainerRuntime, LifecycleManager, Mount, DEFAULT_KEEP_ALIVE};
use crate::engine::{Executor, RunReport, StepRunner, DEFAULT_MOUNT_POINT, DEFAULT_SCRIPT_DIR};
use crate::error::{Result, WrciError};
use crate::output::OutputSink;
use crate::parser::{parse_pipeline, Pipeline};
use crate::runner::validator::{
    has_errors, validate_pipeline, ValidationOptions, ValidationSeverity, DEFAULT_MAX_NESTING_DEPTH,
};

/// Settings for one pipeline run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Host directory holding `<pipeline>/<script>` files
    pub script_dir: PathBuf,
    /// Where `script_dir` is mounted inside containers
    pub mount_point: String,
    /// Extra bind mounts for every container
    pub volumes: Vec<Mount>,
    /// Start command for pipelines that do not set `start_command`
    pub keep_alive: String,
    pub max_nesting_depth: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            script_dir: PathBuf::from(DEFAULT_SCRIPT_DIR),
            mount_point: DEFAULT_MOUNT_POINT.to_string(),
            volumes: Vec::new(),
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl RunConfig {
    /// Bind mounts for every container: user volumes plus the script
    /// directory, unless a user volume already targets the mount point.
    pub fn mounts(&self) -> Vec<Mount> {
        let mut mounts = self.volumes.clone();
        let taken = mounts
            .iter()
            .any(|mount| mount.container.trim_end_matches('/') == self.mount_point.trim_end_matches('/'));
        if !taken {
            mounts.push(Mount::new(self.script_dir.clone(), self.mount_point.clone()));
        }
        mounts
    }

    /// Resolve relative host paths against `base`
    pub fn absolutize(mut self, base: &Path) -> Self {
        if self.script_dir.is_relative() {
            self.script_dir = base.join(&self.script_dir);
        }
        self.volumes = self
            .volumes
            .into_iter()
            .map(|mount| mount.absolutize(base))
            .collect();
        self
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            max_nesting_depth: self.max_nesting_depth,
            script_dir: Some(self.script_dir.clone()),
        }
    }
}

/// Loads, validates and executes pipelines
pub struct PipelineRunner {
    config: RunConfig,
    runtime: Box<dyn ContainerRuntime>,
    sink: Box<dyn OutputSink>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl PipelineRunner {
    pub fn new(config: RunConfig, runtime: Box<dyn ContainerRuntime>, sink: Box<dyn OutputSink>) -> Self {
        Self {
            config,
            runtime,
            sink,
            interrupt: None,
        }
    }

    /// Abort the run once `flag` is set
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Load and run a pipeline file
    pub fn run_file(self, path: &Path) -> Result<RunReport> {
        let source = fs::read_to_string(path).map_err(|source| WrciError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.run_source(&source)
    }

    /// Parse and run pipeline source text
    pub fn run_source(self, source: &str) -> Result<RunReport> {
        let root = parse_pipeline(source)?;
        self.run_pipeline(&root)
    }

    /// Validate and run a parsed pipeline
    pub fn run_pipeline(self, root: &Pipeline) -> Result<RunReport> {
        let issues = validate_pipeline(root, &self.config.validation_options());
        for issue in issues
            .iter()
            .filter(|issue| issue.severity == ValidationSeverity::Warning)
        {
            warn!(line = issue.line, "{}", issue.message);
        }
        if has_errors(&issues) {
            let errors: Vec<String> = issues
                .iter()
                .filter(|issue| issue.severity == ValidationSeverity::Error)
                .map(ToString::to_string)
                .collect();
            return Err(WrciError::Validation(errors.join("; ")));
        }

        let lifecycle = LifecycleManager::new(self.runtime)
            .with_mounts(self.config.mounts())
            .with_keep_alive(self.config.keep_alive.clone());
        let steps = StepRunner::new(self.config.script_dir.clone(), self.config.mount_point.clone());

        let mut executor = Executor::new(lifecycle, steps, self.sink);
        if let Some(flag) = self.interrupt {
            executor = executor.with_interrupt(flag);
        }

        let report = executor.run(root)?;
        info!(
            outcome = %report.outcome,
            steps = report.steps_run,
            containers = report.containers_started,
            "run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::RecordingRuntime;
    use crate::engine::RunOutcome;
    use crate::output::CapturedOutput;

    fn runner(config: RunConfig, runtime: &RecordingRuntime, output: &CapturedOutput) -> PipelineRunner {
        PipelineRunner::new(config, Box::new(runtime.clone()), Box::new(output.clone()))
    }

    #[test]
    fn test_script_dir_is_mounted_by_default() {
        let config = RunConfig {
            script_dir: PathBuf::from("/srv/ci"),
            volumes: vec![Mount::new("/cache", "/root/.cache")],
            ..Default::default()
        };
        assert_eq!(
            config.mounts(),
            vec![
                Mount::new("/cache", "/root/.cache"),
                Mount::new("/srv/ci", "/pipeline"),
            ]
        );
    }

    #[test]
    fn test_user_volume_replaces_script_mount() {
        let config = RunConfig {
            volumes: vec![Mount::new("/elsewhere", "/pipeline/")],
            ..Default::default()
        };
        assert_eq!(config.mounts(), vec![Mount::new("/elsewhere", "/pipeline/")]);
    }

    #[test]
    fn test_absolutize_relative_paths() {
        let config = RunConfig {
            volumes: vec![Mount::new("cache", "/cache")],
            ..Default::default()
        }
        .absolutize(Path::new("/work"));
        assert_eq!(config.script_dir, PathBuf::from("/work/.wrci"));
        assert_eq!(config.volumes[0].host, PathBuf::from("/work/cache"));
    }

    #[test]
    fn test_run_source_applies_mounts_and_keep_alive() {
        let runtime = RecordingRuntime::new();
        let output = CapturedOutput::new();
        let config = RunConfig {
            script_dir: PathBuf::from("/srv/ci"),
            keep_alive: "sleep infinity".to_string(),
            ..Default::default()
        };

        let report = runner(config, &runtime, &output)
            .run_source("PIPELINE(name=\"p\", helper_image=\"img\")\nMSG(\"hi\")\nEND")
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(output.messages(), vec!["hi"]);

        let starts = runtime.starts();
        assert_eq!(starts[0].command, "sleep infinity");
        assert_eq!(starts[0].mounts, vec![Mount::new("/srv/ci", "/pipeline")]);
    }

    #[test]
    fn test_validation_error_aborts_before_start() {
        let runtime = RecordingRuntime::new();
        let output = CapturedOutput::new();
        let config = RunConfig {
            max_nesting_depth: 0,
            ..Default::default()
        };

        let err = runner(config, &runtime, &output)
            .run_source(
                "PIPELINE(name=\"p\", helper_image=\"img\")\nPIPELINE(name=\"c\")\nEND\nEND",
            )
            .unwrap_err();
        assert!(matches!(err, WrciError::Validation(_)));
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn test_parse_error_propagates() {
        let runtime = RecordingRuntime::new();
        let output = CapturedOutput::new();
        let err = runner(RunConfig::default(), &runtime, &output)
            .run_source("PIPELINE(name=\"p\")\nEND")
            .unwrap_err();
        assert!(matches!(err, WrciError::Parse(_)));
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn test_run_file_missing() {
        let runtime = RecordingRuntime::new();
        let output = CapturedOutput::new();
        let err = runner(RunConfig::default(), &runtime, &output)
            .run_file(Path::new("/nonexistent/pipeline.wrci"))
            .unwrap_err();
        assert!(matches!(err, WrciError::Read { .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_IO_ERROR);
    }
}
