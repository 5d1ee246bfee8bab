//! Error types for wrci

use std::path::PathBuf;

use thiserror::Error;

use crate::container::ContainerHandle;

/// Process exit code for malformed pipeline files and failed validation.
pub const EXIT_DATA_ERROR: u8 = 65;
/// Process exit code for runtime failures. Fixed, independent of `LAST_RC`.
pub const EXIT_RUNTIME_ERROR: u8 = 70;
/// Process exit code for I/O failures (unreadable pipeline file).
pub const EXIT_IO_ERROR: u8 = 74;
/// Process exit code for everything else.
pub const EXIT_FAILURE: u8 = 1;

/// Syntax or structure error found before anything is executed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Parse error (line {line}): {message}")]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Failure reported by a container runtime.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("{0}")]
    Rejected(String),
}

/// Error that aborts the current run.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("undefined variable '${0}'")]
    UndefinedVariable(String),

    #[error("variable '${0}' is read-only")]
    ReadOnlyVariable(String),

    #[error("invalid script name '{0}'")]
    InvalidScriptName(String),

    #[error("step script not found: {}", path.display())]
    ScriptNotFound { path: PathBuf },

    #[error("step script is not executable: {}", path.display())]
    ScriptNotExecutable { path: PathBuf },

    #[error("no container available for pipeline '{pipeline}'")]
    NoContainer { pipeline: String },

    #[error("failed to start container from image '{image}': {source}")]
    ContainerStart {
        image: String,
        #[source]
        source: ContainerError,
    },

    #[error("failed to run '{script}' in container {container}: {source}")]
    ContainerExec {
        container: ContainerHandle,
        script: String,
        #[source]
        source: ContainerError,
    },

    #[error("interrupted")]
    Interrupted,
}

/// A [`RuntimeError`] located at the statement that raised it.
#[derive(Error, Debug)]
#[error("Execution error in pipeline '{pipeline}' (line {line}): {source}")]
pub struct ExecutionError {
    pub pipeline: String,
    pub line: usize,
    #[source]
    pub source: RuntimeError,
}

impl ExecutionError {
    pub fn new(pipeline: impl Into<String>, line: usize, source: RuntimeError) -> Self {
        Self {
            pipeline: pipeline.into(),
            line,
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum WrciError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid volume '{0}': expected HOST:CONTAINER")]
    InvalidVolume(String),

    #[error("Failed to install interrupt handler: {0}")]
    Signal(String),
}

impl WrciError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            WrciError::Parse(_) | WrciError::Validation(_) => EXIT_DATA_ERROR,
            WrciError::Execution(_) => EXIT_RUNTIME_ERROR,
            WrciError::Read { .. } => EXIT_IO_ERROR,
            WrciError::InvalidVolume(_) | WrciError::Signal(_) => EXIT_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, WrciError>;
