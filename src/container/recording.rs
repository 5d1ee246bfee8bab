//! In-memory container runtime
//!
//! Records every call instead of touching a real runtime. Backs `--dry-run`
//! and gives tests a deterministic runtime whose exit codes and failures
//! can be scripted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use super::runtime::{ContainerHandle, ContainerRuntime, ExecOutput, Mount, StartRequest};
use crate::error::ContainerError;

/// A recorded `start` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStart {
    pub handle: ContainerHandle,
    pub pipeline: String,
    pub image: String,
    pub command: String,
    pub mounts: Vec<Mount>,
}

/// A recorded `exec` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedExec {
    pub handle: ContainerHandle,
    pub path: String,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Start(RecordedStart),
    Exec(RecordedExec),
    Stop(ContainerHandle),
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<RuntimeCall>,
    next_id: usize,
    /// Keyed by script file name
    exit_codes: HashMap<String, i32>,
    failing_images: HashSet<String>,
    fail_stops: bool,
}

/// Container runtime that only records what it is asked to do
///
/// Clones share state, so a test can keep one clone and hand another to the
/// interpreter.
#[derive(Debug, Clone, Default)]
pub struct RecordingRuntime {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make scripts with this file name exit with `code` (default 0)
    pub fn with_exit_code(self, script: impl Into<String>, code: i32) -> Self {
        self.lock().exit_codes.insert(script.into(), code);
        self
    }

    /// Refuse to start containers from `image`
    pub fn fail_start(self, image: impl Into<String>) -> Self {
        self.lock().failing_images.insert(image.into());
        self
    }

    /// Make every `stop` report an error (the container still counts as stopped)
    pub fn fail_stops(self) -> Self {
        self.lock().fail_stops = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call, in order
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    pub fn starts(&self) -> Vec<RecordedStart> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::Start(start) => Some(start),
                _ => None,
            })
            .collect()
    }

    pub fn execs(&self) -> Vec<RecordedExec> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::Exec(exec) => Some(exec),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<ContainerHandle> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::Stop(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }
}

impl ContainerRuntime for RecordingRuntime {
    fn start(&self, request: &StartRequest<'_>) -> Result<ContainerHandle, ContainerError> {
        let mut state = self.lock();
        if state.failing_images.contains(request.image) {
            return Err(ContainerError::Rejected(format!(
                "image '{}' is configured to fail",
                request.image
            )));
        }

        state.next_id += 1;
        let handle = ContainerHandle::new(format!("recorded-{}-{}", state.next_id, request.pipeline));
        info!(image = request.image, command = request.command, container = %handle, "recording start");

        state.calls.push(RuntimeCall::Start(RecordedStart {
            handle: handle.clone(),
            pipeline: request.pipeline.to_string(),
            image: request.image.to_string(),
            command: request.command.to_string(),
            mounts: request.mounts.to_vec(),
        }));
        Ok(handle)
    }

    fn exec(
        &self,
        handle: &ContainerHandle,
        path: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<ExecOutput, ContainerError> {
        let mut state = self.lock();
        let script = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let exit_code = state.exit_codes.get(&script).copied().unwrap_or(0);
        info!(container = %handle, path, exit_code, "recording exec");

        state.calls.push(RuntimeCall::Exec(RecordedExec {
            handle: handle.clone(),
            path: path.to_string(),
            env: env.clone(),
        }));
        Ok(ExecOutput {
            exit_code,
            output: String::new(),
        })
    }

    fn stop(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        let mut state = self.lock();
        info!(container = %handle, "recording stop");
        state.calls.push(RuntimeCall::Stop(handle.clone()));
        if state.fail_stops {
            return Err(ContainerError::Rejected(format!(
                "stop of {} is configured to fail",
                handle
            )));
        }
        Ok(())
    }
}
