//! Container lifecycle manager
//!
//! Starts a container for every pipeline that declares `helper_image`,
//! tracks every running container on a LIFO stack, and guarantees teardown.
//! Frames that finish normally release their own container; EXIT, runtime
//! errors and interrupts skip that, so the driver drains whatever is left
//! with [`LifecycleManager::release_all`].

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::runtime::{ContainerHandle, ContainerRuntime, Mount, StartRequest};
use super::scope::ContainerScope;
use crate::error::{ContainerError, RuntimeError};
use crate::parser::Pipeline;

/// Default command that keeps a container alive between steps
pub const DEFAULT_KEEP_ALIVE: &str = "tail -f /dev/null";

/// A container started by this run and not yet stopped
#[derive(Debug, Clone)]
struct ActiveContainer {
    handle: ContainerHandle,
    pipeline: String,
    image: String,
    started_at: DateTime<Utc>,
}

/// A container that could not be stopped cleanly
#[derive(Debug)]
pub struct TeardownFailure {
    pub handle: ContainerHandle,
    pub pipeline: String,
    pub error: ContainerError,
}

impl std::fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "container {} of pipeline '{}': {}",
            self.handle, self.pipeline, self.error
        )
    }
}

/// Owns the runtime and the stack of active containers
pub struct LifecycleManager {
    runtime: Box<dyn ContainerRuntime>,
    mounts: Vec<Mount>,
    keep_alive: String,
    /// Most recently started last
    active: Vec<ActiveContainer>,
    failures: Vec<TeardownFailure>,
    started: usize,
    stopped: usize,
}

impl LifecycleManager {
    pub fn new(runtime: Box<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            mounts: Vec::new(),
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
            active: Vec::new(),
            failures: Vec::new(),
            started: 0,
            stopped: 0,
        }
    }

    /// Bind mounts passed to every started container
    pub fn with_mounts(mut self, mounts: Vec<Mount>) -> Self {
        self.mounts = mounts;
        self
    }

    /// Command used when a pipeline declares no `start_command`
    pub fn with_keep_alive(mut self, command: impl Into<String>) -> Self {
        self.keep_alive = command.into();
        self
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    /// Create the container scope for a pipeline frame, starting the
    /// pipeline's own container if it declares `helper_image`.
    pub fn acquire<'p>(
        &mut self,
        pipeline: &Pipeline,
        parent: Option<&'p ContainerScope<'p>>,
    ) -> Result<ContainerScope<'p>, RuntimeError> {
        let Some(image) = pipeline.helper_image.as_deref() else {
            debug!(pipeline = %pipeline.name, "no helper_image, using ancestor container");
            return Ok(ContainerScope::new(&pipeline.name, None, parent));
        };

        let command = pipeline.start_command.as_deref().unwrap_or(&self.keep_alive);
        let request = StartRequest {
            pipeline: &pipeline.name,
            image,
            command,
            mounts: &self.mounts,
        };

        let handle = self
            .runtime
            .start(&request)
            .map_err(|source| RuntimeError::ContainerStart {
                image: image.to_string(),
                source,
            })?;

        info!(pipeline = %pipeline.name, image, container = %handle, "container started");

        self.started += 1;
        self.active.push(ActiveContainer {
            handle: handle.clone(),
            pipeline: pipeline.name.clone(),
            image: image.to_string(),
            started_at: Utc::now(),
        });

        Ok(ContainerScope::new(&pipeline.name, Some(handle), parent))
    }

    /// Container a STEP in this scope runs in
    pub fn resolve<'s>(&self, scope: &'s ContainerScope<'_>) -> Result<&'s ContainerHandle, RuntimeError> {
        scope.nearest().ok_or_else(|| RuntimeError::NoContainer {
            pipeline: scope.pipeline().to_string(),
        })
    }

    /// Stop the container owned by `scope`, if it still owns one
    pub fn release(&mut self, scope: &mut ContainerScope<'_>) {
        let Some(handle) = scope.take_owned() else {
            return;
        };

        match self.active.iter().rposition(|c| c.handle == handle) {
            Some(index) => {
                let container = self.active.remove(index);
                self.stop(container);
            }
            None => debug!(container = %handle, "container already released"),
        }
    }

    /// Stop every active container, innermost first, and return every
    /// teardown failure recorded during the run.
    pub fn release_all(&mut self) -> Vec<TeardownFailure> {
        if !self.active.is_empty() {
            info!(count = self.active.len(), "stopping remaining containers");
        }
        while let Some(container) = self.active.pop() {
            self.stop(container);
        }
        std::mem::take(&mut self.failures)
    }

    fn stop(&mut self, container: ActiveContainer) {
        let uptime = Utc::now() - container.started_at;
        match self.runtime.stop(&container.handle) {
            Ok(()) => {
                info!(
                    pipeline = %container.pipeline,
                    image = %container.image,
                    container = %container.handle,
                    uptime_ms = uptime.num_milliseconds(),
                    "container stopped"
                );
            }
            Err(error) => {
                warn!(
                    pipeline = %container.pipeline,
                    container = %container.handle,
                    %error,
                    "failed to stop container"
                );
                self.failures.push(TeardownFailure {
                    handle: container.handle,
                    pipeline: container.pipeline,
                    error,
                });
            }
        }
        self.stopped += 1;
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Containers started so far
    pub fn started(&self) -> usize {
        self.started
    }

    /// Containers torn down so far, including failed stops
    pub fn stopped(&self) -> usize {
        self.stopped
    }
}
