//! STEP script lookup and execution
//!
//! Scripts live on the host at `<script-dir>/<pipeline>/<script>` and are
//! bind-mounted into every container at `<mount-point>`, so the same file is
//! visible inside the container at `<mount-point>/<pipeline>/<script>`.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::container::{ContainerHandle, ContainerRuntime, ExecOutput, Mount};
use crate::error::RuntimeError;

/// Default host directory holding per-pipeline script directories
pub const DEFAULT_SCRIPT_DIR: &str = ".wrci";
/// Default container path the script directory is mounted at
pub const DEFAULT_MOUNT_POINT: &str = "/pipeline";

/// A STEP script that passed the host-side checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    pub host_path: PathBuf,
    pub container_path: String,
}

/// Finds and runs STEP scripts
#[derive(Debug, Clone)]
pub struct StepRunner {
    script_dir: PathBuf,
    mount_point: String,
}

impl Default for StepRunner {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_DIR, DEFAULT_MOUNT_POINT)
    }
}

impl StepRunner {
    pub fn new(script_dir: impl Into<PathBuf>, mount_point: impl Into<String>) -> Self {
        Self {
            script_dir: script_dir.into(),
            mount_point: mount_point.into(),
        }
    }

    /// Bind mount that exposes the script directory inside containers
    pub fn script_mount(&self) -> Mount {
        Mount::new(self.script_dir.clone(), self.mount_point.clone())
    }

    /// Check that `script` exists for `pipeline` and is executable
    pub fn locate(&self, pipeline: &str, script: &str) -> Result<ResolvedScript, RuntimeError> {
        let relative = Path::new(script);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if script.is_empty() || !plain {
            return Err(RuntimeError::InvalidScriptName(script.to_string()));
        }

        let host_path = self.script_dir.join(pipeline).join(relative);
        if !host_path.is_file() {
            return Err(RuntimeError::ScriptNotFound { path: host_path });
        }
        if !is_executable(&host_path) {
            return Err(RuntimeError::ScriptNotExecutable { path: host_path });
        }

        let container_path = format!(
            "{}/{}/{}",
            self.mount_point.trim_end_matches('/'),
            pipeline,
            script
        );
        Ok(ResolvedScript {
            host_path,
            container_path,
        })
    }

    /// Run a located script inside `container` with `env` exported
    pub fn run(
        &self,
        runtime: &dyn ContainerRuntime,
        container: &ContainerHandle,
        script: &ResolvedScript,
        env: &BTreeMap<String, String>,
    ) -> Result<ExecOutput, RuntimeError> {
        debug!(path = %script.container_path, %container, vars = env.len(), "executing step");
        runtime
            .exec(container, &script.container_path, env)
            .map_err(|source| RuntimeError::ContainerExec {
                container: container.clone(),
                script: script.container_path.clone(),
                source,
            })
    }
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|metadata| metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}
