//! Boundary to the container runtime
//!
//! The interpreter needs exactly three operations from a runtime: start a
//! container, run a script inside it, and stop it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ContainerError, WrciError};

/// Opaque identifier of a started container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full docker ids are 64 hex chars; the short form is what `docker ps` shows.
        let short: String = self.0.chars().take(12).collect();
        write!(f, "{}", short)
    }
}

/// Host directory bound into a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
}

impl Mount {
    pub fn new(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
        }
    }

    /// Prefix a relative host path with `base`
    pub fn absolutize(self, base: &Path) -> Self {
        if self.host.is_absolute() {
            self
        } else {
            Self {
                host: base.join(&self.host),
                container: self.container,
            }
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host.display(), self.container)
    }
}

impl FromStr for Mount {
    type Err = WrciError;

    /// Parse `HOST:CONTAINER`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((host, container)) if !host.is_empty() && !container.is_empty() => {
                Ok(Mount::new(host, container))
            }
            _ => Err(WrciError::InvalidVolume(s.to_string())),
        }
    }
}

/// Everything needed to start a pipeline's container
#[derive(Debug, Clone)]
pub struct StartRequest<'a> {
    /// Owning pipeline, used for labelling only
    pub pipeline: &'a str,
    pub image: &'a str,
    pub command: &'a str,
    pub mounts: &'a [Mount],
}

/// Result of running a script inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    /// stdout followed by stderr
    pub output: String,
}

/// Container runtime capability used by the interpreter
pub trait ContainerRuntime {
    /// Start a detached container and return its handle
    fn start(&self, request: &StartRequest<'_>) -> Result<ContainerHandle, ContainerError>;

    /// Run the script at `path` (a path inside the container) to completion
    fn exec(
        &self,
        handle: &ContainerHandle,
        path: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<ExecOutput, ContainerError>;

    /// Stop and remove the container
    fn stop(&self, handle: &ContainerHandle) -> Result<(), ContainerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_parse() {
        let mount: Mount = "./src:/workspace".parse().unwrap();
        assert_eq!(mount.host, PathBuf::from("./src"));
        assert_eq!(mount.container, "/workspace");
    }

    #[test]
    fn test_mount_parse_invalid() {
        assert!("no-separator".parse::<Mount>().is_err());
        assert!(":/only-container".parse::<Mount>().is_err());
        assert!("/only-host:".parse::<Mount>().is_err());
    }

    #[test]
    fn test_mount_absolutize() {
        let base = Path::new("/home/ci/project");
        let relative = Mount::new(".wrci", "/pipeline").absolutize(base);
        assert_eq!(relative.host, PathBuf::from("/home/ci/project/.wrci"));

        let absolute = Mount::new("/data", "/data").absolutize(base);
        assert_eq!(absolute.host, PathBuf::from("/data"));
    }

    #[test]
    fn test_handle_display_is_short() {
        let handle = ContainerHandle::new("0123456789abcdef0123");
        assert_eq!(handle.to_string(), "0123456789ab");
        assert_eq!(handle.id(), "0123456789abcdef0123");
    }
}
