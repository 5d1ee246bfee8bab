//! Docker/Podman runtime driven through the command-line client

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Output};

use tracing::debug;

use super::runtime::{ContainerHandle, ContainerRuntime, ExecOutput, StartRequest};
use crate::error::ContainerError;

/// Label attached to every container started by wrci
pub const PIPELINE_LABEL: &str = "wrci.pipeline";

/// Exit status docker and podman report for their own failures
const CLIENT_FAILURE_STATUS: i32 = 125;

/// Client stderr that means the exec never reached the script
const CLIENT_ERROR_MARKERS: [&str; 3] = [
    "Error response from daemon",
    "OCI runtime exec failed",
    "no such container",
];

/// Which container client to invoke
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RuntimeKind {
    #[default]
    Docker,
    Podman,
}

impl RuntimeKind {
    pub fn program(&self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program())
    }
}

/// Runs containers through `docker` or `podman`
#[derive(Debug, Clone)]
pub struct CliRuntime {
    kind: RuntimeKind,
    program: PathBuf,
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::new(RuntimeKind::default())
    }
}

impl CliRuntime {
    pub fn new(kind: RuntimeKind) -> Self {
        Self {
            kind,
            program: PathBuf::from(kind.program()),
        }
    }

    /// Invoke a different client binary speaking the same CLI
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// Run a client command, failing on spawn errors only
    fn output(&self, mut command: Command) -> Result<Output, ContainerError> {
        debug!(?command, "invoking container client");
        command.output().map_err(|source| ContainerError::Spawn {
            program: self.program.display().to_string(),
            source,
        })
    }

    fn failure(&self, action: &str, output: &Output) -> ContainerError {
        ContainerError::CommandFailed {
            command: format!("{} {}", self.kind.program(), action),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Run a client command that must succeed
    fn checked(&self, command: Command, action: &str) -> Result<Output, ContainerError> {
        let output = self.output(command)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(self.failure(action, &output))
        }
    }
}

/// Whether a failed exec is the client's own error rather than the script's
/// exit status
fn client_failed(output: &Output) -> bool {
    if output.status.code() == Some(CLIENT_FAILURE_STATUS) {
        return true;
    }
    if output.status.success() || !output.stdout.is_empty() {
        return false;
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    CLIENT_ERROR_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}

/// Start arguments: detached, auto-removed, labelled, with bind mounts
fn run_args(request: &StartRequest<'_>) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--rm".to_string(),
        "--label".to_string(),
        format!("{}={}", PIPELINE_LABEL, request.pipeline),
    ];
    for mount in request.mounts {
        args.push("-v".to_string());
        args.push(mount.to_string());
    }
    args.push(request.image.to_string());
    args.extend(["/bin/sh".to_string(), "-c".to_string(), request.command.to_string()]);
    args
}

fn exec_args(handle: &ContainerHandle, path: &str, env: &BTreeMap<String, String>) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    // The script is executable, so it runs directly and its path stays one
    // argument even with spaces in it.
    args.push(handle.id().to_string());
    args.push(path.to_string());
    args
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

impl ContainerRuntime for CliRuntime {
    fn start(&self, request: &StartRequest<'_>) -> Result<ContainerHandle, ContainerError> {
        let mut command = self.command();
        command.args(run_args(request));
        let output = self.checked(command, "run")?;

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ContainerError::Rejected(format!(
                "{} run printed no container id",
                self.kind
            )));
        }
        Ok(ContainerHandle::new(id))
    }

    fn exec(
        &self,
        handle: &ContainerHandle,
        path: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<ExecOutput, ContainerError> {
        let mut command = self.command();
        command.args(exec_args(handle, path, env));
        let output = self.output(command)?;
        if client_failed(&output) {
            return Err(self.failure("exec", &output));
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ExecOutput {
            exit_code: exit_code(output.status),
            output: combined,
        })
    }

    fn stop(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        let mut command = self.command();
        command.args(["rm", "-f", handle.id()]);
        self.checked(command, "rm -f").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Mount;

    #[test]
    fn test_run_args() {
        let mounts = vec![Mount::new("/host/.wrci", "/pipeline")];
        let request = StartRequest {
            pipeline: "build",
            image: "alpine:3",
            command: "tail -f /dev/null",
            mounts: &mounts,
        };
        assert_eq!(
            run_args(&request),
            vec![
                "run",
                "-d",
                "--rm",
                "--label",
                "wrci.pipeline=build",
                "-v",
                "/host/.wrci:/pipeline",
                "alpine:3",
                "/bin/sh",
                "-c",
                "tail -f /dev/null",
            ]
        );
    }

    #[test]
    fn test_exec_args_export_env() {
        let mut env = BTreeMap::new();
        env.insert("LAST_RC".to_string(), "0".to_string());
        env.insert("arch".to_string(), "armv7".to_string());
        let args = exec_args(&ContainerHandle::new("abc"), "/pipeline/p/s.sh", &env);
        assert_eq!(
            args,
            vec![
                "exec",
                "-e",
                "LAST_RC=0",
                "-e",
                "arch=armv7",
                "abc",
                "/pipeline/p/s.sh",
            ]
        );
    }

    #[test]
    fn test_exec_args_keep_spaced_path_whole() {
        let args = exec_args(&ContainerHandle::new("abc"), "/pipeline/my build/s.sh", &BTreeMap::new());
        assert_eq!(args, vec!["exec", "abc", "/pipeline/my build/s.sh"]);
    }

    #[test]
    fn test_runtime_programs() {
        assert_eq!(RuntimeKind::Docker.program(), "docker");
        assert_eq!(RuntimeKind::Podman.to_string(), "podman");
    }

    #[cfg(unix)]
    mod fake_client {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use tempfile::TempDir;

        fn write_executable(path: &Path, body: &str) {
            fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        /// A client whose `exec` runs the requested command on the host
        fn host_exec_client(dir: &Path) -> CliRuntime {
            let client = dir.join("fake-docker");
            write_executable(
                &client,
                r#"[ "$1" = exec ] || exit 0
shift
while [ "$1" = "-e" ]; do shift 2; done
shift
exec "$@""#,
            );
            CliRuntime::new(RuntimeKind::Docker).with_program(client)
        }

        fn failing_client(dir: &Path, body: &str) -> CliRuntime {
            let client = dir.join("fake-docker");
            write_executable(&client, body);
            CliRuntime::new(RuntimeKind::Docker).with_program(client)
        }

        #[test]
        fn test_exec_script_under_spaced_directory() {
            let temp = TempDir::new().unwrap();
            let dir = temp.path().join("my build");
            fs::create_dir_all(&dir).unwrap();
            let script = dir.join("s.sh");
            write_executable(&script, "echo ran\nexit 3");

            let runtime = host_exec_client(temp.path());
            let output = runtime
                .exec(
                    &ContainerHandle::new("abc"),
                    &script.display().to_string(),
                    &BTreeMap::new(),
                )
                .unwrap();
            assert_eq!(output.exit_code, 3);
            assert_eq!(output.output, "ran\n");
        }

        #[test]
        fn test_exec_daemon_error_is_a_container_error() {
            let temp = TempDir::new().unwrap();
            let runtime = failing_client(
                temp.path(),
                "echo 'Error response from daemon: No such container: abc' >&2\nexit 1",
            );
            let err = runtime
                .exec(&ContainerHandle::new("abc"), "/pipeline/p/s.sh", &BTreeMap::new())
                .unwrap_err();
            match err {
                ContainerError::CommandFailed { status, stderr, .. } => {
                    assert_eq!(status, 1);
                    assert!(stderr.contains("No such container"));
                }
                other => panic!("expected CommandFailed, got {:?}", other),
            }
        }

        #[test]
        fn test_exec_client_status_125_is_a_container_error() {
            let temp = TempDir::new().unwrap();
            let runtime = failing_client(temp.path(), "echo 'Error: container state improper' >&2\nexit 125");
            assert!(matches!(
                runtime.exec(&ContainerHandle::new("abc"), "/pipeline/p/s.sh", &BTreeMap::new()),
                Err(ContainerError::CommandFailed { status: 125, .. })
            ));
        }

        #[test]
        fn test_script_failure_is_an_exit_code() {
            let temp = TempDir::new().unwrap();
            let runtime = failing_client(temp.path(), "echo 'make: *** [all] Error 2' >&2\nexit 2");
            let output = runtime
                .exec(&ContainerHandle::new("abc"), "/pipeline/p/s.sh", &BTreeMap::new())
                .unwrap();
            assert_eq!(output.exit_code, 2);
            assert!(output.output.contains("Error 2"));
        }

        #[test]
        fn test_missing_client_is_a_spawn_error() {
            let runtime = CliRuntime::new(RuntimeKind::Podman).with_program("/nonexistent/podman");
            assert!(matches!(
                runtime.stop(&ContainerHandle::new("abc")),
                Err(ContainerError::Spawn { .. })
            ));
        }
    }
}
