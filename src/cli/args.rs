//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::container::{Mount, RuntimeKind, DEFAULT_KEEP_ALIVE};
use crate::engine::{DEFAULT_MOUNT_POINT, DEFAULT_SCRIPT_DIR};

#[derive(Parser, Debug)]
#[command(name = "wrci")]
#[command(author, version, about = "Run container-isolated CI pipelines written in the wrci DSL", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose logging (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Run a pipeline file
    Run {
        /// Path to the pipeline file
        file: PathBuf,

        /// Extra bind mount for every container
        #[arg(short = 'v', long = "volume", value_name = "HOST:CONTAINER")]
        volumes: Vec<Mount>,

        /// Container runtime to drive
        #[arg(long, value_enum, env = "WRCI_RUNTIME", default_value_t = RuntimeKind::Docker)]
        runtime: RuntimeKind,

        /// Host directory holding <pipeline>/<script> files
        #[arg(long, env = "WRCI_SCRIPT_DIR", default_value = DEFAULT_SCRIPT_DIR)]
        script_dir: PathBuf,

        /// Where the script directory is mounted inside containers
        #[arg(long, env = "WRCI_MOUNT_POINT", default_value = DEFAULT_MOUNT_POINT)]
        mount_point: String,

        /// Start command for pipelines without start_command
        #[arg(long, env = "WRCI_KEEP_ALIVE", default_value = DEFAULT_KEEP_ALIVE)]
        keep_alive: String,

        /// Record container operations instead of running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse and validate a pipeline file without running it
    Check {
        /// Path to the pipeline file
        file: PathBuf,

        /// Host directory holding <pipeline>/<script> files
        #[arg(long, env = "WRCI_SCRIPT_DIR", default_value = DEFAULT_SCRIPT_DIR)]
        script_dir: PathBuf,
    },

    /// Print an outline of a pipeline file
    Explain {
        /// Path to the pipeline file
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_volumes() {
        let args = Args::try_parse_from([
            "wrci",
            "run",
            "ci.wrci",
            "-v",
            "/cache:/root/.cache",
            "--volume",
            "src:/src",
            "--runtime",
            "podman",
            "--dry-run",
        ])
        .unwrap();

        match args.command {
            SubCommand::Run {
                file,
                volumes,
                runtime,
                dry_run,
                ..
            } => {
                assert_eq!(file, PathBuf::from("ci.wrci"));
                assert_eq!(
                    volumes,
                    vec![
                        Mount::new("/cache", "/root/.cache"),
                        Mount::new("src", "/src")
                    ]
                );
                assert_eq!(runtime, RuntimeKind::Podman);
                assert!(dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_volume_rejected() {
        assert!(Args::try_parse_from(["wrci", "run", "ci.wrci", "-v", "nocolon"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["wrci", "explain", "ci.wrci", "--json"]).unwrap();
        assert!(args.json);
        assert!(matches!(args.command, SubCommand::Explain { .. }));
    }
}
