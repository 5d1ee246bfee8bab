//! wrci CLI - run container-isolated CI pipelines

use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::warn;

use wrci::cli::{Args, SubCommand};
use wrci::container::{CliRuntime, ContainerRuntime, RecordingRuntime};
use wrci::error::{WrciError, EXIT_FAILURE};
use wrci::logging::init_logging;
use wrci::output::{ConsoleSink, OutputFormat};
use wrci::parser::{parse_pipeline, Pipeline};
use wrci::runner::{
    explain_pipeline, has_errors, validate_pipeline, PipelineRunner, RunConfig, ValidationOptions,
    ValidationSeverity,
};

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            let code = e
                .downcast_ref::<WrciError>()
                .map(WrciError::exit_code)
                .unwrap_or(EXIT_FAILURE);
            ExitCode::from(code)
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let output_format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match args.command {
        SubCommand::Run {
            file,
            volumes,
            runtime,
            script_dir,
            mount_point,
            keep_alive,
            dry_run,
        } => {
            let cwd = std::env::current_dir().context("Failed to determine current directory")?;
            let config = RunConfig {
                script_dir,
                mount_point,
                volumes,
                keep_alive,
                ..Default::default()
            }
            .absolutize(&cwd);

            let runtime: Box<dyn ContainerRuntime> = if dry_run {
                Box::new(RecordingRuntime::new())
            } else {
                Box::new(CliRuntime::new(runtime))
            };

            let interrupted = Arc::new(AtomicBool::new(false));
            let flag = interrupted.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
                .map_err(|e| WrciError::Signal(e.to_string()))?;

            let report = PipelineRunner::new(config, runtime, Box::new(ConsoleSink::new(output_format)))
                .with_interrupt(interrupted)
                .run_file(&file)?;

            for failure in &report.teardown_failures {
                eprintln!("Warning: {}", failure);
            }
            if args.verbose {
                eprintln!(
                    "\n--- Pipeline {}: {} steps, {} containers started, {} stopped ---",
                    report.outcome, report.steps_run, report.containers_started, report.containers_stopped
                );
            }
            Ok(())
        }

        SubCommand::Check { file, script_dir } => {
            let root = load(&file)?;
            let cwd = std::env::current_dir().context("Failed to determine current directory")?;
            let options = ValidationOptions {
                script_dir: Some(cwd.join(script_dir)),
                ..Default::default()
            };

            let issues = validate_pipeline(&root, &options);
            if args.json {
                let report = serde_json::json!({
                    "pipeline": root.name,
                    "valid": !has_errors(&issues),
                    "issues": issues,
                });
                let json = serde_json::to_string_pretty(&report).context("Failed to serialize issues")?;
                println!("{}", json);
            } else {
                for issue in &issues {
                    println!("{}", issue);
                }
            }
            if has_errors(&issues) {
                let count = issues
                    .iter()
                    .filter(|issue| issue.severity == ValidationSeverity::Error)
                    .count();
                return Err(WrciError::Validation(format!("{} error(s) in {}", count, file.display())).into());
            }

            if !args.json {
                println!("OK: pipeline '{}' in {}", root.name, file.display());
            }
            Ok(())
        }

        SubCommand::Explain { file } => {
            let root = load(&file)?;
            if args.json {
                let json = serde_json::to_string_pretty(&root).context("Failed to serialize pipeline")?;
                println!("{}", json);
                return Ok(());
            }

            println!("Pipeline file: {}\n", file.display());
            for line in explain_pipeline(&root) {
                println!("{}", line);
            }

            let issues = validate_pipeline(&root, &ValidationOptions::default());
            if !issues.is_empty() {
                println!("\nValidation Notes:");
                for issue in &issues {
                    println!("  - {}", issue);
                }
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<Pipeline, WrciError> {
    let source = std::fs::read_to_string(path).map_err(|source| WrciError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let root = parse_pipeline(&source)?;
    if root.statements.is_empty() {
        warn!(pipeline = %root.name, "pipeline has no statements");
    }
    Ok(root)
}
