//! Docflow CLI.
//!
//! Runs workflow definitions locally against configured processors, checks
//! definitions, and drives the daily report schedule.

mod config;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use docflow_engine::engine::Outcome;
use docflow_engine::{
    parse_workflow, pipeline, EngineConfig, Execution, ExecutionRequest, ExecutionStatus,
    ResultExt, Workflow, WorkflowOrchestrator,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::RunnerConfig;

#[derive(Parser)]
#[command(name = "docflow")]
#[command(version, about = "Docflow document workflow runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow once and print the execution record
    ///
    /// Examples:
    ///     docflow run --payload '{"messageId":"m-1","bucketName":"inbox","attachments":[]}'
    ///     docflow run --workflow flow.yaml --input request.json --config runner.yaml
    #[command(verbatim_doc_comment)]
    #[command(group(ArgGroup::new("source").required(true).args(["input", "payload"])))]
    Run {
        /// Workflow definition (default: built-in invoice pipeline)
        #[arg(short, long)]
        workflow: Option<PathBuf>,

        /// JSON file with the execution request or initial context
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Inline JSON execution request or initial context
        #[arg(short, long)]
        payload: Option<String>,

        /// Runner configuration (steps, jobs, storage)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the execution timeout, in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print the full execution record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate a workflow definition
    Validate {
        /// Workflow definition
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Run the daily report workflow once
    Report {
        /// Runner configuration with a report section
        #[arg(short, long)]
        config: PathBuf,

        /// Report date (YYYY-MM-DD); today in the report timezone when omitted
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Run the daily report on its weekday schedule until Ctrl+C
    Schedule {
        /// Runner configuration with a report section
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Initialize tracing/logging.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,docflow_engine=debug,docflow_steps=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn engine_config() -> EngineConfig {
    EngineConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Invalid DOCFLOW_ environment, using defaults");
        EngineConfig::default()
    })
}

fn load_runner(path: Option<&Path>) -> Result<RunnerConfig> {
    match path {
        Some(path) => RunnerConfig::load(path).log("loading runner config"),
        None => {
            tracing::warn!("No runner config given, no steps or job clients are registered");
            Ok(RunnerConfig::default())
        }
    }
}

fn build_orchestrator(runner: &RunnerConfig) -> Result<WorkflowOrchestrator> {
    let steps = runner.build_steps()?;
    let jobs = runner.build_jobs()?;
    tracing::info!(steps = ?steps.list(), jobs = ?jobs.list(), "Registries built");
    Ok(WorkflowOrchestrator::new(
        Arc::new(steps),
        Arc::new(jobs),
        engine_config(),
    ))
}

fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow: {}", path.display()))?;
    Ok(parse_workflow(&content).log(format!("parsing {}", path.display()))?)
}

/// An execution request becomes the pipeline's context; anything else is
/// taken as the initial context as-is.
fn initial_context(raw: Value) -> Result<Value> {
    match serde_json::from_value::<ExecutionRequest>(raw.clone()) {
        Ok(request) => Ok(request.into_context()?),
        Err(_) if raw.is_object() => Ok(raw),
        Err(_) => bail!("Input must be a JSON object"),
    }
}

fn print_summary(execution: &Execution) {
    println!("Execution {} ({})", execution.id, execution.workflow);
    for entry in &execution.history {
        let outcome = match &entry.outcome {
            Outcome::Transitioned { next } => format!("-> {}", next),
            Outcome::Succeeded => "succeeded".to_string(),
            Outcome::Failed { code, .. } => format!("failed: {}", code),
            Outcome::TimedOut => "timed out".to_string(),
        };
        println!("  {:<28} {:<8} {}", entry.state, entry.kind.to_string(), outcome);
    }
    println!(
        "Status: {} in {} ms",
        execution.status,
        execution.duration().num_milliseconds()
    );
    if let Some(error) = &execution.error {
        println!("Error: {} - {}", error.code, error.cause);
    }
}

async fn run_report(orchestrator: &WorkflowOrchestrator, date: Option<String>) -> Result<Execution> {
    let workflow = pipeline::daily_report_workflow()?;
    let input = match date {
        Some(date) => json!({ "reportDate": date }),
        None => json!({}),
    };
    Ok(orchestrator.run(&workflow, input).await)
}

async fn schedule(runner: RunnerConfig) -> Result<()> {
    let Some(trigger) = runner.trigger() else {
        bail!("Runner config has no report section");
    };
    let orchestrator = build_orchestrator(&runner)?;

    loop {
        let now = chrono::Utc::now();
        let next = trigger.next_fire(now)?;
        let wait = trigger.until_next(now)?;
        tracing::info!(next = %next, wait_secs = wait.as_secs(), "Next daily report scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let execution = run_report(&orchestrator, None).await?;
                tracing::info!(
                    execution_id = %execution.id,
                    status = %execution.status,
                    "Daily report finished"
                );
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                tracing::info!("Shutdown signal received");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run {
            workflow,
            input,
            payload,
            config,
            timeout,
            json,
        } => {
            let workflow = match workflow {
                Some(path) => load_workflow(&path)?,
                None => pipeline::invoice_pipeline()?,
            };

            let raw: Value = match (input, payload) {
                (Some(path), _) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
                    serde_json::from_str(&content).context("Failed to parse input JSON")?
                }
                (None, Some(payload)) => {
                    serde_json::from_str(&payload).context("Failed to parse payload JSON")?
                }
                (None, None) => bail!("Either --input or --payload is required"),
            };
            let context = initial_context(raw)?;

            let runner = load_runner(config.as_deref())?;
            let orchestrator = build_orchestrator(&runner)?;
            let execution = match timeout {
                Some(secs) => {
                    orchestrator
                        .run_with_timeout(&workflow, context, Duration::from_secs(secs))
                        .await
                }
                None => orchestrator.run(&workflow, context).await,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&execution)?);
            } else {
                print_summary(&execution);
            }

            if execution.status != ExecutionStatus::Succeeded {
                std::process::exit(1);
            }
        }

        Commands::Validate { file } => {
            let workflow = load_workflow(&file)?;
            println!("Workflow '{}' is valid", workflow.name);
            println!("  Start: {}", workflow.graph.start);
            if let Some(timeout) = workflow.timeout_seconds {
                println!("  Timeout: {}s", timeout);
            }
            for (name, state) in &workflow.graph.states {
                let transitions = state.transitions();
                if transitions.is_empty() {
                    println!("  {:<28} {}", name, state.kind());
                } else {
                    println!("  {:<28} {:<8} -> {}", name, state.kind().to_string(), transitions.join(", "));
                }
            }
        }

        Commands::Report { config, date } => {
            let runner = RunnerConfig::load(&config).log("loading runner config")?;
            if runner.report.is_none() {
                bail!("Runner config has no report section");
            }
            let orchestrator = build_orchestrator(&runner)?;
            let execution = run_report(&orchestrator, date).await?;
            println!("{}", serde_json::to_string_pretty(&execution)?);

            if execution.status != ExecutionStatus::Succeeded {
                std::process::exit(1);
            }
        }

        Commands::Schedule { config } => {
            let runner = RunnerConfig::load(&config).log("loading runner config")?;
            schedule(runner).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_context_from_request() {
        let ctx = initial_context(json!({
            "messageId": "m-1",
            "bucketName": "inbox",
            "attachments": [{"type": "pdf", "filename": "a.pdf"}]
        }))
        .unwrap();
        assert_eq!(ctx["subjectFlag"], false);
        assert_eq!(ctx["attachments"][0]["messageId"], "m-1");
    }

    #[test]
    fn test_initial_context_passthrough() {
        let ctx = initial_context(json!({"documents": ["a"]})).unwrap();
        assert_eq!(ctx, json!({"documents": ["a"]}));
        assert!(initial_context(json!([1, 2])).is_err());
    }

    #[test]
    fn test_cli_requires_input_source() {
        assert!(Cli::try_parse_from(["docflow", "run"]).is_err());
        assert!(Cli::try_parse_from(["docflow", "run", "--payload", "{}"]).is_ok());
        assert!(Cli::try_parse_from(["docflow", "validate", "flow.yaml"]).is_ok());
    }
}
