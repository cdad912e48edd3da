//! mergekit-evolve-job - run an evolutionary model merge and publish it
//!
//! ## Commands
//!
//! - `run`: stage a YAML config, create a Hub repository, run
//!   `mergekit-evolve`, then upload the merged model (or delete the
//!   repository if the merge failed)
//! - `name`: print a freshly generated repository name

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evolve_core::{
    generate_repo_name, JobOrchestrator, JobReport, JobSettings, LogEntry, MergeCommand,
    MergeStrategy, TokioProcessRunner, TracingOptions,
};
use evolve_hub::{HfConnector, HubConfig};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mergekit-evolve-job")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a mergekit-evolve merge and publish the result to the Hugging Face Hub", long_about = None)]
struct Cli {
    /// Enable verbose diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit the job log and diagnostics as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one merge job
    Run {
        /// Path to the mergekit-evolve YAML configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Hugging Face write token
        #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Repository name (generated when omitted)
        #[arg(short = 'n', long)]
        repo_name: Option<String>,

        /// Hub endpoint
        #[arg(long, env = "HF_ENDPOINT")]
        endpoint: Option<String>,

        /// Create the repository as private
        #[arg(long)]
        private: bool,

        /// Evaluation strategy passed to mergekit-evolve (pool, buffered, serial)
        #[arg(long, default_value = "pool")]
        strategy: MergeStrategy,

        /// mergekit-evolve executable
        #[arg(long, env = "MERGEKIT_EVOLVE_BIN")]
        program: Option<String>,

        /// Disable Weights & Biases tracking flags
        #[arg(long)]
        no_wandb: bool,

        /// Parent directory for the job's staging area
        #[arg(long, env = "EVOLVE_STAGING_DIR")]
        staging_dir: Option<PathBuf>,

        /// Report the merge process's stderr as ERROR lines
        #[arg(long)]
        stderr_as_error: bool,
    },

    /// Print a generated repository name
    Name {
        /// Name prefix
        #[arg(long, default_value = "mergekit-evolve")]
        prefix: String,
    },
}

struct RunArgs {
    config: PathBuf,
    token: Option<String>,
    repo_name: Option<String>,
    endpoint: Option<String>,
    private: bool,
    strategy: MergeStrategy,
    program: Option<String>,
    no_wandb: bool,
    staging_dir: Option<PathBuf>,
    stderr_as_error: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    // job entries are printed to stdout below; keep them out of stderr
    evolve_core::init_tracing(TracingOptions::new(cli.json, level).without_job_log());

    match cli.command {
        Commands::Run {
            config,
            token,
            repo_name,
            endpoint,
            private,
            strategy,
            program,
            no_wandb,
            staging_dir,
            stderr_as_error,
        } => {
            let args = RunArgs {
                config,
                token,
                repo_name,
                endpoint,
                private,
                strategy,
                program,
                no_wandb,
                staging_dir,
                stderr_as_error,
            };
            cmd_run(args, cli.json).await
        }
        Commands::Name { prefix } => {
            println!("{}", generate_repo_name(&prefix));
            Ok(())
        }
    }
}

/// Build the orchestrator from flags and environment
fn build_orchestrator(args: &RunArgs) -> Result<JobOrchestrator> {
    let mut hub_config = match &args.endpoint {
        Some(endpoint) => HubConfig::new(endpoint),
        None => HubConfig::from_env(),
    };
    if args.private {
        hub_config = hub_config.with_private(true);
    }
    let connector = HfConnector::new(hub_config).context("Failed to create Hub client")?;

    let mut command = MergeCommand::from_env().with_strategy(args.strategy);
    if let Some(program) = &args.program {
        command = command.with_program(program.clone());
    }
    if args.no_wandb {
        command = command.without_tracking();
    }

    let mut settings = JobSettings::from_env();
    if let Some(dir) = &args.staging_dir {
        settings = settings.with_staging_root(dir);
    }
    settings.stderr_as_error = args.stderr_as_error;

    Ok(JobOrchestrator::new(
        Arc::new(connector),
        Arc::new(TokioProcessRunner::new(settings.stderr_as_error)),
        command,
        settings,
    ))
}

/// Run one job, printing its log as it is produced
async fn cmd_run(args: RunArgs, json: bool) -> Result<()> {
    let config = tokio::fs::read_to_string(&args.config)
        .await
        .with_context(|| format!("Failed to read config {:?}", args.config))?;
    let orchestrator = Arc::new(build_orchestrator(&args)?);

    let job = orchestrator.run(
        config,
        args.token.clone().unwrap_or_default(),
        args.repo_name.clone(),
    );
    info!(job_id = %job.job_id(), "Job started");

    let mut cursor = job.logs();
    let mut interrupted = false;
    loop {
        tokio::select! {
            entry = cursor.next() => match entry {
                Some(entry) => println!("{}", render_entry(&entry, json)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("Interrupted, cancelling merge...");
                job.cancel();
            }
        }
    }

    let report = job.wait().await?;
    println!("{}", render_summary(&report, json)?);

    if report.status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Job {} failed", report.job_id)
    }
}

fn render_entry(entry: &LogEntry, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string(entry)?)
    } else {
        Ok(entry.to_string())
    }
}

fn render_summary(report: &JobReport, json: bool) -> Result<String> {
    let repository = report.repository.as_ref().map(|h| h.repo_id.to_string());
    if json {
        return Ok(serde_json::to_string(&json!({
            "job_id": report.job_id.to_string(),
            "success": report.status.is_success(),
            "failure": report.status.failure_kind(),
            "repository": repository,
            "rolled_back": report.rolled_back,
            "exit_code": report.process.map(|p| p.exit_code),
            "duration_ms": report.duration_ms,
        }))?);
    }

    let mut lines = vec![String::new()];
    lines.push(format!("Job ID: {}", report.job_id));
    lines.push(format!(
        "Status: {}",
        if report.status.is_success() {
            "✓ SUCCEEDED"
        } else {
            "✗ FAILED"
        }
    ));
    if let Some(repo) = &repository {
        let suffix = if report.rolled_back { " (deleted)" } else { "" };
        lines.push(format!("Repository: {repo}{suffix}"));
    }
    lines.push(format!("Duration: {}ms", report.duration_ms));
    Ok(lines.join("\n"))
}
