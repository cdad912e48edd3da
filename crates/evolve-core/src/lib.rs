//! Evolve Core - mergekit-evolve job orchestration
//!
//! Runs one evolutionary merge job end to end:
//! - Stages the YAML configuration in a private temporary directory
//! - Provisions a model repository on the Hub
//! - Runs `mergekit-evolve`, streaming its output into the job log
//! - Uploads the merged model, or deletes the repository if the merge failed
//!
//! The job log (`LogStream`) is the primary output; `JobReport` carries the
//! same outcome in structured form.

pub mod command;
pub mod config;
pub mod error;
pub mod input;
pub mod log;
pub mod obs;
pub mod orchestrator;
pub mod runner;
pub mod staging;
pub mod telemetry;

// Re-export key types
pub use command::{MergeCommand, MergeStrategy, WandbTracking};
pub use config::JobSettings;
pub use error::{FailureKind, JobError};
pub use input::{generate_repo_name, Credential, JobInput};
pub use log::{LogCursor, LogEntry, LogLevel, LogReader, LogStream};
pub use orchestrator::{JobOrchestrator, JobReport, JobStatus, RunningJob};
pub use runner::{
    CancelHandle, CancelSignal, OutputChannel, OutputLine, ProcessOutcome, ProcessRunner,
    TokioProcessRunner,
};
pub use staging::StagingArea;
pub use telemetry::{init_tracing, TracingOptions, JOB_LOG_TARGET};
