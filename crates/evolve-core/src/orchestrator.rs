//! Job orchestration: stage, provision, merge, then upload or roll back.

use anyhow::Context;
use evolve_hub::{HubConnector, RepositoryClient, RepositoryHandle, UploadSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::command::MergeCommand;
use crate::config::JobSettings;
use crate::error::{FailureKind, JobError};
use crate::input::{generate_repo_name, JobInput};
use crate::log::{LogCursor, LogReader, LogStream};
use crate::obs;
use crate::runner::{CancelHandle, CancelSignal, ProcessOutcome, ProcessRunner};
use crate::staging::StagingArea;

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed(JobError),
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            JobStatus::Succeeded => None,
            JobStatus::Failed(e) => Some(e.kind()),
        }
    }
}

/// What a finished job did. The log remains the primary record.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Effective repository name (given or generated)
    pub repository_name: Option<String>,
    /// Present once provisioning succeeded
    pub repository: Option<RepositoryHandle>,
    /// Staging directory used; removed by the time the report exists
    pub staging_path: Option<PathBuf>,
    pub process: Option<ProcessOutcome>,
    pub upload: Option<UploadSummary>,
    /// Whether the provisioned repository was deleted again
    pub rolled_back: bool,
    pub duration_ms: u64,
}

impl JobReport {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Succeeded,
            repository_name: None,
            repository: None,
            staging_path: None,
            process: None,
            upload: None,
            rolled_back: false,
            duration_ms: 0,
        }
    }
}

/// A job running on the tokio runtime.
pub struct RunningJob {
    job_id: Uuid,
    logs: LogReader,
    cancel: CancelHandle,
    task: JoinHandle<JobReport>,
}

impl RunningJob {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Cursor over the full log, from the first entry.
    pub fn logs(&self) -> LogCursor {
        self.logs.cursor()
    }

    pub fn reader(&self) -> LogReader {
        self.logs.clone()
    }

    /// Kill the merge process if running; the job then rolls back.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> anyhow::Result<JobReport> {
        self.task
            .await
            .with_context(|| format!("job {} did not complete", self.job_id))
    }
}

/// Drives one job per call through staging, provisioning, the merge
/// process, and then either upload or rollback.
pub struct JobOrchestrator {
    connector: Arc<dyn HubConnector>,
    runner: Arc<dyn ProcessRunner>,
    command: MergeCommand,
    settings: JobSettings,
}

impl JobOrchestrator {
    pub fn new(
        connector: Arc<dyn HubConnector>,
        runner: Arc<dyn ProcessRunner>,
        command: MergeCommand,
        settings: JobSettings,
    ) -> Self {
        Self {
            connector,
            runner,
            command,
            settings,
        }
    }

    pub fn command(&self) -> &MergeCommand {
        &self.command
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Start a job in the background and return its live log.
    pub fn run(
        self: &Arc<Self>,
        config: impl Into<String>,
        credential: impl Into<String>,
        repository_name: Option<String>,
    ) -> RunningJob {
        self.spawn(JobInput::new(config, credential, repository_name))
    }

    pub fn spawn(self: &Arc<Self>, input: JobInput) -> RunningJob {
        let job_id = Uuid::new_v4();
        let log = LogStream::new(job_id);
        let logs = log.reader();
        let (cancel, signal) = CancelHandle::new();

        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.execute(input, &log, signal).await });

        RunningJob {
            job_id,
            logs,
            cancel,
            task,
        }
    }

    /// Run one job to completion, appending to `log` as it goes.
    ///
    /// Steps are strictly sequential and stop at the first failure. The
    /// staging area is removed on every path once it has been created.
    pub async fn execute(&self, input: JobInput, log: &LogStream, cancel: CancelSignal) -> JobReport {
        let job_id = log.job_id();
        let started = Instant::now();
        let mut report = JobReport::new(job_id);

        let result = async {
            obs::emit_job_started(job_id, &input.config_digest(), input.repository_name());
            self.pipeline(&input, log, cancel, &mut report).await
        }
        .instrument(obs::job_span(job_id))
        .await;

        report.status = match result {
            Ok(()) => JobStatus::Succeeded,
            Err(e) => JobStatus::Failed(e),
        };
        report.duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_job_finished(job_id, report.duration_ms, log.len(), report.status.failure_kind());
        report
    }

    async fn pipeline(
        &self,
        input: &JobInput,
        log: &LogStream,
        cancel: CancelSignal,
        report: &mut JobReport,
    ) -> Result<(), JobError> {
        input.validate().map_err(|e| fail(log, e))?;

        let staging = StagingArea::create(&self.settings, input.config())
            .await
            .map_err(|e| fail(log, JobError::Staging(e.to_string())))?;
        report.staging_path = Some(staging.path().to_path_buf());
        log.info(format!(
            "Configuration saved to {}",
            staging.config_path().display()
        ));

        let result = self.provision_and_merge(input, &staging, log, cancel, report).await;

        if let Err(e) = staging.close().await {
            warn!("Staging area cleanup failed: {}", e);
        }
        result
    }

    async fn provision_and_merge(
        &self,
        input: &JobInput,
        staging: &StagingArea,
        log: &LogStream,
        cancel: CancelSignal,
        report: &mut JobReport,
    ) -> Result<(), JobError> {
        let name = match input.repository_name() {
            Some(name) => name.to_string(),
            None => {
                let name = generate_repo_name(&self.settings.name_prefix);
                log.info(format!("Generated repository name: {name}"));
                name
            }
        };
        report.repository_name = Some(name.clone());

        let client = self
            .connector
            .connect(input.credential().expose())
            .map_err(|e| fail(log, JobError::Provisioning(e.to_string())))?;

        log.info(format!("Creating repository {name}"));
        let handle = client
            .create_repository(&name)
            .await
            .map_err(|e| fail(log, JobError::Provisioning(e.to_string())))?;
        log.info(format!("Repository created: {}", handle.url));
        report.repository = Some(handle.clone());

        let argv = self.command.argv(staging.path(), staging.config_path());
        let outcome = self.run_merge(&argv, staging.path(), log, cancel).await;
        report.process = Some(outcome);

        if !outcome.success() {
            let err = fail(
                log,
                JobError::MergeFailed {
                    exit_code: outcome.exit_code,
                },
            );
            report.rolled_back = rollback(client.as_ref(), &handle, outcome, log).await;
            return Err(err);
        }

        log.info("Model merged successfully. Uploading to Hugging Face.");
        let summary = client
            .upload_folder(&handle, staging.output_dir())
            .await
            .map_err(|e| fail(log, JobError::Upload(e.to_string())))?;
        log.info(upload_line(&summary));
        report.upload = Some(summary);

        log.info(format!(
            "Model successfully uploaded to Hugging Face: {}",
            handle.repo_id
        ));
        Ok(())
    }

    /// Run the merge command, forwarding output into `log` while it runs.
    async fn run_merge(
        &self,
        argv: &[String],
        working_dir: &Path,
        log: &LogStream,
        cancel: CancelSignal,
    ) -> ProcessOutcome {
        let (tx, mut rx) = mpsc::channel(self.settings.line_buffer.max(1));

        let execute = self.runner.execute(argv, working_dir, tx, cancel);
        let forward = async {
            while let Some(line) = rx.recv().await {
                log.append(line.level, line.text);
            }
        };

        let (outcome, ()) = tokio::join!(execute, forward);
        outcome
    }
}

fn fail(log: &LogStream, err: JobError) -> JobError {
    log.error(err.to_string());
    err
}

/// Delete the repository after a failed merge. Returns whether it was deleted.
async fn rollback(
    client: &dyn RepositoryClient,
    handle: &RepositoryHandle,
    outcome: ProcessOutcome,
    log: &LogStream,
) -> bool {
    obs::emit_rollback(log.job_id(), handle.repo_id.as_str(), outcome.exit_code);
    match client.delete_repository(&handle.repo_id).await {
        Ok(()) => {
            log.info(format!("Deleted repository {}", handle.repo_id));
            true
        }
        Err(e) => {
            log.error(format!("Error deleting repository {}: {}", handle.repo_id, e));
            false
        }
    }
}

fn upload_line(summary: &UploadSummary) -> String {
    let mut line = format!("Uploaded {} files ({} bytes", summary.files, summary.bytes);
    if summary.lfs_files > 0 {
        line.push_str(&format!(", {} via LFS", summary.lfs_files));
    }
    line.push(')');
    if let Some(url) = &summary.commit_url {
        line.push_str(&format!(": {url}"));
    }
    line
}
