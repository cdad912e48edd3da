//! Structured observability hooks for the job lifecycle.
//!
//! - `job_span`: job-scoped span to instrument a job future with
//! - Emission functions for start, rollback and finish
//!
//! The job log itself is mirrored by `LogStream::append`; these events carry
//! the machine-readable fields (ids, kinds, durations).

use tracing::{info, warn, Span};
use uuid::Uuid;

use crate::error::FailureKind;

/// Span tagged with the job id. Attach with `tracing::Instrument`.
pub fn job_span(job_id: Uuid) -> Span {
    tracing::info_span!("evolve.job", job_id = %job_id)
}

/// Emit event: job started.
pub fn emit_job_started(job_id: Uuid, config_digest: &str, repository_name: Option<&str>) {
    info!(
        event = "job.started",
        job_id = %job_id,
        config_digest = %config_digest,
        repository_name = repository_name.unwrap_or("<generated>"),
    );
}

/// Emit event: provisioned repository is being rolled back.
pub fn emit_rollback(job_id: Uuid, repo_id: &str, exit_code: i32) {
    warn!(
        event = "job.rollback",
        job_id = %job_id,
        repo_id = %repo_id,
        exit_code = exit_code,
    );
}

/// Emit event: job finished.
pub fn emit_job_finished(
    job_id: Uuid,
    duration_ms: u64,
    total_entries: usize,
    failure: Option<FailureKind>,
) {
    info!(
        event = "job.finished",
        job_id = %job_id,
        duration_ms = duration_ms,
        total_entries = total_entries,
        success = failure.is_none(),
        failure = ?failure,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_span_create() {
        let _entered = job_span(Uuid::new_v4()).entered();
        emit_job_finished(Uuid::new_v4(), 1, 2, Some(FailureKind::Execution));
    }
}
