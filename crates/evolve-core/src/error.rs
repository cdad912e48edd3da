//! Job failure taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which step of the job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Empty config or credential; nothing was touched
    Input,
    /// Local staging directory could not be prepared; nothing remote was touched
    Staging,
    /// Repository creation failed; nothing to roll back
    Provisioning,
    /// Merge process failed or could not start; repository rolled back
    Execution,
    /// Upload failed after a successful merge; repository left in place
    Upload,
}

/// Errors that terminate a job.
///
/// `Display` is the text of the ERROR entry appended to the job log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Error: Empty YAML configuration.")]
    EmptyConfig,

    #[error("Error: No Hugging Face token provided.")]
    MissingCredential,

    #[error("Error preparing staging area: {0}")]
    Staging(String),

    #[error("Error creating repository: {0}")]
    Provisioning(String),

    #[error("Merge failed.")]
    MergeFailed { exit_code: i32 },

    #[error("Error uploading to Hugging Face: {0}")]
    Upload(String),
}

impl JobError {
    pub fn kind(&self) -> FailureKind {
        match self {
            JobError::EmptyConfig | JobError::MissingCredential => FailureKind::Input,
            JobError::Staging(_) => FailureKind::Staging,
            JobError::Provisioning(_) => FailureKind::Provisioning,
            JobError::MergeFailed { .. } => FailureKind::Execution,
            JobError::Upload(_) => FailureKind::Upload,
        }
    }

    /// Whether the failure happened after the repository was provisioned.
    pub fn touched_remote(&self) -> bool {
        matches!(self.kind(), FailureKind::Execution | FailureKind::Upload)
    }
}
