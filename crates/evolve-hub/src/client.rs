//! Repository client trait definitions
//!
//! - `RepositoryClient`: create / delete / upload against one account
//! - `HubConnector`: builds a `RepositoryClient` for a caller-supplied token
//!
//! Both traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::HubError;
use crate::Result;

/// Fully qualified repository id (`namespace/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId(String);

impl RepoId {
    /// Build from a namespace and a bare repository name.
    pub fn new(namespace: &str, name: &str) -> Result<Self> {
        Self::parse(&format!("{namespace}/{name}"))
    }

    /// Parse a `namespace/name` string.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split('/');
        let (Some(ns), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(HubError::InvalidRepoId(raw.to_string()));
        };
        if ns.is_empty() || name.is_empty() || !is_valid_segment(ns) || !is_valid_segment(name) {
            return Err(HubError::InvalidRepoId(raw.to_string()));
        }
        Ok(RepoId(raw.to_string()))
    }

    pub fn namespace(&self) -> &str {
        self.0.split_once('/').map(|(ns, _)| ns).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_valid_segment(s: &str) -> bool {
    s.len() <= 96
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !s.starts_with(['-', '.'])
        && !s.ends_with(['-', '.'])
        && !s.contains("--")
        && !s.contains("..")
}

/// Handle returned by a successful `create_repository`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    pub repo_id: RepoId,
    pub url: String,
}

impl std::fmt::Display for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Result of a folder upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    /// Files committed (regular + LFS)
    pub files: usize,
    /// Files that went through LFS
    pub lfs_files: usize,
    /// Total bytes uploaded
    pub bytes: u64,
    /// Commit URL reported by the service, if any
    pub commit_url: Option<String>,
}

/// Remote artifact repository operations for a single authenticated account.
///
/// Guarantees:
/// - `create_repository` is idempotent: an existing repository of the same
///   name under the same account yields the existing handle, not an error.
/// - `upload_folder` preserves file paths relative to `local_path`.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Create (or reuse) a repository. `name` may be bare or `namespace/name`.
    async fn create_repository(&self, name: &str) -> Result<RepositoryHandle>;

    /// Delete a repository. Used only for rollback.
    async fn delete_repository(&self, repo_id: &RepoId) -> Result<()>;

    /// Recursively upload every file under `local_path`.
    async fn upload_folder(
        &self,
        handle: &RepositoryHandle,
        local_path: &Path,
    ) -> Result<UploadSummary>;
}

/// Builds a `RepositoryClient` bound to a credential.
pub trait HubConnector: Send + Sync {
    fn connect(&self, token: &str) -> Result<Box<dyn RepositoryClient>>;
}
