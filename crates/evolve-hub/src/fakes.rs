//! In-memory fakes for the repository traits (testing only)
//!
//! `MemoryHub` is a `HubConnector` whose clients share one in-memory
//! registry. Each token maps to its own account namespace, every call is
//! recorded, and individual operations can be made to fail.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::client::{HubConnector, RepoId, RepositoryClient, RepositoryHandle, UploadSummary};
use crate::error::HubError;
use crate::upload;
use crate::Result;

/// A call observed by the fake, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCall {
    Create { name: String },
    Delete { repo_id: RepoId },
    Upload { repo_id: RepoId, local_path: PathBuf },
}

/// Operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    Create,
    Delete,
    Upload,
}

#[derive(Debug, Default)]
struct HubState {
    /// repo id -> uploaded files (path in repo -> bytes)
    repos: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    calls: Vec<HubCall>,
    failures: HashMap<FailOn, String>,
}

/// In-memory Hub shared by every client it hands out.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail with `message` until cleared.
    pub fn fail_on(&self, op: FailOn, message: &str) {
        self.lock().failures.insert(op, message.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Every call made through any client, in order.
    pub fn calls(&self) -> Vec<HubCall> {
        self.lock().calls.clone()
    }

    pub fn repository_exists(&self, repo_id: &str) -> bool {
        self.lock().repos.contains_key(repo_id)
    }

    /// Files stored in a repository, keyed by path in repo.
    pub fn files(&self, repo_id: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        self.lock().repos.get(repo_id).cloned()
    }

    /// Client for `token` without going through `HubConnector`.
    pub fn client(&self, token: &str) -> MemoryRepositoryClient {
        MemoryRepositoryClient {
            namespace: namespace_for(token),
            state: self.state.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HubConnector for MemoryHub {
    fn connect(&self, token: &str) -> Result<Box<dyn RepositoryClient>> {
        if token.is_empty() {
            return Err(HubError::MissingToken);
        }
        Ok(Box::new(self.client(token)))
    }
}

/// Derive a stable, valid namespace from a token.
fn namespace_for(token: &str) -> String {
    let cleaned: String = token
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "user".to_string()
    } else {
        format!("user-{trimmed}")
    }
}

/// Client view of a `MemoryHub` for one account.
#[derive(Debug, Clone)]
pub struct MemoryRepositoryClient {
    namespace: String,
    state: Arc<Mutex<HubState>>,
}

impl MemoryRepositoryClient {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

fn injected(state: &HubState, op: FailOn) -> Result<()> {
    match state.failures.get(&op) {
        Some(message) => Err(HubError::Api {
            status: 500,
            message: message.clone(),
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl RepositoryClient for MemoryRepositoryClient {
    async fn create_repository(&self, name: &str) -> Result<RepositoryHandle> {
        let mut state = self.lock();
        state.calls.push(HubCall::Create {
            name: name.to_string(),
        });
        injected(&state, FailOn::Create)?;

        let repo_id = if name.contains('/') {
            RepoId::parse(name)?
        } else {
            RepoId::new(&self.namespace, name)?
        };
        state.repos.entry(repo_id.to_string()).or_default();

        Ok(RepositoryHandle {
            url: format!("https://hub.invalid/{repo_id}"),
            repo_id,
        })
    }

    async fn delete_repository(&self, repo_id: &RepoId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(HubCall::Delete {
            repo_id: repo_id.clone(),
        });
        injected(&state, FailOn::Delete)?;

        state
            .repos
            .remove(repo_id.as_str())
            .map(|_| ())
            .ok_or_else(|| HubError::RepositoryNotFound(repo_id.to_string()))
    }

    async fn upload_folder(
        &self,
        handle: &RepositoryHandle,
        local_path: &Path,
    ) -> Result<UploadSummary> {
        {
            let mut state = self.lock();
            state.calls.push(HubCall::Upload {
                repo_id: handle.repo_id.clone(),
                local_path: local_path.to_path_buf(),
            });
            injected(&state, FailOn::Upload)?;
            if !state.repos.contains_key(handle.repo_id.as_str()) {
                return Err(HubError::RepositoryNotFound(handle.repo_id.to_string()));
            }
        }

        let files = upload::collect_files(local_path)?;
        let mut stored = BTreeMap::new();
        let mut bytes = 0;
        for file in &files {
            let content = tokio::fs::read(&file.local_path).await?;
            bytes += content.len() as u64;
            stored.insert(file.path_in_repo.clone(), content);
        }

        let mut state = self.lock();
        let repo = state
            .repos
            .get_mut(handle.repo_id.as_str())
            .ok_or_else(|| HubError::RepositoryNotFound(handle.repo_id.to_string()))?;
        repo.extend(stored);

        Ok(UploadSummary {
            files: files.len(),
            lfs_files: 0,
            bytes,
            commit_url: Some(format!("{}/commit/0", handle.url)),
        })
    }
}
