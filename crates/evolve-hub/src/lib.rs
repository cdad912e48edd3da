//! Evolve-Hub: remote model repositories for mergekit-evolve jobs
//!
//! This crate owns everything that talks to the artifact repository service.
//! Jobs only see the `RepositoryClient` trait: create a repository
//! (idempotently), delete it again on rollback, or upload a folder into it.
//!
//! ## Key Components
//!
//! - `HfHubClient` / `HfConnector`: Hugging Face Hub REST + LFS implementation
//! - `MemoryHub`: in-memory fake with call recording and failure injection
//! - `upload`: folder scanning and commit payload construction

pub mod client;
mod error;
pub mod fakes;
pub mod hf;
pub mod upload;

pub use client::{HubConnector, RepoId, RepositoryClient, RepositoryHandle, UploadSummary};
pub use error::HubError;
pub use hf::{HfConnector, HfHubClient, HubConfig};

/// Result type for evolve-hub operations
pub type Result<T> = std::result::Result<T, HubError>;
