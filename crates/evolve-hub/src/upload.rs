//! Folder scanning and commit payload construction for Hub uploads.
//!
//! The Hub commit endpoint takes newline-delimited JSON: one `header` line,
//! then one `file` line per inlined (base64) file and one `lfsFile` line per
//! file already pushed to LFS storage.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use walkdir::WalkDir;

use crate::error::HubError;
use crate::Result;

/// Bytes of each file sent to the preupload endpoint for content sniffing.
pub const SAMPLE_SIZE: usize = 512;

/// Buffer size for streaming file contents.
pub const READ_CHUNK: usize = 64 * 1024;

/// A file found under the upload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Absolute (or root-joined) path on disk
    pub local_path: PathBuf,
    /// `/`-separated path inside the repository
    pub path_in_repo: String,
    pub size: u64,
}

/// How the Hub wants a file delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Regular,
    Lfs,
}

/// Walk `root` recursively, returning every regular file sorted by repo path.
///
/// Fails with `EmptyFolder` when `root` is missing or has no files.
pub fn collect_files(root: &Path) -> Result<Vec<LocalFile>> {
    if !root.is_dir() {
        return Err(HubError::EmptyFolder(root.display().to_string()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| HubError::UnexpectedResponse(e.to_string()))?;
        let path_in_repo = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(LocalFile {
            local_path: entry.path().to_path_buf(),
            path_in_repo,
            size: entry.metadata()?.len(),
        });
    }

    if files.is_empty() {
        return Err(HubError::EmptyFolder(root.display().to_string()));
    }
    files.sort_by(|a, b| a.path_in_repo.cmp(&b.path_in_repo));
    Ok(files)
}

/// Base64 of the first `SAMPLE_SIZE` bytes of the file at `path`.
pub async fn read_sample(path: &Path) -> Result<String> {
    let file = File::open(path).await?;
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    file.take(SAMPLE_SIZE as u64).read_to_end(&mut sample).await?;
    Ok(BASE64.encode(&sample))
}

/// Lowercase hex SHA-256 of the file at `path` (the LFS object id).
///
/// Hashes in `READ_CHUNK` blocks so large weight files never sit in memory.
pub async fn file_oid(path: &Path) -> Result<String> {
    let mut reader = BufReader::with_capacity(READ_CHUNK, File::open(path).await?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// One line of the commit payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOperation {
    /// Inline file, sent base64 encoded
    Regular { path: String, content: Vec<u8> },
    /// File already present in LFS storage
    Lfs { path: String, oid: String, size: u64 },
}

/// Serialize a commit as NDJSON.
pub fn commit_payload(summary: &str, operations: &[CommitOperation]) -> Result<String> {
    let mut lines = Vec::with_capacity(operations.len() + 1);
    lines.push(serde_json::to_string(&json!({
        "key": "header",
        "value": { "summary": summary, "description": "" },
    }))?);

    for op in operations {
        let line = match op {
            CommitOperation::Regular { path, content } => json!({
                "key": "file",
                "value": {
                    "content": BASE64.encode(content),
                    "path": path,
                    "encoding": "base64",
                },
            }),
            CommitOperation::Lfs { path, oid, size } => json!({
                "key": "lfsFile",
                "value": {
                    "path": path,
                    "algo": "sha256",
                    "oid": oid,
                    "size": size,
                },
            }),
        };
        lines.push(serde_json::to_string(&line)?);
    }

    let mut body = lines.join("\n");
    body.push('\n');
    Ok(body)
}
