//! Hugging Face Hub HTTP client
//!
//! Talks to the Hub REST API for repository lifecycle and uploads folders as
//! a single commit, pushing large files through the Git LFS batch API.

use async_trait::async_trait;
use futures::stream;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE,
};
use reqwest::{Body, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::client::{HubConnector, RepoId, RepositoryClient, RepositoryHandle, UploadSummary};
use crate::error::HubError;
use crate::upload::{self, CommitOperation, LocalFile, UploadMode};
use crate::Result;

const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub base URL
    pub endpoint: String,
    /// Create repositories as private
    pub private: bool,
    /// Branch uploads are committed to
    pub revision: String,
    /// Commit title used by `upload_folder`
    pub commit_summary: String,
    pub user_agent: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            endpoint: std::env::var("HF_ENDPOINT")
                .unwrap_or_else(|_| "https://huggingface.co".to_string()),
            private: std::env::var("HF_HUB_PRIVATE_REPOS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            revision: "main".to_string(),
            commit_summary: "Upload folder using mergekit-evolve-job".to_string(),
            user_agent: format!("mergekit-evolve-job/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HubConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific endpoint
    pub fn new(endpoint: &str) -> Self {
        HubConfig {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Create repositories as private
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }
}

/// Connector producing `HfHubClient`s that share one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct HfConnector {
    config: HubConfig,
    http_client: reqwest::Client,
}

impl HfConnector {
    pub fn new(config: HubConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(HfConnector {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(HubConfig::from_env())
    }
}

impl HubConnector for HfConnector {
    fn connect(&self, token: &str) -> Result<Box<dyn RepositoryClient>> {
        Ok(Box::new(HfHubClient::with_http_client(
            self.config.clone(),
            token,
            self.http_client.clone(),
        )?))
    }
}

/// Hub client bound to one access token
pub struct HfHubClient {
    config: HubConfig,
    http_client: reqwest::Client,
    auth: HeaderValue,
    namespace: OnceCell<String>,
}

#[derive(Deserialize)]
struct WhoAmI {
    name: String,
}

#[derive(Deserialize)]
struct CreateRepoResponse {
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
}

#[derive(Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct LfsError {
    message: String,
}

#[derive(Deserialize)]
struct LfsObject {
    oid: String,
    #[serde(default)]
    actions: BTreeMap<String, LfsAction>,
    error: Option<LfsError>,
}

#[derive(Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    commit_url: Option<String>,
}

impl HfHubClient {
    /// Create a new client with its own HTTP connection pool
    pub fn new(config: HubConfig, token: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Self::with_http_client(config, token, http_client)
    }

    fn with_http_client(config: HubConfig, token: &str, http_client: reqwest::Client) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(HubError::MissingToken);
        }
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| HubError::MissingToken)?;
        auth.set_sensitive(true);

        Ok(HfHubClient {
            config,
            http_client,
            auth,
            namespace: OnceCell::new(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.endpoint, path)
    }

    fn repo_url(&self, repo_id: &RepoId) -> String {
        format!("{}/{}", self.config.endpoint, repo_id)
    }

    /// Account name owning the token (cached after the first call)
    pub async fn whoami(&self) -> Result<&str> {
        let name = self
            .namespace
            .get_or_try_init(|| async {
                let response = self
                    .http_client
                    .get(self.api_url("whoami-v2"))
                    .header(AUTHORIZATION, self.auth.clone())
                    .send()
                    .await?;
                let who: WhoAmI = check(response).await?.json().await?;
                debug!("Authenticated as {}", who.name);
                Ok::<_, HubError>(who.name)
            })
            .await?;
        Ok(name.as_str())
    }

    async fn resolve_repo_id(&self, name: &str) -> Result<RepoId> {
        if name.contains('/') {
            RepoId::parse(name)
        } else {
            let namespace = self.whoami().await?;
            RepoId::new(namespace, name)
        }
    }

    /// Organization field for create/delete: omitted for the user's own namespace
    async fn organization_for(&self, repo_id: &RepoId) -> Result<Option<String>> {
        let own = self.whoami().await?;
        Ok((repo_id.namespace() != own).then(|| repo_id.namespace().to_string()))
    }

    async fn preupload(
        &self,
        repo_id: &RepoId,
        files: &[LocalFile],
        samples: &[String],
    ) -> Result<BTreeMap<String, UploadMode>> {
        let body = json!({
            "files": files
                .iter()
                .zip(samples)
                .map(|(f, sample)| json!({
                    "path": f.path_in_repo,
                    "size": f.size,
                    "sample": sample,
                }))
                .collect::<Vec<_>>(),
        });

        let response = self
            .http_client
            .post(self.api_url(&format!(
                "models/{}/preupload/{}",
                repo_id, self.config.revision
            )))
            .header(AUTHORIZATION, self.auth.clone())
            .json(&body)
            .send()
            .await?;
        let parsed: PreuploadResponse = check(response).await?.json().await?;

        Ok(parsed
            .files
            .into_iter()
            .map(|f| (f.path, f.upload_mode))
            .collect())
    }

    /// Push one object through the LFS batch API
    async fn upload_lfs(&self, repo_id: &RepoId, oid: &str, file: &LocalFile) -> Result<()> {
        let size = file.size;
        let batch = json!({
            "operation": "upload",
            "transfers": ["basic", "multipart"],
            "objects": [{ "oid": oid, "size": size }],
            "hash_algo": "sha256",
        });

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(LFS_CONTENT_TYPE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(LFS_CONTENT_TYPE));
        headers.insert(AUTHORIZATION, self.auth.clone());

        let response = self
            .http_client
            .post(format!(
                "{}.git/info/lfs/objects/batch",
                self.repo_url(repo_id)
            ))
            .headers(headers)
            .body(serde_json::to_vec(&batch)?)
            .send()
            .await?;
        let parsed: LfsBatchResponse = check(response).await?.json().await?;

        let object = parsed
            .objects
            .into_iter()
            .find(|o| o.oid == oid)
            .ok_or_else(|| HubError::UnexpectedResponse(format!("LFS batch missing {oid}")))?;
        if let Some(err) = object.error {
            return Err(HubError::Api {
                status: 422,
                message: err.message,
            });
        }

        let Some(upload_action) = object.actions.get("upload") else {
            debug!("LFS object {} already stored", oid);
            return Ok(());
        };

        if let Some(chunk_size) = upload_action.header.get("chunk_size") {
            let chunk_size: u64 = chunk_size
                .parse()
                .map_err(|_| HubError::UnexpectedResponse(format!("bad chunk_size {chunk_size}")))?;
            self.upload_multipart(oid, upload_action, file, chunk_size)
                .await?;
        } else {
            let response = self
                .http_client
                .put(&upload_action.href)
                .header(CONTENT_LENGTH, size)
                .body(file_body(&file.local_path, 0, size).await?)
                .send()
                .await?;
            check(response).await?;
        }

        if let Some(verify) = object.actions.get("verify") {
            let response = self
                .http_client
                .post(&verify.href)
                .header(AUTHORIZATION, self.auth.clone())
                .json(&json!({ "oid": oid, "size": size }))
                .send()
                .await?;
            check(response).await?;
        }
        Ok(())
    }

    async fn upload_multipart(
        &self,
        oid: &str,
        action: &LfsAction,
        file: &LocalFile,
        chunk_size: u64,
    ) -> Result<()> {
        if chunk_size == 0 {
            return Err(HubError::UnexpectedResponse("chunk_size of 0".to_string()));
        }

        let mut part_urls: Vec<(usize, &String)> = action
            .header
            .iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|n| (n, v)))
            .collect();
        part_urls.sort_by_key(|(n, _)| *n);

        let part_count = file.size.div_ceil(chunk_size) as usize;
        if part_count != part_urls.len() {
            return Err(HubError::UnexpectedResponse(format!(
                "LFS multipart expected {} parts, got {} urls",
                part_count,
                part_urls.len()
            )));
        }

        let mut parts = Vec::with_capacity(part_count);
        for (index, (part_number, url)) in part_urls.into_iter().enumerate() {
            let offset = index as u64 * chunk_size;
            let len = chunk_size.min(file.size - offset);
            let response = self
                .http_client
                .put(url.as_str())
                .header(CONTENT_LENGTH, len)
                .body(file_body(&file.local_path, offset, len).await?)
                .send()
                .await?;
            let response = check(response).await?;
            let etag = response
                .headers()
                .get("etag")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    HubError::UnexpectedResponse(format!("part {part_number} has no etag"))
                })?
                .to_string();
            parts.push(json!({ "partNumber": part_number, "etag": etag }));
        }

        let response = self
            .http_client
            .post(&action.href)
            .header(ACCEPT, LFS_CONTENT_TYPE)
            .json(&json!({ "oid": oid, "parts": parts }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RepositoryClient for HfHubClient {
    async fn create_repository(&self, name: &str) -> Result<RepositoryHandle> {
        let repo_id = self.resolve_repo_id(name).await?;
        let organization = self.organization_for(&repo_id).await?;

        info!("Creating Hub repository {}", repo_id);
        let response = self
            .http_client
            .post(self.api_url("repos/create"))
            .header(AUTHORIZATION, self.auth.clone())
            .json(&json!({
                "name": repo_id.name(),
                "organization": organization,
                "private": self.config.private,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            debug!("Repository {} already exists, reusing it", repo_id);
            let url = self.repo_url(&repo_id);
            return Ok(RepositoryHandle { repo_id, url });
        }

        let created: CreateRepoResponse = check(response).await?.json().await?;
        Ok(RepositoryHandle {
            repo_id,
            url: created.url,
        })
    }

    async fn delete_repository(&self, repo_id: &RepoId) -> Result<()> {
        let organization = self.organization_for(repo_id).await?;

        warn!("Deleting Hub repository {}", repo_id);
        let response = self
            .http_client
            .delete(self.api_url("repos/delete"))
            .header(AUTHORIZATION, self.auth.clone())
            .json(&json!({
                "name": repo_id.name(),
                "organization": organization,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(HubError::RepositoryNotFound(repo_id.to_string()));
        }
        check(response).await?;
        Ok(())
    }

    async fn upload_folder(
        &self,
        handle: &RepositoryHandle,
        local_path: &Path,
    ) -> Result<UploadSummary> {
        let files = upload::collect_files(local_path)?;
        info!(
            "Uploading {} files from {:?} to {}",
            files.len(),
            local_path,
            handle.repo_id
        );

        let mut samples = Vec::with_capacity(files.len());
        for file in &files {
            samples.push(upload::read_sample(&file.local_path).await?);
        }

        let modes = self.preupload(&handle.repo_id, &files, &samples).await?;

        let mut operations = Vec::with_capacity(files.len());
        let mut lfs_files = 0;
        let mut bytes = 0u64;
        for file in files {
            bytes += file.size;
            let mode = modes
                .get(&file.path_in_repo)
                .copied()
                .unwrap_or(UploadMode::Regular);
            match mode {
                UploadMode::Regular => {
                    let content = tokio::fs::read(&file.local_path).await?;
                    operations.push(CommitOperation::Regular {
                        path: file.path_in_repo,
                        content,
                    });
                }
                UploadMode::Lfs => {
                    let oid = upload::file_oid(&file.local_path).await?;
                    debug!("Pushing {} to LFS as {}", file.path_in_repo, oid);
                    self.upload_lfs(&handle.repo_id, &oid, &file).await?;
                    lfs_files += 1;
                    operations.push(CommitOperation::Lfs {
                        path: file.path_in_repo,
                        oid,
                        size: file.size,
                    });
                }
            }
        }

        let files_committed = operations.len();
        let payload = upload::commit_payload(&self.config.commit_summary, &operations)?;
        let response = self
            .http_client
            .post(self.api_url(&format!(
                "models/{}/commit/{}",
                handle.repo_id, self.config.revision
            )))
            .header(AUTHORIZATION, self.auth.clone())
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await?;
        let commit: CommitResponse = check(response).await?.json().await?;

        Ok(UploadSummary {
            files: files_committed,
            lfs_files,
            bytes,
            commit_url: commit.commit_url,
        })
    }
}

/// Stream `len` bytes of the file at `path`, starting at `offset`.
async fn file_body(path: &Path, offset: u64, len: u64) -> Result<Body> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let chunks = stream::try_unfold(file.take(len), |mut reader| async move {
        let mut buf = vec![0u8; upload::READ_CHUNK];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok::<_, std::io::Error>(Some((buf, reader)))
    });
    Ok(Body::wrap_stream(chunks))
}

/// Map non-success responses to `HubError::Api`, keeping the service message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HubError::Api {
        status: status.as_u16(),
        message: error_message(&body, status),
    })
}

fn error_message(body: &str, status: StatusCode) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(v) => v
            .get("error")
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_config_default() {
        let config = HubConfig::default();
        assert!(!config.endpoint.is_empty());
        assert_eq!(config.revision, "main");
    }

    #[test]
    fn test_hub_config_new_trims_slash() {
        let config = HubConfig::new("https://hub.example.com/").with_private(true);
        assert_eq!(config.endpoint, "https://hub.example.com");
        assert!(config.private);
    }

    #[test]
    fn test_client_rejects_empty_token() {
        let err = HfHubClient::new(HubConfig::new("https://hub.example.com"), "  ")
            .err()
            .unwrap();
        assert!(matches!(err, HubError::MissingToken));
    }

    #[test]
    fn test_connector_builds_client() {
        let connector = HfConnector::new(HubConfig::new("https://hub.example.com")).unwrap();
        assert!(connector.connect("hf_token").is_ok());
        assert!(connector.connect("").is_err());
    }

    #[test]
    fn test_error_message_prefers_json_error() {
        let msg = error_message(r#"{"error":"You already created this model repo"}"#, StatusCode::CONFLICT);
        assert_eq!(msg, "You already created this model repo");
    }

    #[test]
    fn test_error_message_plain_body() {
        let msg = error_message("Invalid credentials\n", StatusCode::UNAUTHORIZED);
        assert_eq!(msg, "Invalid credentials");
    }

    #[test]
    fn test_error_message_empty_body() {
        let msg = error_message("", StatusCode::UNAUTHORIZED);
        assert_eq!(msg, "Unauthorized");
    }

    mod http {
        use super::*;
        use httpmock::prelude::*;
        use httpmock::Mock;
        use sha2::{Digest, Sha256};
        use tempfile::tempdir;

        const TOKEN: &str = "hf_test";

        fn client_for(server: &MockServer) -> HfHubClient {
            HfHubClient::new(HubConfig::new(&server.base_url()), TOKEN).unwrap()
        }

        async fn mock_whoami(server: &MockServer) -> Mock<'_> {
            server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/api/whoami-v2")
                        .header("authorization", format!("Bearer {TOKEN}"));
                    then.status(200).json_body(json!({ "name": "alice" }));
                })
                .await
        }

        #[tokio::test]
        async fn test_create_repository_in_own_namespace() {
            let server = MockServer::start_async().await;
            let whoami = mock_whoami(&server).await;
            let create = server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/api/repos/create")
                        .header("authorization", format!("Bearer {TOKEN}"))
                        .json_body(json!({
                            "name": "mergekit-evolve-abcdefg",
                            "organization": null,
                            "private": false,
                        }));
                    then.status(200)
                        .json_body(json!({ "url": "https://hub.example.com/alice/mergekit-evolve-abcdefg" }));
                })
                .await;

            let client = client_for(&server);
            let handle = client
                .create_repository("mergekit-evolve-abcdefg")
                .await
                .unwrap();

            assert_eq!(handle.repo_id.as_str(), "alice/mergekit-evolve-abcdefg");
            assert_eq!(
                handle.url,
                "https://hub.example.com/alice/mergekit-evolve-abcdefg"
            );
            create.assert_async().await;
            whoami.assert_async().await;
        }

        #[tokio::test]
        async fn test_create_existing_repository_returns_handle() {
            let server = MockServer::start_async().await;
            let whoami = mock_whoami(&server).await;
            let create = server
                .mock_async(|when, then| {
                    when.method(POST).path("/api/repos/create");
                    then.status(409)
                        .json_body(json!({ "error": "You already created this model repo" }));
                })
                .await;

            let client = client_for(&server);
            let first = client.create_repository("my-merge").await.unwrap();
            let second = client.create_repository("my-merge").await.unwrap();

            assert_eq!(first, second);
            assert_eq!(first.repo_id.as_str(), "alice/my-merge");
            assert_eq!(first.url, format!("{}/alice/my-merge", server.base_url()));
            create.assert_hits_async(2).await;
            // namespace lookup is cached per client
            whoami.assert_hits_async(1).await;
        }

        #[tokio::test]
        async fn test_create_in_organization() {
            let server = MockServer::start_async().await;
            let _whoami = mock_whoami(&server).await;
            let create = server
                .mock_async(|when, then| {
                    when.method(POST).path("/api/repos/create").json_body(json!({
                        "name": "my-merge",
                        "organization": "arcee-ai",
                        "private": false,
                    }));
                    then.status(200)
                        .json_body(json!({ "url": "https://hub.example.com/arcee-ai/my-merge" }));
                })
                .await;

            let handle = client_for(&server)
                .create_repository("arcee-ai/my-merge")
                .await
                .unwrap();

            assert_eq!(handle.repo_id.as_str(), "arcee-ai/my-merge");
            create.assert_async().await;
        }

        #[tokio::test]
        async fn test_create_error_carries_service_message() {
            let server = MockServer::start_async().await;
            let _whoami = mock_whoami(&server).await;
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/api/repos/create");
                    then.status(403)
                        .json_body(json!({ "error": "You don't have the rights to create a model under this namespace" }));
                })
                .await;

            let err = client_for(&server)
                .create_repository("my-merge")
                .await
                .unwrap_err();

            match err {
                HubError::Api { status, message } => {
                    assert_eq!(status, 403);
                    assert_eq!(
                        message,
                        "You don't have the rights to create a model under this namespace"
                    );
                }
                other => panic!("expected Api error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_whoami_unauthorized() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/api/whoami-v2");
                    then.status(401)
                        .json_body(json!({ "error": "Invalid credentials in Authorization header" }));
                })
                .await;

            let err = client_for(&server)
                .create_repository("my-merge")
                .await
                .unwrap_err();
            assert!(matches!(err, HubError::Api { status: 401, .. }));
            assert!(err.to_string().contains("Invalid credentials"));
        }

        #[tokio::test]
        async fn test_delete_repository() {
            let server = MockServer::start_async().await;
            let _whoami = mock_whoami(&server).await;
            let delete = server
                .mock_async(|when, then| {
                    when.method(DELETE)
                        .path("/api/repos/delete")
                        .header("authorization", format!("Bearer {TOKEN}"))
                        .json_body(json!({ "name": "my-merge", "organization": null }));
                    then.status(200);
                })
                .await;

            let id = RepoId::parse("alice/my-merge").unwrap();
            client_for(&server).delete_repository(&id).await.unwrap();
            delete.assert_async().await;
        }

        #[tokio::test]
        async fn test_delete_missing_repository() {
            let server = MockServer::start_async().await;
            let _whoami = mock_whoami(&server).await;
            server
                .mock_async(|when, then| {
                    when.method(DELETE).path("/api/repos/delete");
                    then.status(404).json_body(json!({ "error": "Repository not found" }));
                })
                .await;

            let id = RepoId::parse("alice/gone").unwrap();
            let err = client_for(&server).delete_repository(&id).await.unwrap_err();
            assert!(matches!(err, HubError::RepositoryNotFound(ref r) if r == "alice/gone"));
        }

        fn sha256_hex(content: &[u8]) -> String {
            let mut hasher = Sha256::new();
            hasher.update(content);
            hex::encode(hasher.finalize())
        }

        fn merge_dir() -> tempfile::TempDir {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("config.json"), b"{}").unwrap();
            std::fs::write(dir.path().join("model.safetensors"), b"weights").unwrap();
            dir
        }

        async fn mock_preupload(server: &MockServer) -> Mock<'_> {
            server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/api/models/alice/my-merge/preupload/main")
                        .json_body(json!({
                            "files": [
                                { "path": "config.json", "size": 2, "sample": "e30=" },
                                { "path": "model.safetensors", "size": 7, "sample": "d2VpZ2h0cw==" },
                            ],
                        }));
                    then.status(200).json_body(json!({
                        "files": [
                            { "path": "config.json", "uploadMode": "regular" },
                            { "path": "model.safetensors", "uploadMode": "lfs" },
                        ],
                    }));
                })
                .await
        }

        async fn mock_commit<'a>(server: &'a MockServer, oid: &str) -> Mock<'a> {
            let payload = upload::commit_payload(
                &HubConfig::default().commit_summary,
                &[
                    CommitOperation::Regular {
                        path: "config.json".to_string(),
                        content: b"{}".to_vec(),
                    },
                    CommitOperation::Lfs {
                        path: "model.safetensors".to_string(),
                        oid: oid.to_string(),
                        size: 7,
                    },
                ],
            )
            .unwrap();
            server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/api/models/alice/my-merge/commit/main")
                        .header("content-type", "application/x-ndjson")
                        .body(payload);
                    then.status(200).json_body(json!({
                        "commitUrl": "https://hub.example.com/alice/my-merge/commit/abc123",
                    }));
                })
                .await
        }

        fn handle_for(server: &MockServer) -> RepositoryHandle {
            RepositoryHandle {
                repo_id: RepoId::parse("alice/my-merge").unwrap(),
                url: format!("{}/alice/my-merge", server.base_url()),
            }
        }

        #[tokio::test]
        async fn test_upload_folder_regular_and_lfs() {
            let server = MockServer::start_async().await;
            let dir = merge_dir();
            let oid = sha256_hex(b"weights");

            let preupload = mock_preupload(&server).await;
            let batch = server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/alice/my-merge.git/info/lfs/objects/batch")
                        .header("content-type", LFS_CONTENT_TYPE);
                    then.status(200).json_body(json!({
                        "objects": [{
                            "oid": oid,
                            "size": 7,
                            "actions": {
                                "upload": { "href": server.url("/lfs/upload") },
                                "verify": { "href": server.url("/lfs/verify") },
                            },
                        }],
                    }));
                })
                .await;
            let put = server
                .mock_async(|when, then| {
                    when.method(PUT).path("/lfs/upload").body("weights");
                    then.status(200);
                })
                .await;
            let verify = server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/lfs/verify")
                        .json_body(json!({ "oid": oid, "size": 7 }));
                    then.status(200);
                })
                .await;
            let commit = mock_commit(&server, &oid).await;

            let summary = client_for(&server)
                .upload_folder(&handle_for(&server), dir.path())
                .await
                .unwrap();

            assert_eq!(summary.files, 2);
            assert_eq!(summary.lfs_files, 1);
            assert_eq!(summary.bytes, 9);
            assert_eq!(
                summary.commit_url.as_deref(),
                Some("https://hub.example.com/alice/my-merge/commit/abc123")
            );
            preupload.assert_async().await;
            batch.assert_async().await;
            put.assert_async().await;
            verify.assert_async().await;
            commit.assert_async().await;
        }

        #[tokio::test]
        async fn test_upload_folder_multipart_lfs() {
            let server = MockServer::start_async().await;
            let dir = merge_dir();
            let oid = sha256_hex(b"weights");

            let _preupload = mock_preupload(&server).await;
            server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/alice/my-merge.git/info/lfs/objects/batch");
                    then.status(200).json_body(json!({
                        "objects": [{
                            "oid": oid,
                            "size": 7,
                            "actions": {
                                "upload": {
                                    "href": server.url("/lfs/complete"),
                                    "header": {
                                        "chunk_size": "4",
                                        "1": server.url("/lfs/part/1"),
                                        "2": server.url("/lfs/part/2"),
                                    },
                                },
                            },
                        }],
                    }));
                })
                .await;
            let part1 = server
                .mock_async(|when, then| {
                    when.method(PUT).path("/lfs/part/1").body("weig");
                    then.status(200).header("etag", "\"e1\"");
                })
                .await;
            let part2 = server
                .mock_async(|when, then| {
                    when.method(PUT).path("/lfs/part/2").body("hts");
                    then.status(200).header("etag", "\"e2\"");
                })
                .await;
            let complete = server
                .mock_async(|when, then| {
                    when.method(POST).path("/lfs/complete").json_body(json!({
                        "oid": oid,
                        "parts": [
                            { "partNumber": 1, "etag": "\"e1\"" },
                            { "partNumber": 2, "etag": "\"e2\"" },
                        ],
                    }));
                    then.status(200);
                })
                .await;
            let commit = mock_commit(&server, &oid).await;

            let summary = client_for(&server)
                .upload_folder(&handle_for(&server), dir.path())
                .await
                .unwrap();

            assert_eq!(summary.lfs_files, 1);
            part1.assert_async().await;
            part2.assert_async().await;
            complete.assert_async().await;
            commit.assert_async().await;
        }

        #[tokio::test]
        async fn test_upload_folder_commit_rejected() {
            let server = MockServer::start_async().await;
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("config.json"), b"{}").unwrap();

            server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/api/models/alice/my-merge/preupload/main");
                    then.status(200).json_body(json!({
                        "files": [{ "path": "config.json", "uploadMode": "regular" }],
                    }));
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/api/models/alice/my-merge/commit/main");
                    then.status(500).body("upstream storage unavailable");
                })
                .await;

            let err = client_for(&server)
                .upload_folder(&handle_for(&server), dir.path())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                HubError::Api { status: 500, ref message } if message == "upstream storage unavailable"
            ));
        }
    }

    #[test]
    fn test_repo_url() {
        let client = HfHubClient::new(HubConfig::new("https://hub.example.com"), "tok").unwrap();
        let id = RepoId::parse("user/model").unwrap();
        assert_eq!(client.repo_url(&id), "https://hub.example.com/user/model");
        assert_eq!(
            client.api_url("repos/create"),
            "https://hub.example.com/api/repos/create"
        );
    }
}
