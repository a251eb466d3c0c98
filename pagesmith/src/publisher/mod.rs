//! Repository publisher.
//!
//! [`RepositoryHost`] is the seam to the hosting platform: one method per
//! remote call, no policy. [`RepositoryPublisher`] layers the publishing
//! semantics on top: create-or-reuse, per-file create-or-update, idempotent
//! Pages enablement, and the retry envelope around every remote call.
//!
//! - `github`: GitHub REST implementation
//! - `memory`: in-process implementation for tests and dry runs

pub mod github;
pub mod memory;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::FileEntry;
use crate::naming::ArtifactName;
use crate::retry::{self, RetryError, RetryPolicy, Retryable};
use crate::types::Round;

pub use github::{GithubHost, GithubSettings};
pub use memory::InMemoryHost;

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Network failure, timeout, rate limit or 5xx. Worth retrying.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    /// The platform refused the request (auth, permissions, conflicts).
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
}

impl Retryable for RemoteError {
    fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

/// Result of asking the platform to turn on static hosting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagesStatus {
    /// Hosting was switched on by this call.
    Enabled { url: Option<String> },
    /// Hosting was already on; nothing changed.
    AlreadyEnabled,
}

/// Remote operations the publisher needs from a hosting platform.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Account that owns published repositories.
    fn owner(&self) -> &str;

    async fn repository_exists(&self, repo: &str) -> Result<bool, RemoteError>;

    /// Create an empty public repository. Returns `false` if it turned out
    /// to exist already.
    async fn create_repository(&self, repo: &str) -> Result<bool, RemoteError>;

    /// Current version marker of a file, `None` if the path does not exist.
    async fn file_version(&self, repo: &str, path: &str) -> Result<Option<String>, RemoteError>;

    /// Create or update one file. Updates must pass the marker returned by
    /// [`file_version`](Self::file_version).
    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        content: &[u8],
        prior_version: Option<&str>,
        message: &str,
    ) -> Result<(), RemoteError>;

    async fn enable_pages(&self, repo: &str) -> Result<PagesStatus, RemoteError>;

    /// Hosting URL of a repository with Pages enabled.
    async fn pages_url(&self, repo: &str) -> Result<Option<String>, RemoteError>;

    /// Version identifier of the published branch tip.
    async fn head_version(&self, repo: &str) -> Result<String, RemoteError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("{op} failed: {source}")]
    Remote {
        op: &'static str,
        source: RetryError<RemoteError>,
    },
    #[error("repository {0} does not exist; round 2 needs a published round 1")]
    LineageMissing(String),
    #[error("writing {failed} failed (written: {written:?}, not attempted: {pending:?}): {source}")]
    PartialWrite {
        written: Vec<String>,
        failed: String,
        pending: Vec<String>,
        source: RetryError<RemoteError>,
    },
}

impl PublishError {
    /// The remote failure behind this error, if there is one.
    pub fn remote_cause(&self) -> Option<&RetryError<RemoteError>> {
        match self {
            PublishError::Remote { source, .. } | PublishError::PartialWrite { source, .. } => {
                Some(source)
            }
            PublishError::LineageMissing(_) => None,
        }
    }
}

/// How [`RepositoryPublisher::ensure_repository`] treats a missing repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureMode {
    /// Round 1: create it.
    CreateIfMissing,
    /// Round 2: a missing repository means the lineage never existed.
    RequireExisting,
}

/// The only writer of remote artifacts.
#[derive(Clone)]
pub struct RepositoryPublisher {
    host: Arc<dyn RepositoryHost>,
    retry: RetryPolicy,
}

impl RepositoryPublisher {
    pub fn new(host: Arc<dyn RepositoryHost>, retry: RetryPolicy) -> Self {
        Self { host, retry }
    }

    pub fn owner(&self) -> &str {
        self.host.owner()
    }

    async fn remote<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, PublishError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        retry::retry(&self.retry, op, f)
            .await
            .map_err(|source| PublishError::Remote { op, source })
    }

    /// Make sure the repository exists. Returns whether it existed before
    /// this call.
    pub async fn ensure_repository(&self, name: &ArtifactName, mode: EnsureMode) -> Result<bool, PublishError> {
        let repo = name.as_str();
        if self
            .remote("check repository", || self.host.repository_exists(repo))
            .await?
        {
            tracing::debug!(repo, "Repository already exists");
            return Ok(true);
        }
        match mode {
            EnsureMode::RequireExisting => Err(PublishError::LineageMissing(repo.to_string())),
            EnsureMode::CreateIfMissing => {
                let created = self
                    .remote("create repository", || self.host.create_repository(repo))
                    .await?;
                if created {
                    tracing::info!(repo, owner = self.owner(), "Created repository");
                } else {
                    tracing::info!(repo, "Repository appeared concurrently, reusing it");
                }
                Ok(!created)
            }
        }
    }

    /// Write files one by one with create-or-update semantics.
    ///
    /// The current version of each path is fetched right before its update,
    /// inside the retried unit, so a retry never reuses a stale marker. There
    /// is no multi-file transaction: a failure reports which paths landed.
    pub async fn write_files(&self, name: &ArtifactName, files: &[FileEntry], round: Round) -> Result<(), PublishError> {
        let repo = name.as_str();
        let host = &self.host;
        let mut written = Vec::with_capacity(files.len());

        for (i, file) in files.iter().enumerate() {
            let path = file.path.as_str();
            let content = file.content.as_slice();
            let commit_message = format!("Round {round}: update {path}");
            let message = commit_message.as_str();

            let result = retry::retry(&self.retry, "write file", move || async move {
                let prior = host.file_version(repo, path).await?;
                host.put_file(repo, path, content, prior.as_deref(), message)
                    .await
            })
            .await;

            match result {
                Ok(()) => {
                    tracing::debug!(repo, path, bytes = content.len(), "Wrote file");
                    written.push(path.to_string());
                }
                Err(source) => {
                    let pending: Vec<String> = files[i + 1..].iter().map(|f| f.path.clone()).collect();
                    tracing::error!(repo, path, ?written, ?pending, error = %source, "Write failed partway");
                    return Err(PublishError::PartialWrite {
                        written,
                        failed: path.to_string(),
                        pending,
                        source,
                    });
                }
            }
        }
        tracing::info!(repo, files = written.len(), "Files published");
        Ok(())
    }

    /// Turn on static hosting (no-op if already on) and return its URL.
    pub async fn enable_hosting(&self, name: &ArtifactName) -> Result<String, PublishError> {
        let repo = name.as_str();
        let url = match self
            .remote("enable pages", || self.host.enable_pages(repo))
            .await?
        {
            PagesStatus::Enabled { url } => {
                tracing::info!(repo, "Enabled Pages");
                url
            }
            PagesStatus::AlreadyEnabled => {
                tracing::debug!(repo, "Pages already enabled");
                self.remote("read pages", || self.host.pages_url(repo))
                    .await?
            }
        };
        Ok(url.unwrap_or_else(|| name.pages_url(self.owner())))
    }

    /// Version identifier of the repository after the writes.
    pub async fn resolve_version(&self, name: &ArtifactName) -> Result<String, PublishError> {
        let repo = name.as_str();
        self.remote("resolve version", || self.host.head_version(repo))
            .await
    }
}
