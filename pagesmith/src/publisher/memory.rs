//! In-process repository host.
//!
//! Behaves like the GitHub contents API where it matters to the publisher:
//! updates must carry the current file version, writing unchanged content
//! does not produce a new commit, and Pages can only be enabled once.
//! Faults can be queued per operation to exercise the retry paths.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{PagesStatus, RemoteError, RepositoryHost};

/// Remote operations, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    RepositoryExists,
    CreateRepository,
    FileVersion,
    PutFile,
    EnablePages,
    PagesUrl,
    HeadVersion,
}

#[derive(Debug, Default)]
struct Repo {
    files: BTreeMap<String, StoredFile>,
    pages: bool,
    head: Option<String>,
}

#[derive(Debug)]
struct StoredFile {
    content: Vec<u8>,
    version: String,
}

#[derive(Default)]
struct State {
    repos: HashMap<String, Repo>,
    faults: VecDeque<(HostOp, RemoteError)>,
    calls: HashMap<HostOp, usize>,
    created: usize,
    pages_enabled: usize,
}

impl State {
    /// Count the call and pop the first fault queued for `op`.
    fn enter(&mut self, op: HostOp) -> Result<(), RemoteError> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(i) = self.faults.iter().position(|(o, _)| *o == op)
            && let Some((_, error)) = self.faults.remove(i)
        {
            return Err(error);
        }
        Ok(())
    }

    fn repo(&mut self, name: &str) -> Result<&mut Repo, RemoteError> {
        self.repos
            .get_mut(name)
            .ok_or_else(|| RemoteError::NotFound(format!("repository {name}")))
    }
}

pub struct InMemoryHost {
    owner: String,
    state: Mutex<State>,
}

impl InMemoryHost {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// Make the next call of `op` fail with `error`. Faults queue up.
    pub fn fail_next(&self, op: HostOp, error: RemoteError) {
        self.state.lock().faults.push_back((op, error));
    }

    /// How many times `op` was invoked, failed calls included.
    pub fn calls(&self, op: HostOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Repositories actually created.
    pub fn repositories_created(&self) -> usize {
        self.state.lock().created
    }

    /// Times Pages was switched from off to on.
    pub fn pages_enabled(&self) -> usize {
        self.state.lock().pages_enabled
    }

    pub fn has_repository(&self, repo: &str) -> bool {
        self.state.lock().repos.contains_key(repo)
    }

    pub fn file(&self, repo: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        Some(state.repos.get(repo)?.files.get(path)?.content.clone())
    }

    pub fn paths(&self, repo: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .repos
            .get(repo)
            .map(|r| r.files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update([0u8]);
    }
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(40);
    hex
}

#[async_trait]
impl RepositoryHost for InMemoryHost {
    fn owner(&self) -> &str {
        &self.owner
    }

    async fn repository_exists(&self, repo: &str) -> Result<bool, RemoteError> {
        let mut state = self.state.lock();
        state.enter(HostOp::RepositoryExists)?;
        Ok(state.repos.contains_key(repo))
    }

    async fn create_repository(&self, repo: &str) -> Result<bool, RemoteError> {
        let mut state = self.state.lock();
        state.enter(HostOp::CreateRepository)?;
        if state.repos.contains_key(repo) {
            return Ok(false);
        }
        state.repos.insert(repo.to_string(), Repo::default());
        state.created += 1;
        Ok(true)
    }

    async fn file_version(&self, repo: &str, path: &str) -> Result<Option<String>, RemoteError> {
        let mut state = self.state.lock();
        state.enter(HostOp::FileVersion)?;
        Ok(state.repo(repo)?.files.get(path).map(|f| f.version.clone()))
    }

    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        content: &[u8],
        prior_version: Option<&str>,
        _message: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.enter(HostOp::PutFile)?;
        let repo = state.repo(repo)?;

        let current = repo.files.get(path).map(|f| f.version.as_str());
        if current != prior_version {
            let (status, message) = match current {
                Some(_) if prior_version.is_none() => (422, "\"sha\" wasn't supplied"),
                _ => (409, "version does not match"),
            };
            return Err(RemoteError::Rejected {
                status,
                message: format!("{path}: {message}"),
            });
        }
        if repo.files.get(path).is_some_and(|f| f.content == content) {
            return Ok(());
        }

        let version = digest(&[path.as_bytes(), content]);
        let head = repo.head.as_deref().unwrap_or_default();
        let commit = digest(&[head.as_bytes(), path.as_bytes(), version.as_bytes()]);
        repo.files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_vec(),
                version,
            },
        );
        repo.head = Some(commit);
        Ok(())
    }

    async fn enable_pages(&self, repo: &str) -> Result<PagesStatus, RemoteError> {
        let mut state = self.state.lock();
        state.enter(HostOp::EnablePages)?;
        let entry = state.repo(repo)?;
        if entry.pages {
            return Ok(PagesStatus::AlreadyEnabled);
        }
        entry.pages = true;
        state.pages_enabled += 1;
        Ok(PagesStatus::Enabled { url: None })
    }

    async fn pages_url(&self, repo: &str) -> Result<Option<String>, RemoteError> {
        let mut state = self.state.lock();
        state.enter(HostOp::PagesUrl)?;
        let pages = state.repo(repo)?.pages;
        Ok(pages.then(|| format!("https://{}.github.io/{repo}/", self.owner.to_ascii_lowercase())))
    }

    async fn head_version(&self, repo: &str) -> Result<String, RemoteError> {
        let mut state = self.state.lock();
        state.enter(HostOp::HeadVersion)?;
        state
            .repo(repo)?
            .head
            .clone()
            .ok_or_else(|| RemoteError::Rejected {
                status: 409,
                message: format!("repository {repo} is empty"),
            })
    }
}
