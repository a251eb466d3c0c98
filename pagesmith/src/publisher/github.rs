//! GitHub REST implementation of [`RepositoryHost`].
//!
//! Status mapping: network errors, 429, 5xx and exhausted rate limits are
//! `Unavailable`; 404 is `NotFound`; every other 4xx is `Rejected`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{PagesStatus, RemoteError, RepositoryHost};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Characters left alone in a URL path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Longest response body quoted in an error.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub api_base: String,
    pub owner: String,
    pub token: String,
    /// Branch that receives commits and serves Pages.
    pub branch: String,
    pub request_timeout: Duration,
}

pub struct GithubHost {
    settings: GithubSettings,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Deserialize)]
struct PagesInfo {
    html_url: Option<String>,
}

impl GithubHost {
    pub fn new(mut settings: GithubSettings) -> Result<Self, reqwest::Error> {
        settings.api_base = settings.api_base.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .user_agent(concat!("pagesmith/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self { settings, http })
    }

    fn repo_path(&self, repo: &str) -> String {
        format!(
            "/repos/{}/{}",
            utf8_percent_encode(&self.settings.owner, SEGMENT),
            utf8_percent_encode(repo, SEGMENT)
        )
    }

    fn contents_path(&self, repo: &str, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|seg| utf8_percent_encode(seg, SEGMENT).to_string())
            .collect();
        format!("{}/contents/{}", self.repo_path(repo), encoded.join("/"))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.settings.api_base))
            .bearer_auth(&self.settings.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, what: &str, req: RequestBuilder) -> Result<Response, RemoteError> {
        req.send()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("{what}: {e}")))
    }

    async fn json<T: serde::de::DeserializeOwned>(what: &str, resp: Response) -> Result<T, RemoteError> {
        // a truncated or garbled body is treated like a failed transfer
        resp.json::<T>()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("{what}: unreadable response: {e}")))
    }
}

/// Turn an unexpected response into a [`RemoteError`].
async fn classify(what: &str, resp: Response) -> RemoteError {
    let status = resp.status();
    let rate_limited = status == StatusCode::FORBIDDEN
        && resp
            .headers()
            .get("x-ratelimit-remaining")
            .is_some_and(|v| v.as_bytes() == b"0");
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    if status == StatusCode::NOT_FOUND {
        RemoteError::NotFound(what.to_string())
    } else if rate_limited || status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RemoteError::Unavailable(format!("{what}: {status}: {body}"))
    } else {
        RemoteError::Rejected {
            status: status.as_u16(),
            message: format!("{what}: {body}"),
        }
    }
}

#[async_trait]
impl RepositoryHost for GithubHost {
    fn owner(&self) -> &str {
        &self.settings.owner
    }

    async fn repository_exists(&self, repo: &str) -> Result<bool, RemoteError> {
        let what = "get repository";
        let resp = self
            .send(what, self.request(Method::GET, &self.repo_path(repo)))
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(classify(what, resp).await),
        }
    }

    async fn create_repository(&self, repo: &str) -> Result<bool, RemoteError> {
        let what = "create repository";
        let body = json!({
            "name": repo,
            "private": false,
            "auto_init": false,
            "description": format!("Auto-generated app: {repo}"),
        });
        let resp = self
            .send(what, self.request(Method::POST, "/user/repos").json(&body))
            .await?;
        match resp.status() {
            StatusCode::CREATED => Ok(true),
            // "name already exists on this account"
            StatusCode::UNPROCESSABLE_ENTITY => Ok(false),
            _ => Err(classify(what, resp).await),
        }
    }

    async fn file_version(&self, repo: &str, path: &str) -> Result<Option<String>, RemoteError> {
        let what = "get file";
        let req = self
            .request(Method::GET, &self.contents_path(repo, path))
            .query(&[("ref", self.settings.branch.as_str())]);
        let resp = self.send(what, req).await?;
        match resp.status() {
            StatusCode::OK => Ok(Some(Self::json::<ShaRef>(what, resp).await?.sha)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(classify(what, resp).await),
        }
    }

    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        content: &[u8],
        prior_version: Option<&str>,
        message: &str,
    ) -> Result<(), RemoteError> {
        let what = "put file";
        let mut body = json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "branch": &self.settings.branch,
        });
        if let Some(sha) = prior_version {
            body["sha"] = json!(sha);
        }
        let resp = self
            .send(
                what,
                self.request(Method::PUT, &self.contents_path(repo, path)).json(&body),
            )
            .await?;
        match resp.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            _ => Err(classify(what, resp).await),
        }
    }

    async fn enable_pages(&self, repo: &str) -> Result<PagesStatus, RemoteError> {
        let what = "enable pages";
        let body = json!({
            "build_type": "legacy",
            "source": { "branch": &self.settings.branch, "path": "/" },
        });
        let resp = self
            .send(
                what,
                self.request(Method::POST, &format!("{}/pages", self.repo_path(repo)))
                    .json(&body),
            )
            .await?;
        match resp.status() {
            StatusCode::CREATED => {
                let info = Self::json::<PagesInfo>(what, resp).await?;
                Ok(PagesStatus::Enabled { url: info.html_url })
            }
            StatusCode::CONFLICT => Ok(PagesStatus::AlreadyEnabled),
            _ => Err(classify(what, resp).await),
        }
    }

    async fn pages_url(&self, repo: &str) -> Result<Option<String>, RemoteError> {
        let what = "get pages";
        let resp = self
            .send(
                what,
                self.request(Method::GET, &format!("{}/pages", self.repo_path(repo))),
            )
            .await?;
        match resp.status() {
            StatusCode::OK => Ok(Self::json::<PagesInfo>(what, resp).await?.html_url),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(classify(what, resp).await),
        }
    }

    async fn head_version(&self, repo: &str) -> Result<String, RemoteError> {
        let what = "get head commit";
        let path = format!(
            "{}/commits/{}",
            self.repo_path(repo),
            utf8_percent_encode(&self.settings.branch, SEGMENT)
        );
        let resp = self.send(what, self.request(Method::GET, &path)).await?;
        if resp.status().is_success() {
            Ok(Self::json::<ShaRef>(what, resp).await?.sha)
        } else {
            Err(classify(what, resp).await)
        }
    }
}
