//! Best-effort delivery of results to the caller's evaluation callback.
//!
//! Delivery runs in its own task so the HTTP response never waits on it.
//! Each attempt has a request timeout and the whole delivery an overall
//! deadline; the outcome is only logged.

use std::time::Duration;

use crate::retry::{self, RetryError, RetryPolicy, Retryable};
use crate::types::DeploymentResult;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("callback unreachable: {0}")]
    Transport(String),
    #[error("callback answered {0}")]
    Status(u16),
}

impl Retryable for NotifyError {
    fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Transport(_) => true,
            NotifyError::Status(code) => *code == 429 || *code >= 500,
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    http: reqwest::Client,
    retry: RetryPolicy,
    deadline: Duration,
}

impl Notifier {
    pub fn new(attempt_timeout: Duration, retry: RetryPolicy, deadline: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(attempt_timeout).build()?;
        Ok(Self {
            http,
            retry,
            deadline,
        })
    }

    /// Deliver `result` to `url` in the background.
    ///
    /// The returned handle resolves to whether delivery succeeded; callers
    /// are free to drop it.
    pub fn spawn(&self, url: &str, result: &DeploymentResult) -> tokio::task::JoinHandle<bool> {
        let this = self.clone();
        let url = url.to_string();
        let payload = result.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(this.deadline, this.deliver(&url, &payload)).await {
                Ok(Ok(())) => {
                    tracing::info!(%url, task = %payload.task, "Evaluation callback notified");
                    true
                }
                Ok(Err(e)) => {
                    tracing::warn!(%url, task = %payload.task, error = %e, "Evaluation callback failed");
                    false
                }
                Err(_) => {
                    tracing::warn!(
                        %url,
                        deadline_secs = this.deadline.as_secs(),
                        "Evaluation callback timed out"
                    );
                    false
                }
            }
        })
    }

    /// POST the result, retrying transient failures.
    pub async fn deliver(&self, url: &str, payload: &DeploymentResult) -> Result<(), RetryError<NotifyError>> {
        let http = &self.http;
        retry::retry(&self.retry, "notify", move || async move {
            let resp = http
                .post(url)
                .json(payload)
                .send()
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            let status = resp.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(NotifyError::Status(status.as_u16()))
            }
        })
        .await
    }
}
