//! Process configuration.
//!
//! Parsed once in `main` from flags and environment, then handed to the
//! components that need it. Nothing below `main` reads the environment.

use std::time::Duration;

use clap::Parser;

use crate::llm;
use crate::publisher::github;
use crate::retry::RetryPolicy;

#[derive(Parser, Debug, Clone)]
#[command(name = "pagesmith", about = "Generate single-page apps with an LLM and publish them to GitHub Pages")]
pub struct Config {
    /// Address to listen on (host:port)
    #[arg(long, env = "PAGESMITH_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: String,

    /// Shared secret callers must send in the `secret` field
    #[arg(long, env = "PAGESMITH_SECRET", hide_env_values = true)]
    pub secret: String,

    /// GitHub token with repo and pages scope
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, required_unless_present = "dry_run")]
    pub github_token: Option<String>,

    /// Account that owns the generated repositories
    #[arg(long, env = "GITHUB_OWNER")]
    pub github_owner: String,

    #[arg(long, env = "GITHUB_API_BASE", default_value = github::DEFAULT_API_BASE)]
    pub github_api_base: String,

    /// Branch that receives commits and serves Pages
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Claude model to use
    #[arg(long, env = "PAGESMITH_MODEL", default_value = llm::DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, env = "ANTHROPIC_API_BASE", default_value = llm::DEFAULT_API_BASE)]
    pub llm_api_base: String,

    /// Attempts per remote call (GitHub and model API)
    #[arg(long, default_value_t = 4)]
    pub retry_attempts: u32,

    /// First backoff delay in milliseconds; doubles per attempt
    #[arg(long, default_value_t = 500)]
    pub retry_base_ms: u64,

    /// Timeout of a single GitHub request, in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Timeout of a single model completion, in seconds
    #[arg(long, default_value_t = 180)]
    pub llm_timeout_secs: u64,

    /// Attempts when posting to an evaluation callback
    #[arg(long, default_value_t = 5)]
    pub notify_attempts: u32,

    /// Timeout of a single callback POST, in seconds
    #[arg(long, default_value_t = 30)]
    pub notify_timeout_secs: u64,

    /// Give up on a callback after this many seconds in total
    #[arg(long, default_value_t = 120)]
    pub notify_deadline_secs: u64,

    /// Largest accepted request body in bytes (attachments travel inline)
    #[arg(long, default_value_t = 25 * 1024 * 1024)]
    pub body_limit: usize,

    /// Publish to an in-memory host instead of GitHub
    #[arg(long, env = "PAGESMITH_DRY_RUN")]
    pub dry_run: bool,

    /// Emit JSON logs
    #[arg(long, env = "PAGESMITH_LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_base_ms))
    }

    /// 1s, 2s, 4s, 8s between callback attempts.
    pub fn notify_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.notify_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            jitter: true,
        }
    }

    pub fn github_settings(&self) -> Option<github::GithubSettings> {
        Some(github::GithubSettings {
            api_base: self.github_api_base.clone(),
            owner: self.github_owner.clone(),
            token: self.github_token.clone()?,
            branch: self.branch.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}
