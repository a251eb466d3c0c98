//! Request and result types shared by the HTTP layer and the orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attachments::AttachmentInput;
use crate::error::DeployError;

/// Lifecycle round of a task lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Round {
    /// Round 1: build the artifact and create its repository.
    Create,
    /// Round 2: revise an artifact that round 1 already published.
    Revise,
}

impl Round {
    pub fn number(self) -> u8 {
        match self {
            Round::Create => 1,
            Round::Revise => 2,
        }
    }
}

impl TryFrom<u8> for Round {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Round::Create),
            2 => Ok(Round::Revise),
            other => Err(format!("invalid round {other}: must be 1 or 2")),
        }
    }
}

impl From<Round> for u8 {
    fn from(round: Round) -> u8 {
        round.number()
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A validated deployment request.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task: String,
    pub round: Round,
    pub nonce: String,
    pub brief: String,
    pub checks: Vec<String>,
    pub email: Option<String>,
    pub evaluation_url: Option<String>,
    pub attachments: Vec<AttachmentInput>,
}

impl TaskRequest {
    /// Check the invariants the wire format cannot express.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.task.trim().is_empty() {
            return Err(DeployError::Validation("task must not be blank".into()));
        }
        if self.nonce.trim().is_empty() {
            return Err(DeployError::Validation("nonce must not be blank".into()));
        }
        if let Some(url) = &self.evaluation_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(DeployError::Validation(format!(
                "evaluation_url must be an http(s) URL, got {url:?}"
            )));
        }
        Ok(())
    }
}

/// Outcome of a completed round, returned to the caller and forwarded to
/// the evaluation callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub email: Option<String>,
    pub task: String,
    pub round: Round,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}
