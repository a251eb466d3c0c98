//! Error taxonomy of a deployment request.

use axum::http::StatusCode;

use crate::attachments::AttachmentError;
use crate::publisher::{PublishError, RemoteError};
use crate::retry::RetryError;
use crate::synth::SynthesisError;

/// Result type alias using [`DeployError`].
pub type DeployResult<T> = Result<T, DeployError>;

/// Why a request did not produce a deployment.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Missing or malformed request fields. Nothing remote was touched.
    #[error("{0}")]
    Validation(String),

    #[error("invalid secret")]
    Unauthorized,

    #[error("attachment decode failed: {0}")]
    Attachment(#[from] AttachmentError),

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Internal invariant broken (e.g. an illegal phase transition).
    #[error("internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Stable name of the failure kind, reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Validation(_) => "ValidationError",
            DeployError::Unauthorized => "AuthError",
            DeployError::Attachment(_) => "AttachmentDecodeFailed",
            DeployError::Synthesis(_) => "SynthesisFailed",
            DeployError::Internal(_) => "InternalError",
            DeployError::Publish(PublishError::LineageMissing(_)) => "NotFound",
            // a failed write is classified by its cause; the file lists ride along
            DeployError::Publish(
                PublishError::Remote { source, .. } | PublishError::PartialWrite { source, .. },
            ) => remote_kind(source),
        }
    }

    /// HTTP status the failure is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            DeployError::Validation(_) => StatusCode::BAD_REQUEST,
            DeployError::Unauthorized => StatusCode::UNAUTHORIZED,
            e if e.is_missing_lineage() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when a round 2 request named a lineage that was never published.
    pub fn is_missing_lineage(&self) -> bool {
        matches!(self, DeployError::Publish(PublishError::LineageMissing(_)))
    }
}

fn remote_kind(source: &RetryError<RemoteError>) -> &'static str {
    match source {
        RetryError::Exhausted { .. } => "RetriesExhausted",
        RetryError::Aborted(RemoteError::Rejected { .. }) => "RemoteRejected",
        RetryError::Aborted(RemoteError::NotFound(_)) => "NotFound",
        RetryError::Aborted(RemoteError::Unavailable(_)) => "RemoteUnavailable",
    }
}
