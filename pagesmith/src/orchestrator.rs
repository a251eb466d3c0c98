//! Round orchestrator: drives one request through the deployment pipeline.
//!
//! ```text
//! Received → Validated → Synthesized → Published → Completed
//!     └──────────┴────────────┴────────────┴──→ Failed(reason)
//! ```
//!
//! Round 1 creates the repository if needed; round 2 requires it to exist
//! and checks that before any model call. Steps within a request run
//! strictly in order; independent requests share nothing mutable.

use std::fmt;
use std::sync::Arc;

use crate::artifact::GeneratedArtifact;
use crate::attachments;
use crate::error::{DeployError, DeployResult};
use crate::naming::ArtifactName;
use crate::notify::Notifier;
use crate::publisher::{EnsureMode, RepositoryPublisher};
use crate::synth::{AttachmentSummary, CodeSynthesizer, SynthesisInput};
use crate::types::{DeploymentResult, Round, TaskRequest};

/// Pipeline state of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Received,
    Validated,
    Synthesized,
    Published,
    Completed,
    Failed(String),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed(_))
    }

    /// Whether `next` may follow this phase.
    pub fn can_advance_to(&self, next: &Phase) -> bool {
        match (self, next) {
            (Phase::Received, Phase::Validated)
            | (Phase::Validated, Phase::Synthesized)
            | (Phase::Synthesized, Phase::Published)
            | (Phase::Published, Phase::Completed) => true,
            (current, Phase::Failed(_)) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Received => write!(f, "received"),
            Phase::Validated => write!(f, "validated"),
            Phase::Synthesized => write!(f, "synthesized"),
            Phase::Published => write!(f, "published"),
            Phase::Completed => write!(f, "completed"),
            Phase::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Phase tracker for a single run.
struct Progress<'a> {
    repo: &'a str,
    phase: Phase,
}

impl<'a> Progress<'a> {
    fn new(repo: &'a str) -> Self {
        tracing::info!(repo, "Request received");
        Self {
            repo,
            phase: Phase::Received,
        }
    }

    fn advance(&mut self, next: Phase) -> DeployResult<()> {
        if !self.phase.can_advance_to(&next) {
            return Err(DeployError::Internal(format!(
                "illegal transition {} -> {next}",
                self.phase
            )));
        }
        tracing::debug!(repo = self.repo, from = %self.phase, to = %next, "Phase change");
        self.phase = next;
        Ok(())
    }

    fn fail(&mut self, error: &DeployError) {
        let reason = error.to_string();
        tracing::error!(repo = self.repo, phase = %self.phase, kind = error.kind(), %reason, "Deployment failed");
        if self.phase.can_advance_to(&Phase::Failed(reason.clone())) {
            self.phase = Phase::Failed(reason);
        }
    }
}

/// Collaborators shared by every request. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    synthesizer: Arc<dyn CodeSynthesizer>,
    publisher: RepositoryPublisher,
    notifier: Notifier,
}

impl Orchestrator {
    pub fn new(synthesizer: Arc<dyn CodeSynthesizer>, publisher: RepositoryPublisher, notifier: Notifier) -> Self {
        Self {
            synthesizer,
            publisher,
            notifier,
        }
    }

    /// Run one request to completion. The evaluation callback, if any, is
    /// notified in the background and cannot change the outcome.
    pub async fn run(&self, request: &TaskRequest) -> DeployResult<DeploymentResult> {
        let name = ArtifactName::derive(&request.task, &request.nonce);
        let mut progress = Progress::new(name.as_str());

        match self.execute(request, &name, &mut progress).await {
            Ok(result) => {
                progress.advance(Phase::Completed)?;
                tracing::info!(
                    repo = %name,
                    round = %request.round,
                    commit = %result.commit_sha,
                    pages = %result.pages_url,
                    "Deployment completed"
                );
                if let Some(url) = &request.evaluation_url {
                    self.notifier.spawn(url, &result);
                }
                Ok(result)
            }
            Err(e) => {
                progress.fail(&e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &TaskRequest,
        name: &ArtifactName,
        progress: &mut Progress<'_>,
    ) -> DeployResult<DeploymentResult> {
        request.validate()?;
        progress.advance(Phase::Validated)?;

        let attachments = attachments::materialize(&request.attachments)?;

        if request.round == Round::Revise {
            self.publisher
                .ensure_repository(name, EnsureMode::RequireExisting)
                .await?;
        }

        let input = SynthesisInput {
            repo_name: name.to_string(),
            round: request.round,
            brief: request.brief.clone(),
            checks: request.checks.clone(),
            attachments: attachments.iter().map(AttachmentSummary::from).collect(),
        };
        let code = self.synthesizer.synthesize(&input).await?;
        progress.advance(Phase::Synthesized)?;

        if request.round == Round::Create {
            let existed = self
                .publisher
                .ensure_repository(name, EnsureMode::CreateIfMissing)
                .await?;
            if existed {
                tracing::info!(repo = %name, "Round 1 re-run, rewriting existing repository");
            }
        }

        let files = GeneratedArtifact::new(code, self.publisher.owner()).into_files(attachments);
        self.publisher
            .write_files(name, &files, request.round)
            .await?;
        let pages_url = self.publisher.enable_hosting(name).await?;
        let commit_sha = self.publisher.resolve_version(name).await?;
        progress.advance(Phase::Published)?;

        Ok(DeploymentResult {
            email: request.email.clone(),
            task: request.task.clone(),
            round: request.round,
            nonce: request.nonce.clone(),
            repo_url: name.repo_url(self.publisher.owner()),
            commit_sha,
            pages_url,
        })
    }
}
