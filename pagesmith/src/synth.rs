//! Code synthesizer.
//!
//! The orchestrator only sees [`CodeSynthesizer`]: brief and checks in, page
//! source and README out, or a [`SynthesisError`]. [`LlmSynthesizer`] is the
//! production implementation backed by [`LlmClient`].

use async_trait::async_trait;

use crate::attachments::Attachment;
use crate::llm::{LlmClient, LlmError};
use crate::retry::{self, RetryError, RetryPolicy};
use crate::types::Round;

/// Characters of attachment text shown to the model.
const PREVIEW_CHARS: usize = 200;

const PAGE_SYSTEM: &str = "You generate production-ready single-file web applications: \
one HTML document with inline CSS and JavaScript. You reply with the HTML only.";

const README_SYSTEM: &str = "You write clear, professional README.md files in Markdown. \
You reply with the Markdown only.";

/// What the model is asked to build.
#[derive(Debug, Clone)]
pub struct SynthesisInput {
    pub repo_name: String,
    pub round: Round,
    pub brief: String,
    pub checks: Vec<String>,
    pub attachments: Vec<AttachmentSummary>,
}

/// What the model gets to know about an attachment.
#[derive(Debug, Clone)]
pub struct AttachmentSummary {
    pub name: String,
    pub media_type: String,
    pub preview: Option<String>,
}

impl From<&Attachment> for AttachmentSummary {
    fn from(a: &Attachment) -> Self {
        Self {
            name: a.name.clone(),
            media_type: a.media_type.clone(),
            preview: a.preview(PREVIEW_CHARS),
        }
    }
}

/// Model output for one round.
#[derive(Debug, Clone)]
pub struct SynthesizedCode {
    pub app_source: String,
    pub readme: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("model call failed: {0}")]
    Model(#[from] RetryError<LlmError>),
    #[error("model output unusable: {0}")]
    Unusable(String),
}

#[async_trait]
pub trait CodeSynthesizer: Send + Sync {
    async fn synthesize(&self, input: &SynthesisInput) -> Result<SynthesizedCode, SynthesisError>;
}

/// Synthesizer backed by the Claude API.
pub struct LlmSynthesizer {
    llm: LlmClient,
    retry: RetryPolicy,
}

impl LlmSynthesizer {
    pub fn new(llm: LlmClient, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    async fn complete(&self, op: &str, system: &str, prompt: &str) -> Result<String, SynthesisError> {
        let text = retry::retry(&self.retry, op, || self.llm.complete(system, prompt)).await?;
        Ok(strip_code_fences(&text))
    }
}

#[async_trait]
impl CodeSynthesizer for LlmSynthesizer {
    async fn synthesize(&self, input: &SynthesisInput) -> Result<SynthesizedCode, SynthesisError> {
        tracing::info!(repo = %input.repo_name, round = %input.round, model = self.llm.model(), "Generating page");
        let app_source = self
            .complete("generate page", PAGE_SYSTEM, &page_prompt(input))
            .await?;
        validate_page(&app_source)?;

        tracing::info!(repo = %input.repo_name, "Generating README");
        let readme = self
            .complete("generate readme", README_SYSTEM, &readme_prompt(input))
            .await?;
        if readme.trim().is_empty() {
            return Err(SynthesisError::Unusable("README is empty".into()));
        }

        Ok(SynthesizedCode { app_source, readme })
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn page_prompt(input: &SynthesisInput) -> String {
    let mut prompt = String::new();
    if input.round == Round::Revise {
        prompt.push_str(
            "This is a revision of an existing app. Rebuild the whole page so it meets the brief \
             and every requirement below.\n\n",
        );
    }
    prompt.push_str(&format!(
        "## Brief\n{}\n\n## Requirements\n{}\n",
        input.brief,
        bullet_list(&input.checks)
    ));
    if !input.attachments.is_empty() {
        prompt.push_str(
            "\n## Attachments\nThese files are published next to index.html; load them by relative path.\n",
        );
        for a in &input.attachments {
            prompt.push_str(&format!("- {} ({})", a.name, a.media_type));
            if let Some(preview) = &a.preview {
                prompt.push_str(&format!(", begins with:\n```\n{preview}\n```"));
            }
            prompt.push('\n');
        }
    }
    prompt.push_str(
        "\n## Rules\n\
         - Output one complete, self-contained index.html with inline CSS and JavaScript.\n\
         - No build step and no npm packages; load any library from a CDN (jsdelivr, cdnjs).\n\
         - Satisfy every requirement above.\n\
         - Do not use browser storage APIs unless the brief asks for them.\n\
         - Never embed secrets, API keys or credentials.\n\
         - Handle errors visibly in the UI.\n\
         - Reply with the HTML only, no explanation and no markdown fences.\n",
    );
    prompt
}

fn readme_prompt(input: &SynthesisInput) -> String {
    let mut files = String::from("- index.html: the application\n- LICENSE: MIT license\n");
    for a in &input.attachments {
        files.push_str(&format!("- {}: supplied data file\n", a.name));
    }
    format!(
        "Write a README.md for the project `{}` (round {}).\n\n\
         ## Brief\n{}\n\n## Requirements\n{}\n\n## Files\n{}\n\
         Include: title and summary, features, usage (open index.html or visit the GitHub Pages site), \
         file structure, technologies used, and a License section naming MIT.",
        input.repo_name,
        input.round,
        input.brief,
        bullet_list(&input.checks),
        files,
    )
}

/// Remove a surrounding ```lang ... ``` fence, if the model added one.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string ("html", "markdown", ...) on the opening line
    let body = after_open.split_once('\n').map_or("", |(_, rest)| rest);
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

fn validate_page(html: &str) -> Result<(), SynthesisError> {
    if html.len() < 50 {
        return Err(SynthesisError::Unusable(format!(
            "page is too short ({} bytes)",
            html.len()
        )));
    }
    let lower = html.to_ascii_lowercase();
    if !lower.contains("<!doctype") && !lower.contains("<html") {
        return Err(SynthesisError::Unusable("page is not an HTML document".into()));
    }
    Ok(())
}
