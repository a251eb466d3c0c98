//! HTTP surface: the task endpoint and a liveness probe.
//!
//! The handler only parses, authenticates and validates; everything else is
//! the orchestrator's job. Errors leave as `{error, message}` JSON bodies.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tower_http::cors::CorsLayer;

use crate::attachments::AttachmentInput;
use crate::error::DeployError;
use crate::orchestrator::Orchestrator;
use crate::publisher::PublishError;
use crate::types::{Round, TaskRequest};

const REQUIRED_FIELDS: [&str; 6] = ["email", "task", "round", "nonce", "brief", "checks"];

pub struct AppState {
    secret_digest: [u8; 32],
    orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(secret: &str, orchestrator: Orchestrator) -> Self {
        Self {
            secret_digest: Sha256::digest(secret.as_bytes()).into(),
            orchestrator,
        }
    }

    /// Digests have a fixed length, so the comparison leaks neither the
    /// secret's length nor the position of the first difference.
    fn secret_matches(&self, candidate: &str) -> bool {
        let digest = Sha256::digest(candidate.as_bytes());
        digest.as_slice().ct_eq(self.secret_digest.as_slice()).into()
    }
}

pub fn router(state: Arc<AppState>, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/handle_task", post(handle_task))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pagesmith",
    }))
}

/// Body fields after the presence check. `round` stays loose so a bad value
/// yields a precise message.
#[derive(Deserialize)]
struct TaskBody {
    email: String,
    task: String,
    round: Value,
    nonce: String,
    brief: String,
    checks: Vec<String>,
    #[serde(default)]
    evaluation_url: Option<String>,
    #[serde(default)]
    attachments: Option<Vec<AttachmentInput>>,
}

async fn handle_task(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<Value>, DeployError> {
    let request = parse_request(&state, &body)?;
    tracing::info!(
        task = %request.task,
        round = %request.round,
        nonce = %request.nonce,
        attachments = request.attachments.len(),
        "Task received"
    );

    let result = state.orchestrator.run(&request).await?;
    Ok(Json(serde_json::json!({
        "message": format!("Round {} completed successfully", request.round),
        "result": result,
    })))
}

fn parse_request(state: &AppState, body: &[u8]) -> Result<TaskRequest, DeployError> {
    let fields: Map<String, Value> = serde_json::from_slice(body)
        .map_err(|e| DeployError::Validation(format!("request body must be a JSON object: {e}")))?;

    match fields.get("secret").and_then(Value::as_str) {
        Some(secret) if state.secret_matches(secret) => {}
        _ => return Err(DeployError::Unauthorized),
    }

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| fields.get(*f).is_none_or(Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(DeployError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let body: TaskBody = serde_json::from_value(Value::Object(fields))
        .map_err(|e| DeployError::Validation(format!("invalid field: {e}")))?;

    let round = body
        .round
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| format!("invalid round {}: must be 1 or 2", body.round))
        .and_then(Round::try_from)
        .map_err(DeployError::Validation)?;

    let request = TaskRequest {
        task: body.task,
        round,
        nonce: body.nonce,
        brief: body.brief,
        checks: body.checks,
        email: Some(body.email),
        evaluation_url: body.evaluation_url,
        attachments: body.attachments.unwrap_or_default(),
    };
    request.validate()?;
    Ok(request)
}

impl IntoResponse for DeployError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let DeployError::Publish(PublishError::PartialWrite {
            written,
            failed,
            pending,
            ..
        }) = &self
        {
            body["written"] = serde_json::json!(written);
            body["failed"] = serde_json::json!(failed);
            body["pending"] = serde_json::json!(pending);
        }
        (status, Json(body)).into_response()
    }
}
