//! End-to-end tests of the task endpoint.
//!
//! Each test starts the real router on an ephemeral port with a scripted
//! synthesizer and the in-memory repository host, then talks to it over HTTP.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use pagesmith::notify::Notifier;
use pagesmith::orchestrator::Orchestrator;
use pagesmith::publisher::memory::HostOp;
use pagesmith::publisher::{InMemoryHost, RemoteError, RepositoryPublisher};
use pagesmith::retry::RetryPolicy;
use pagesmith::synth::{CodeSynthesizer, SynthesisError, SynthesisInput, SynthesizedCode};
use pagesmith::web::{self, AppState};

const SECRET: &str = "s3cret";

/// Returns a page built from the brief, counting calls.
#[derive(Default)]
struct ScriptedSynthesizer {
    calls: AtomicUsize,
}

#[async_trait]
impl CodeSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, input: &SynthesisInput) -> Result<SynthesizedCode, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let files: Vec<&str> = input.attachments.iter().map(|a| a.name.as_str()).collect();
        Ok(SynthesizedCode {
            app_source: format!(
                "<!DOCTYPE html><html><body><h1>{}</h1><p>{}</p><p>{}</p></body></html>",
                input.repo_name,
                input.brief,
                files.join(",")
            ),
            readme: format!("# {}\n\n{}\n", input.repo_name, input.brief),
        })
    }
}

struct TestServer {
    base: String,
    host: Arc<InMemoryHost>,
    synth: Arc<ScriptedSynthesizer>,
    http: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let host = Arc::new(InMemoryHost::new("octocat"));
        let synth = Arc::new(ScriptedSynthesizer::default());
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let publisher = RepositoryPublisher::new(host.clone(), policy.clone());
        let notifier = Notifier::new(Duration::from_millis(200), policy, Duration::from_secs(2)).unwrap();
        let orchestrator = Orchestrator::new(synth.clone(), publisher, notifier);
        let app = web::router(Arc::new(AppState::new(SECRET, orchestrator)), 1024 * 1024);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            host,
            synth,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, body: &Value) -> (u16, Value) {
        let resp = self
            .http
            .post(format!("{}/handle_task", self.base))
            .json(body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    fn synth_calls(&self) -> usize {
        self.synth.calls.load(Ordering::SeqCst)
    }

    fn host_calls(&self) -> usize {
        [
            HostOp::RepositoryExists,
            HostOp::CreateRepository,
            HostOp::FileVersion,
            HostOp::PutFile,
            HostOp::EnablePages,
            HostOp::PagesUrl,
            HostOp::HeadVersion,
        ]
        .into_iter()
        .map(|op| self.host.calls(op))
        .sum()
    }
}

fn task(round: u8) -> Value {
    json!({
        "secret": SECRET,
        "email": "student@example.com",
        "task": "calculator",
        "round": round,
        "nonce": "abc123",
        "brief": "Build a calculator that adds two numbers",
        "checks": ["Page has an input", "Sum is shown"],
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let server = TestServer::start().await;
    for path in ["/", "/health"] {
        let body: Value = reqwest::get(format!("{}{path}", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"status": "ok", "service": "pagesmith"}));
    }
}

#[tokio::test]
async fn round_one_publishes_calculator() {
    let server = TestServer::start().await;
    let (status, body) = server.post(&task(1)).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["message"], "Round 1 completed successfully");

    let result = &body["result"];
    assert_eq!(result["repo_url"], "https://github.com/octocat/calculator_abc123");
    assert_eq!(result["pages_url"], "https://octocat.github.io/calculator_abc123/");
    assert_eq!(result["email"], "student@example.com");
    assert_eq!(result["round"], 1);
    assert!(!result["commit_sha"].as_str().unwrap().is_empty());

    assert_eq!(
        server.host.paths("calculator_abc123"),
        vec!["LICENSE", "README.md", "index.html"]
    );
    let license = server.host.file("calculator_abc123", "LICENSE").unwrap();
    assert!(String::from_utf8(license).unwrap().starts_with("MIT License"));
}

#[tokio::test]
async fn missing_fields_touch_nothing() {
    let server = TestServer::start().await;
    let mut body = task(1);
    body.as_object_mut().unwrap().remove("brief");
    body.as_object_mut().unwrap().remove("nonce");

    let (status, resp) = server.post(&body).await;
    assert_eq!(status, 400);
    assert_eq!(resp["error"], "ValidationError");
    assert_eq!(resp["message"], "Missing required fields: nonce, brief");
    assert_eq!(server.synth_calls(), 0);
    assert_eq!(server.host_calls(), 0);
}

#[tokio::test]
async fn invalid_round_is_rejected() {
    let server = TestServer::start().await;
    let (status, resp) = server.post(&task(3)).await;
    assert_eq!(status, 400);
    assert_eq!(resp["error"], "ValidationError");
    assert_eq!(server.host_calls(), 0);
}

#[tokio::test]
async fn wrong_secret_is_unauthorized() {
    let server = TestServer::start().await;

    let mut body = task(1);
    body["secret"] = json!("guess");
    let (status, resp) = server.post(&body).await;
    assert_eq!(status, 401);
    assert_eq!(resp["error"], "AuthError");

    // Still 401 when the rest of the body is invalid too.
    let (status, _) = server.post(&json!({"secret": "guess", "round": 7})).await;
    assert_eq!(status, 401);
    assert_eq!(server.synth_calls(), 0);
}

#[tokio::test]
async fn repeated_round_one_is_idempotent() {
    let server = TestServer::start().await;
    let (first, _) = server.post(&task(1)).await;
    let (second, body) = server.post(&task(1)).await;
    assert_eq!(first, 200);
    assert_eq!(second, 200, "{body}");
    assert_eq!(server.host.repositories_created(), 1);
    assert_eq!(server.host.pages_enabled(), 1);
}

#[tokio::test]
async fn round_two_requires_round_one() {
    let server = TestServer::start().await;
    let (status, resp) = server.post(&task(2)).await;
    assert_eq!(status, 404);
    assert_eq!(resp["error"], "NotFound");
    assert_eq!(server.synth_calls(), 0);
    assert_eq!(server.host.repositories_created(), 0);
    assert!(!server.host.has_repository("calculator_abc123"));
}

#[tokio::test]
async fn round_two_revises_in_place() {
    let server = TestServer::start().await;
    let (_, first) = server.post(&task(1)).await;

    let mut revise = task(2);
    revise["brief"] = json!("Also support subtraction");
    let (status, second) = server.post(&revise).await;
    assert_eq!(status, 200, "{second}");
    assert_eq!(second["message"], "Round 2 completed successfully");
    assert_eq!(second["result"]["repo_url"], first["result"]["repo_url"]);
    assert_ne!(second["result"]["commit_sha"], first["result"]["commit_sha"]);
    assert_eq!(server.host.repositories_created(), 1);

    let page = server.host.file("calculator_abc123", "index.html").unwrap();
    assert!(String::from_utf8(page).unwrap().contains("subtraction"));
}

#[tokio::test]
async fn attachments_are_published() {
    let server = TestServer::start().await;
    let mut body = task(1);
    body["attachments"] = json!([
        {"name": "data.csv", "url": "data:text/csv;base64,YSxiCjEsMg=="}
    ]);
    let (status, resp) = server.post(&body).await;
    assert_eq!(status, 200, "{resp}");
    assert_eq!(
        server.host.file("calculator_abc123", "data.csv").unwrap(),
        b"a,b\n1,2"
    );
    let page = server.host.file("calculator_abc123", "index.html").unwrap();
    assert!(String::from_utf8(page).unwrap().contains("data.csv"));
}

#[tokio::test]
async fn bad_attachment_fails_before_synthesis() {
    let server = TestServer::start().await;
    let mut body = task(1);
    body["attachments"] = json!([{"name": "x.png", "url": "https://example.com/x.png"}]);
    let (status, resp) = server.post(&body).await;
    assert_eq!(status, 500);
    assert_eq!(resp["error"], "AttachmentDecodeFailed");
    assert_eq!(server.synth_calls(), 0);
    assert_eq!(server.host_calls(), 0);
}

#[tokio::test]
async fn unreachable_callback_does_not_fail_request() {
    let server = TestServer::start().await;
    let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let mut body = task(1);
    body["evaluation_url"] = json!(format!("http://{addr}/notify"));
    let (status, resp) = server.post(&body).await;
    assert_eq!(status, 200, "{resp}");
}

#[tokio::test]
async fn callback_receives_result() {
    use axum::{Json, Router, routing::post};
    use tokio::sync::mpsc;

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let receiver = Router::new().route(
        "/notify",
        post(move |Json(v): Json<Value>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(v);
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, receiver).await.unwrap();
    });

    let server = TestServer::start().await;
    let mut body = task(1);
    body["evaluation_url"] = json!(format!("http://{addr}/notify"));
    let (status, resp) = server.post(&body).await;
    assert_eq!(status, 200);

    let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered, resp["result"]);
}

#[tokio::test]
async fn forbidden_write_reports_cause_and_files() {
    let server = TestServer::start().await;
    server.host.fail_next(
        HostOp::PutFile,
        RemoteError::Rejected {
            status: 403,
            message: "Resource not accessible by integration".into(),
        },
    );

    let (status, resp) = server.post(&task(1)).await;
    assert_eq!(status, 500);
    assert_eq!(resp["error"], "RemoteRejected");
    assert_eq!(resp["written"], json!([]));
    assert_eq!(resp["failed"], "index.html");
    assert_eq!(resp["pending"], json!(["README.md", "LICENSE"]));
    assert_eq!(server.host.calls(HostOp::PutFile), 1);
}

#[tokio::test]
async fn write_outage_reports_exhausted_retries() {
    let server = TestServer::start().await;
    for _ in 0..3 {
        server
            .host
            .fail_next(HostOp::PutFile, RemoteError::Unavailable("502 Bad Gateway".into()));
    }

    let (status, resp) = server.post(&task(1)).await;
    assert_eq!(status, 500);
    assert_eq!(resp["error"], "RetriesExhausted");
    assert_eq!(resp["failed"], "index.html");
}

#[tokio::test]
async fn non_http_callback_is_refused_up_front() {
    let server = TestServer::start().await;
    let mut body = task(1);
    body["evaluation_url"] = json!("mailto:grader@example.com");
    let (status, resp) = server.post(&body).await;
    assert_eq!(status, 400);
    assert_eq!(resp["error"], "ValidationError");
    assert_eq!(server.synth_calls(), 0);
    assert_eq!(server.host_calls(), 0);
}
