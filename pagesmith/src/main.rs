//! pagesmith server.
//!
//! Listens for `POST /handle_task`, generates the app with Claude and
//! publishes it to GitHub Pages. Requires PAGESMITH_SECRET, GITHUB_OWNER,
//! ANTHROPIC_API_KEY and (unless --dry-run) GITHUB_TOKEN.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pagesmith::config::Config;
use pagesmith::llm::LlmClient;
use pagesmith::notify::Notifier;
use pagesmith::orchestrator::Orchestrator;
use pagesmith::publisher::{GithubHost, InMemoryHost, RepositoryHost, RepositoryPublisher};
use pagesmith::synth::LlmSynthesizer;
use pagesmith::web::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "pagesmith=info".into());
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let host: Arc<dyn RepositoryHost> = match config.github_settings() {
        Some(settings) if !config.dry_run => {
            tracing::info!(owner = %settings.owner, api = %settings.api_base, "Publishing to GitHub");
            Arc::new(GithubHost::new(settings).context("building GitHub client")?)
        }
        _ => {
            tracing::warn!(owner = %config.github_owner, "Dry run: publishing to an in-memory host");
            Arc::new(InMemoryHost::new(&config.github_owner))
        }
    };

    let llm = LlmClient::new(config.api_key.clone())
        .with_model(&config.model)
        .with_api_base(&config.llm_api_base)
        .with_timeout(Duration::from_secs(config.llm_timeout_secs))
        .context("building model client")?;
    tracing::info!(model = llm.model(), "Using model");

    let synthesizer = Arc::new(LlmSynthesizer::new(llm, config.retry_policy()));
    let publisher = RepositoryPublisher::new(host, config.retry_policy());
    let notifier = Notifier::new(
        Duration::from_secs(config.notify_timeout_secs),
        config.notify_policy(),
        Duration::from_secs(config.notify_deadline_secs),
    )
    .context("building callback client")?;

    let orchestrator = Orchestrator::new(synthesizer, publisher, notifier);
    let state = Arc::new(AppState::new(&config.secret, orchestrator));
    let app = web::router(state, config.body_limit);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
