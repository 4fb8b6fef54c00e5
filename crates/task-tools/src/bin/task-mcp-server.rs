//! Task tool provider over stdio
//!
//! Serves the task tools as line-delimited JSON-RPC on stdin/stdout so the
//! agent can run them out of process. Logs go to stderr.

use std::sync::Arc;

use agent_core::GenerationOptions;
use agent_runtime::{OllamaProvider, serve_tools};
use task_tools::{HttpTaskBackend, task_session};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let backend = Arc::new(HttpTaskBackend::from_env()?);
    tracing::info!(base_url = backend.base_url(), "Task service");

    let options = GenerationOptions {
        model: std::env::var("AGENT_MODEL").unwrap_or_else(|_| GenerationOptions::default().model),
        ..GenerationOptions::default()
    };
    let reviewer = Arc::new(OllamaProvider::from_env()?);

    let session = Arc::new(task_session("tasks", backend, reviewer, options));
    serve_tools(session, tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}
