//! task-agent interactive chat
//!
//! Opens every configured tool session, registers them with one registry
//! and runs the chat loop inside the registry's scoped teardown so every
//! session is closed however the loop ends.

mod chat;
mod config;
mod input;

use std::io::Write;
use std::sync::Arc;

use agent_core::provider::ModelInfo;
use agent_core::{AgentBuilder, LlmProvider, PromptAdapter, ToolSession, ToolSessionRegistry};
use agent_runtime::{McpToolSession, OllamaProvider};
use task_tools::{HttpTaskBackend, TASK_ASSISTANT_PROMPT, task_session};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CliConfig;
use crate::input::ChatInput;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Quiet by default so logs do not interleave with the conversation
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CliConfig::from_env()?;

    let provider = Arc::new(OllamaProvider::from_config(config.ollama.clone()));
    match provider.health_check().await {
        Ok(true) => {
            tracing::info!(model = %config.generation.model, "Connected to Ollama");
            check_model(provider.as_ref(), &config.generation.model).await;
        }
        Ok(false) | Err(_) => {
            tracing::warn!("Ollama not available - replies will fail until it is running (ollama serve)");
        }
    }

    println!("Initializing chat...");
    let registry = Arc::new(open_sessions(&config, provider.clone()).await?);

    let adapter = Arc::new(PromptAdapter::new(provider, config.generation.clone()));
    let agent = AgentBuilder::new()
        .adapter(adapter)
        .tools(registry.clone())
        .system_prompt(TASK_ASSISTANT_PROMPT)
        .max_steps(config.max_steps)
        .build();
    let agent = match agent {
        Ok(agent) => agent,
        Err(e) => {
            registry.shutdown().await;
            return Err(e.into());
        }
    };

    let (mut input, mut out) = match ChatInput::new(chat::PROMPT.into()) {
        Ok(pair) => pair,
        Err(e) => {
            registry.shutdown().await;
            return Err(anyhow::anyhow!("Failed to initialize input: {e}"));
        }
    };

    let outcome = registry
        .scoped(async {
            chat::print_banner(&mut out, &config.generation.model, &registry.names())?;
            chat::run(&agent, &mut input, &mut out).await
        })
        .await;

    out.flush()?;
    input.flush();
    outcome.map(|_| ())
}

/// Warn when the configured model is not installed on the provider
async fn check_model(provider: &dyn LlmProvider, model: &str) {
    match provider.list_models().await {
        Ok(models) if !model_listed(&models, model) => {
            tracing::warn!(%model, "Model not found locally - pull it first (ollama pull {model})");
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "Could not list models"),
    }
}

/// `llama3.2` matches an installed `llama3.2:latest`
fn model_listed(models: &[ModelInfo], model: &str) -> bool {
    models.iter().any(|m| {
        m.name == model
            || m.name
                .strip_prefix(model)
                .is_some_and(|tag| tag.starts_with(':'))
    })
}

/// Open and register every configured tool session.
///
/// On any failure every session opened so far is closed before returning.
async fn open_sessions(
    config: &CliConfig,
    reviewer: Arc<dyn LlmProvider>,
) -> anyhow::Result<ToolSessionRegistry> {
    let mut registry = ToolSessionRegistry::new();

    if config.builtin_tools {
        let backend = match HttpTaskBackend::new(&config.task_api_url, config.task_api_timeout) {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                registry.shutdown().await;
                return Err(e.into());
            }
        };
        let session = task_session("tasks", backend, reviewer, config.generation.clone());
        register(&mut registry, Arc::new(session)).await?;
    }

    for (id, server) in &config.tool_servers {
        tracing::info!(session = %id, command = %server.command, "Starting tool provider");
        match McpToolSession::spawn(id, server).await {
            Ok(session) => register(&mut registry, Arc::new(session)).await?,
            Err(e) => {
                registry.shutdown().await;
                return Err(anyhow::anyhow!("Tool provider '{id}' failed to start: {e}"));
            }
        }
    }

    tracing::info!(sessions = registry.open_sessions(), tools = registry.len(), "Tool sessions ready");
    Ok(registry)
}

async fn register(
    registry: &mut ToolSessionRegistry,
    session: Arc<dyn ToolSession>,
) -> anyhow::Result<()> {
    if let Err(e) = registry.register(session) {
        registry.shutdown().await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<ModelInfo> {
        names
            .iter()
            .map(|n| ModelInfo {
                id: (*n).to_string(),
                name: (*n).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_model_listed_with_or_without_tag() {
        let installed = models(&["llama3.2:latest", "qwen2.5:7b"]);
        assert!(model_listed(&installed, "llama3.2"));
        assert!(model_listed(&installed, "qwen2.5:7b"));
        assert!(!model_listed(&installed, "qwen2.5:14b"));
        assert!(!model_listed(&installed, "llama3"));
    }
}
