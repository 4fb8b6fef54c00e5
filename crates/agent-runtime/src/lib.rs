//! # agent-runtime
//!
//! Runtime pieces for the task agent: concrete LLM providers and the
//! JSON-RPC transport that turns an external tool provider into a
//! [`ToolSession`](agent_core::ToolSession).
//!
//! ## Providers
//!
//! - **Ollama** (default feature): local LLM inference via Ollama
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{McpServerConfig, McpToolSession, OllamaProvider};
//!
//! let provider = Arc::new(OllamaProvider::from_env()?);
//! let session = McpToolSession::spawn("tasks", &config).await?;
//! registry.register(Arc::new(session))?;
//! ```

pub mod mcp;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use mcp::{McpError, McpServerConfig, McpToolSession, serve_tools};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};
