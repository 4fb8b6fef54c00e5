//! Tool sessions over the JSON-RPC tool-provider protocol
//!
//! ```text
//! client                                   provider
//!   │ ── initialize ─────────────────────────▶ │
//!   │ ── notifications/initialized ──────────▶ │
//!   │ ── tools/list ─────────────────────────▶ │   handshake: descriptor set
//!   │ ── tools/call (per invocation) ────────▶ │
//!   │ ── notifications/cancelled (abandon) ──▶ │
//!   │ ── EOF (close) ────────────────────────▶ │
//! ```

mod client;
pub mod protocol;
mod server;

pub use client::{McpServerConfig, McpToolSession};
pub use server::serve_tools;

use agent_core::AgentError;

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("session closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server spawn failed: {0}")]
    SpawnFailed(String),

    #[error("timeout waiting for server response")]
    Timeout,
}

impl From<McpError> for AgentError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::SpawnFailed(_) => Self::Session(e.to_string()),
            McpError::Tool(text) => Self::ToolProvider(text),
            _ => Self::ToolProvider(e.to_string()),
        }
    }
}
