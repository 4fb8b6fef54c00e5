//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The LLM adapter gave up after its retry policy was exhausted
    #[error("LLM unavailable after {attempts} attempt(s): {reason}")]
    LlmUnavailable { attempts: u32, reason: String },

    /// Tool not present in the aggregated catalog
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not match the tool's parameter schema
    #[error("Invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Failure inside a tool provider (backend, auth, network)
    #[error("Tool provider failure: {0}")]
    ToolProvider(String),

    /// Two sessions declared the same tool name
    #[error("Tool name collision: '{name}' is declared by both '{existing}' and '{rejected}'")]
    NameCollision {
        name: String,
        existing: String,
        rejected: String,
    },

    /// Tool session lifecycle error (handshake, transport, closed session)
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) | Self::LlmUnavailable { .. } => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::UnknownTool(name) => format!("The tool '{name}' is not available."),
            Self::InvalidArguments { tool, reason } => {
                format!("Invalid input for tool '{tool}': {reason}")
            }
            Self::ToolProvider(msg) => format!("Tool error: {msg}"),
            Self::NameCollision { name, .. } => {
                format!("Two tool providers both declare a tool named '{name}'.")
            }
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
