//! Error Types for Task Tools

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskError>;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Login failed. Please check your username and password.")]
    Auth,

    #[error("Login succeeded but no access token was returned.")]
    MissingToken,

    #[error("{status} - {body}")]
    Http { status: u16, body: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskError {
    /// Convert into a tool-provider failure, naming the action that failed
    /// when the task service itself rejected the request.
    pub fn during(self, action: &str) -> AgentError {
        match self {
            Self::Http { .. } | Self::Network(_) | Self::Serialization(_) => {
                AgentError::ToolProvider(format!("Failed to {action}: {self}"))
            }
            other => other.into(),
        }
    }
}

impl From<TaskError> for AgentError {
    fn from(e: TaskError) -> Self {
        Self::ToolProvider(e.to_string())
    }
}
