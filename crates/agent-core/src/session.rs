//! Chat Session
//!
//! Engine-level holder of one conversation: its memory survives across turns
//! until explicitly cleared and is dropped with the process.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::message::ConversationMemory;
use crate::reasoning::{Agent, TurnReport};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation between one user and the agent
#[derive(Debug)]
pub struct ChatSession {
    /// Unique identifier
    pub id: SessionId,

    memory: ConversationMemory,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create a new session
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            memory: ConversationMemory::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Run one user turn against `agent`
    pub async fn submit(
        &mut self,
        agent: &Agent,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReport> {
        self.touch();
        let report = agent.run_turn(&mut self.memory, text, cancel).await;
        self.touch();
        report
    }

    /// Forget the whole conversation
    pub fn clear(&mut self) {
        tracing::info!(session = %self.id, turns = self.memory.len(), "Clearing conversation history");
        self.memory.clear();
        self.touch();
    }

    pub const fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Turn count
    pub fn turn_count(&self) -> usize {
        self.memory.len()
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let session = ChatSession::new();
        assert_eq!(session.turn_count(), 0);
        assert_ne!(session.id, ChatSession::new().id);
    }

    #[test]
    fn test_clear_forgets_turns_and_touches() {
        let mut session = ChatSession::new();
        session.memory.append_user("add a task called Groceries");
        assert_eq!(session.turn_count(), 1);

        session.clear();
        assert_eq!(session.turn_count(), 0);
        assert!(session.updated_at >= session.created_at);
    }
}
