//! Conversation Messages
//!
//! [`Message`] is the chat format sent to LLM providers. [`Turn`] is the unit
//! of conversation history kept in [`ConversationMemory`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{ToolInvocation, ToolResult};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single chat message sent to a provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

/// What a turn carries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnContent {
    /// Plain text (user message or final assistant answer)
    Text { text: String },
    /// Assistant requested a tool
    ToolCall { invocation: ToolInvocation },
    /// Result of a tool invocation
    ToolResult { result: ToolResult },
}

/// One atomic, immutable unit of conversation history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: TurnContent,
    position: usize,
    timestamp: DateTime<Utc>,
}

impl Turn {
    pub const fn role(&self) -> Role {
        self.role
    }

    pub const fn content(&self) -> &TurnContent {
        &self.content
    }

    /// Zero-based position in the memory it was appended to
    pub const fn position(&self) -> usize {
        self.position
    }

    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Text of a user or final assistant turn
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Ordered, append-only log of turns
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn at the end and return its position.
    ///
    /// A `tool` turn must follow the `assistant` turn that requested it; this is
    /// checked only in debug builds.
    pub fn append(&mut self, role: Role, content: TurnContent) -> usize {
        debug_assert!(
            role != Role::Tool || self.requested(&content),
            "tool turn appended without a matching assistant request"
        );

        let position = self.turns.len();
        self.turns.push(Turn {
            role,
            content,
            position,
            timestamp: Utc::now(),
        });
        position
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> usize {
        self.append(Role::User, TurnContent::Text { text: text.into() })
    }

    pub fn append_answer(&mut self, text: impl Into<String>) -> usize {
        self.append(Role::Assistant, TurnContent::Text { text: text.into() })
    }

    pub fn append_tool_call(&mut self, invocation: ToolInvocation) -> usize {
        self.append(Role::Assistant, TurnContent::ToolCall { invocation })
    }

    pub fn append_tool_result(&mut self, result: ToolResult) -> usize {
        self.append(Role::Tool, TurnContent::ToolResult { result })
    }

    /// Position the next appended turn will occupy
    pub fn next_position(&self) -> usize {
        self.turns.len()
    }

    /// Full ordered history, for prompt construction
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// Get the last turn
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Drop every turn
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn requested(&self, content: &TurnContent) -> bool {
        let TurnContent::ToolResult { result } = content else {
            return false;
        };
        self.turns.iter().rev().any(|turn| {
            matches!(
                &turn.content,
                TurnContent::ToolCall { invocation } if invocation.id == result.invocation_id
            )
        })
    }
}
