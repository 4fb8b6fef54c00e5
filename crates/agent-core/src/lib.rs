//! # agent-core
//!
//! Bounded tool-calling conversation engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Agent                               │
//! │  ┌─────────────┐   ┌──────────────────┐   ┌───────────────┐  │
//! │  │ Reasoning   │──▶│ ToolSession      │──▶│ ToolSession   │  │
//! │  │ Loop        │   │ Registry         │   │ (per provider)│  │
//! │  │ (StepBudget)│   └──────────────────┘   └───────────────┘  │
//! │  │             │   ┌──────────────────┐   ┌───────────────┐  │
//! │  │             │──▶│ LlmAdapter       │──▶│ LlmProvider   │  │
//! │  └─────────────┘   └──────────────────┘   │ (Strategy)    │  │
//! │        │                                  └───────────────┘  │
//! │        ▼                                                     │
//! │  ConversationMemory                                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping chat backends, and the
//! `ToolSession` trait enables mixing in-process and remote tool providers,
//! without changing the loop.

pub mod adapter;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod registry;
pub mod session;
pub mod tool;

pub use adapter::{LlmAdapter, LlmOutcome, PromptAdapter};
pub use error::{AgentError, Result};
pub use message::{ConversationMemory, Message, Role, Turn, TurnContent};
pub use provider::{GenerationOptions, LlmProvider, RetryPolicy};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, StepBudget, TurnOutcome, TurnReport};
pub use registry::{LocalToolSession, ToolSession, ToolSessionRegistry};
pub use session::ChatSession;
pub use tool::{
    ParameterSchema, Tool, ToolCallRequest, ToolDescriptor, ToolFailure, ToolInvocation,
    ToolOutput, ToolResult,
};

pub use tokio_util::sync::CancellationToken;
