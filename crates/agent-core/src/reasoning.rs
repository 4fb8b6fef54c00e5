//! Reasoning Loop
//!
//! The bounded tool-calling state machine that answers one user turn:
//!
//! ```text
//! AwaitingUserInput ─► Querying ─► Answering ─► Done
//!                        ▲   │
//!                        │   ▼
//!                      Dispatching ─(budget spent)─► Done
//! ```
//!
//! Each LLM query consumes one unit of [`StepBudget`]; the loop never issues a
//! query once the budget is spent.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::adapter::{LlmAdapter, LlmOutcome};
use crate::error::{AgentError, Result};
use crate::message::ConversationMemory;
use crate::registry::ToolSessionRegistry;
use crate::tool::{ToolFailure, ToolInvocation, ToolResult};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt
    pub system_prompt: String,

    /// Maximum LLM queries within one user turn
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_steps: 15,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant.

When you need to use a tool, respond with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```

After receiving tool results, synthesize them into a helpful response.
If a tool fails, read the error and decide whether to retry with different arguments.
If you can answer directly without tools, do so.
Be concise and accurate."#;

/// Per-turn counter of remaining LLM queries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepBudget {
    max: usize,
    remaining: usize,
}

impl StepBudget {
    pub const fn new(max: usize) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    /// Consume one query; `false` if the budget was already spent
    pub const fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    pub const fn used(&self) -> usize {
        self.max - self.remaining
    }

    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Terminal outcome of one user turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The LLM produced a final answer
    Answered(String),
    /// The step budget ran out before a final answer
    BudgetExceeded,
    /// The turn was cancelled at a suspension point
    Cancelled,
}

/// Outcome plus accounting for one turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReport {
    pub outcome: TurnOutcome,

    /// LLM queries issued during the turn
    pub queries: usize,

    /// Tool invocations dispatched during the turn
    pub tool_calls: usize,
}

/// Loop states
enum LoopState {
    Querying,
    Dispatching(ToolInvocation),
    Done(TurnOutcome),
}

/// The main Agent struct
pub struct Agent {
    adapter: Arc<dyn LlmAdapter>,
    tools: Arc<ToolSessionRegistry>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        adapter: Arc<dyn LlmAdapter>,
        tools: Arc<ToolSessionRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            adapter,
            tools,
            config,
        }
    }

    /// Answer one user message.
    ///
    /// Appends the user turn, then drives the state machine until a final
    /// answer, budget exhaustion or cancellation. Returns
    /// `Err(AgentError::LlmUnavailable)` if the adapter gives up; every turn
    /// appended before the failing query is kept.
    pub async fn run_turn(
        &self,
        memory: &mut ConversationMemory,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReport> {
        memory.append_user(user_message);

        let catalog = self.tools.catalog();
        let mut budget = StepBudget::new(self.config.max_steps);
        let mut tool_calls = 0;
        let mut state = LoopState::Querying;

        let outcome = loop {
            state = match state {
                LoopState::Querying => {
                    if !budget.try_consume() {
                        LoopState::Done(TurnOutcome::BudgetExceeded)
                    } else {
                        tracing::debug!(step = budget.used(), remaining = budget.remaining(), "Querying LLM");
                        let query = self
                            .adapter
                            .query(&self.config.system_prompt, memory.snapshot(), &catalog);
                        let outcome = tokio::select! {
                            biased;
                            () = cancel.cancelled() => None,
                            outcome = query => Some(outcome),
                        };

                        match outcome {
                            None => LoopState::Done(TurnOutcome::Cancelled),
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "LLM query failed, aborting turn");
                                return Err(match e {
                                    e @ AgentError::LlmUnavailable { .. } => e,
                                    other => AgentError::LlmUnavailable {
                                        attempts: 1,
                                        reason: other.to_string(),
                                    },
                                });
                            }
                            Some(Ok(LlmOutcome::Answer(text))) => {
                                memory.append_answer(text.clone());
                                LoopState::Done(TurnOutcome::Answered(text))
                            }
                            Some(Ok(LlmOutcome::ToolCall(request))) => {
                                let invocation = ToolInvocation::new(request, memory.next_position());
                                memory.append_tool_call(invocation.clone());
                                LoopState::Dispatching(invocation)
                            }
                        }
                    }
                }

                LoopState::Dispatching(invocation) => {
                    tool_calls += 1;
                    let result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        result = self.tools.invoke(&invocation) => Some(result),
                    };

                    match result {
                        Some(result) => {
                            if !result.is_success() {
                                tracing::debug!(tool = %result.name, output = %result.output, "Tool reported failure");
                            }
                            memory.append_tool_result(result);
                            if budget.is_exhausted() {
                                LoopState::Done(TurnOutcome::BudgetExceeded)
                            } else {
                                LoopState::Querying
                            }
                        }
                        None => {
                            self.tools.abandon(&invocation).await;
                            memory.append_tool_result(ToolResult::failure(
                                &invocation,
                                ToolFailure::Cancelled,
                                "Invocation abandoned: the turn was cancelled by the user",
                            ));
                            LoopState::Done(TurnOutcome::Cancelled)
                        }
                    }
                }

                LoopState::Done(outcome) => break outcome,
            };
        };

        tracing::info!(
            queries = budget.used(),
            tool_calls,
            outcome = ?outcome,
            "Turn finished"
        );

        Ok(TurnReport {
            outcome,
            queries: budget.used(),
            tool_calls,
        })
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolSessionRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    adapter: Option<Arc<dyn LlmAdapter>>,
    tools: Option<Arc<ToolSessionRegistry>>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            adapter: None,
            tools: None,
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn LlmAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: Arc<ToolSessionRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub const fn max_steps(mut self, max: usize) -> Self {
        self.config.max_steps = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let adapter = self
            .adapter
            .ok_or_else(|| AgentError::Config("LLM adapter is required".into()))?;
        if self.config.max_steps == 0 {
            return Err(AgentError::Config("max_steps must be at least 1".into()));
        }
        let tools = self
            .tools
            .unwrap_or_else(|| Arc::new(ToolSessionRegistry::new()));

        Ok(Agent::new(adapter, tools, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_budget_counts_down() {
        let mut budget = StepBudget::new(2);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(budget.is_exhausted());
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn test_zero_budget_never_allows_a_query() {
        let mut budget = StepBudget::new(0);
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn test_builder_requires_adapter_and_positive_budget() {
        assert!(matches!(
            AgentBuilder::new().build(),
            Err(AgentError::Config(_))
        ));
    }
}
