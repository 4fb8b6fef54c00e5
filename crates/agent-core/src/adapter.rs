//! LLM Adapter
//!
//! Turns a chat-completion provider into a tool-calling oracle: every query
//! yields exactly one [`LlmOutcome`], either a final answer or a tool call.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::{Message, Role, Turn, TurnContent};
use crate::provider::{GenerationOptions, LlmProvider, RetryPolicy};
use crate::tool::{ToolCallRequest, ToolDescriptor, ToolResult, render_catalog};

/// Result of one LLM query
#[derive(Clone, Debug, PartialEq)]
pub enum LlmOutcome {
    /// Final natural-language answer
    Answer(String),
    /// The model wants a tool invoked
    ToolCall(ToolCallRequest),
}

/// The contract the agent loop consumes
///
/// Implementations may retry internally. An `Err` returned here is final for
/// the step and is treated as `LlmUnavailable`.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn query(
        &self,
        system: &str,
        history: &[Turn],
        catalog: &[ToolDescriptor],
    ) -> Result<LlmOutcome>;
}

/// Adapter speaking the fenced ```` ```tool ```` block protocol over any [`LlmProvider`]
pub struct PromptAdapter {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
    retry: RetryPolicy,
}

impl PromptAdapter {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self {
            provider,
            options,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the full system prompt including tool descriptions
    fn build_system_prompt(system: &str, catalog: &[ToolDescriptor]) -> String {
        let mut prompt = system.to_string();
        if !catalog.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&render_catalog(catalog));
        }
        prompt
    }

    /// Render history into provider chat messages
    fn build_messages(system: &str, history: &[Turn], catalog: &[ToolDescriptor]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(Self::build_system_prompt(system, catalog)));

        for turn in history {
            let message = match (turn.role(), turn.content()) {
                (Role::User, TurnContent::Text { text }) => Message::user(text.clone()),
                (_, TurnContent::Text { text }) => Message::assistant(text.clone()),
                (_, TurnContent::ToolCall { invocation }) => {
                    let block = serde_json::json!({
                        "tool": invocation.name,
                        "arguments": invocation.arguments,
                    });
                    Message::assistant(format!("```tool\n{block}\n```"))
                }
                (_, TurnContent::ToolResult { result }) => {
                    Message::tool(Self::format_tool_result(result))
                }
            };
            messages.push(message);
        }

        messages
    }

    /// Format tool result for conversation
    fn format_tool_result(result: &ToolResult) -> String {
        match result.failure {
            None => format!("[Tool '{}' returned]\n{}", result.name, result.output),
            Some(kind) => format!("[Tool '{}' failed: {kind}]\n{}", result.name, result.output),
        }
    }

    /// Parse a tool call from LLM response
    pub fn parse_outcome(content: &str) -> LlmOutcome {
        match Self::parse_tool_block(content).or_else(|| Self::parse_inline_tool_call(content)) {
            Some(request) => LlmOutcome::ToolCall(request),
            None => LlmOutcome::Answer(content.trim().to_string()),
        }
    }

    /// Look for ```tool ... ``` blocks
    fn parse_tool_block(content: &str) -> Option<ToolCallRequest> {
        let tool_start = "```tool";
        let tool_end = "```";

        let start_idx = content.find(tool_start)?;
        let after_marker = &content[start_idx + tool_start.len()..];
        let end_idx = after_marker.find(tool_end)?;
        let json_str = after_marker[..end_idx].trim();

        serde_json::from_str::<ToolCallRequest>(json_str).ok()
    }

    /// Try to parse inline JSON tool call
    fn parse_inline_tool_call(content: &str) -> Option<ToolCallRequest> {
        if !content.contains(r#""tool""#) {
            return None;
        }

        let start = content.find('{')?;
        let end = content.rfind('}')?;
        if end <= start {
            return None;
        }

        serde_json::from_str::<ToolCallRequest>(&content[start..=end]).ok()
    }
}

#[async_trait]
impl LlmAdapter for PromptAdapter {
    async fn query(
        &self,
        system: &str,
        history: &[Turn],
        catalog: &[ToolDescriptor],
    ) -> Result<LlmOutcome> {
        let messages = Self::build_messages(system, history, catalog);
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.provider.complete(&messages, &self.options).await {
                Ok(completion) => return Ok(Self::parse_outcome(&completion.content)),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        provider = %self.provider.name(),
                        attempt,
                        error = %e,
                        "Transient provider fault, retrying"
                    );
                }
                Err(e) => {
                    return Err(AgentError::LlmUnavailable {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ConversationMemory;
    use crate::provider::{Completion, ModelInfo};
    use crate::tool::{ToolFailure, ToolInvocation};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Provider replaying scripted responses and recording prompts
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<Result<String>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete(
            &self,
            messages: &[Message],
            options: &GenerationOptions,
        ) -> Result<Completion> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            let next = self.responses.lock().unwrap().pop().expect("script exhausted");
            next.map(|content| Completion {
                content,
                model: options.model.clone(),
            })
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_parse_tool_block() {
        let content = r#"Let me add that for you.
```tool
{"tool": "add_task_for_user", "arguments": {"title": "Groceries"}}
```"#;
        let outcome = PromptAdapter::parse_outcome(content);
        assert_eq!(
            outcome,
            LlmOutcome::ToolCall(ToolCallRequest {
                name: "add_task_for_user".into(),
                arguments: json!({"title": "Groceries"}),
            })
        );
    }

    #[test]
    fn test_parse_inline_call_and_plain_answer() {
        let inline = r#"{"tool": "get_tasks_for_user", "arguments": {"username": "ada"}}"#;
        assert!(matches!(
            PromptAdapter::parse_outcome(inline),
            LlmOutcome::ToolCall(ref r) if r.name == "get_tasks_for_user"
        ));

        assert_eq!(
            PromptAdapter::parse_outcome("  Done, I added Groceries.\n"),
            LlmOutcome::Answer("Done, I added Groceries.".into())
        );

        // Malformed block falls back to an answer rather than neither outcome
        assert!(matches!(
            PromptAdapter::parse_outcome("```tool\n{not json}\n```"),
            LlmOutcome::Answer(_)
        ));
    }

    #[test]
    fn test_history_rendering() {
        let mut memory = ConversationMemory::new();
        memory.append_user("delete task 3");
        let call = ToolInvocation::new(
            ToolCallRequest {
                name: "delete_task_for_user".into(),
                arguments: json!({"task_id": 3}),
            },
            memory.next_position(),
        );
        memory.append_tool_call(call.clone());
        memory.append_tool_result(ToolResult::failure(
            &call,
            ToolFailure::ProviderFailure,
            "Login failed.",
        ));

        let messages = PromptAdapter::build_messages("You manage tasks.", memory.snapshot(), &[]);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "You manage tasks.");
        assert!(messages[2].content.starts_with("```tool"));
        assert_eq!(messages[3].role, Role::Tool);
        assert!(messages[3].content.contains("failed: provider_failure"));
        assert!(messages[3].content.contains("Login failed."));
    }

    #[tokio::test]
    async fn test_query_retries_transient_faults() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(AgentError::ProviderUnavailable("connection refused".into())),
            Ok("All good.".into()),
        ]));
        let adapter = PromptAdapter::new(provider.clone(), GenerationOptions::default())
            .with_retry(fast_retry());

        let outcome = adapter.query("sys", &[], &[]).await.unwrap();
        assert_eq!(outcome, LlmOutcome::Answer("All good.".into()));
        assert_eq!(provider.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_query_gives_up_as_llm_unavailable() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(AgentError::ProviderUnavailable("down".into())),
            Err(AgentError::ProviderUnavailable("down".into())),
            Err(AgentError::ProviderUnavailable("down".into())),
        ]));
        let adapter = PromptAdapter::new(provider.clone(), GenerationOptions::default())
            .with_retry(fast_retry());

        let err = adapter.query("sys", &[], &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmUnavailable { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_non_retryable_fault_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(AgentError::Provider(
            "model not found".into(),
        ))]));
        let adapter = PromptAdapter::new(provider.clone(), GenerationOptions::default())
            .with_retry(fast_retry());

        let err = adapter.query("sys", &[], &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmUnavailable { attempts: 1, .. }));
        assert_eq!(provider.prompts.lock().unwrap().len(), 1);
    }
}
