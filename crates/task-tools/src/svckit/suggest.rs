//! Task Review Tool
//!
//! Looks up a task by position and asks an LLM for improvements to its
//! title and description.

use std::sync::Arc;

use agent_core::{
    AgentError, GenerationOptions, LlmProvider, Message, ParameterSchema, Result as CoreResult,
    Tool, ToolDescriptor, ToolInvocation, ToolOutput,
};
use async_trait::async_trait;

use super::{authenticate, descriptor, task_at_position};
use crate::backend::TaskBackend;
use crate::model::Task;

/// Review conversation for one task
pub fn review_prompt(task: &Task) -> Vec<Message> {
    let description = task
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("(none)");
    vec![
        Message::user("I'd like you to review a task I'm working on."),
        Message::user(format!("Title: {}", task.title)),
        Message::user(format!("Description: {description}")),
        Message::assistant("Thanks. Let me suggest some improvements."),
    ]
}

pub struct SuggestImprovementsTool {
    backend: Arc<dyn TaskBackend>,
    reviewer: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl SuggestImprovementsTool {
    pub fn new(
        backend: Arc<dyn TaskBackend>,
        reviewer: Arc<dyn LlmProvider>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            backend,
            reviewer,
            options,
        }
    }
}

#[async_trait]
impl Tool for SuggestImprovementsTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "suggest_task_improvements",
            "Review a task by its position and suggest improvements to its title or description.",
            vec![ParameterSchema::required(
                "position",
                "integer",
                "1-based position as listed by get_tasks_for_user",
            )],
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> CoreResult<ToolOutput> {
        let position = invocation.i64_arg("position").unwrap_or_default();
        let token = authenticate(self.backend.as_ref(), invocation).await?;
        let tasks = self
            .backend
            .list_tasks(&token)
            .await
            .map_err(|e| e.during("fetch tasks"))?;
        let task = task_at_position(&tasks, position)?;

        let completion = self
            .reviewer
            .complete(&review_prompt(task), &self.options)
            .await
            .map_err(|e| {
                AgentError::ToolProvider(format!(
                    "Could not get suggestions from {}: {e}",
                    self.reviewer.name()
                ))
            })?;

        Ok(ToolOutput::text(completion.content.trim()))
    }
}
