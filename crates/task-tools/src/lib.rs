//! # task-tools
//!
//! Tools that let the agent manage a user's tasks in a REST task service.
//!
//! Every tool takes the user's `username` and `password`, logs in for a
//! bearer token and then performs one operation:
//!
//! ```text
//! get_tasks_for_user        GET    /tasks/
//! add_task_for_user         POST   /tasks/
//! update_task_for_user      PUT    /tasks/{id}/
//! update_task_by_title      GET    /tasks/  → PUT /tasks/{id}/
//! delete_task_for_user      DELETE /tasks/{id}/
//! delete_task_by_title      GET    /tasks/  → DELETE /tasks/{id}/
//! delete_task_by_position   GET    /tasks/  → DELETE /tasks/{id}/
//! suggest_task_improvements GET    /tasks/  → LLM review
//! ```
//!
//! The tools run in-process via [`task_session`] or behind the
//! `task-mcp-server` binary.

pub mod backend;
pub mod error;
pub mod model;
pub mod svckit;

use std::sync::Arc;

use agent_core::{GenerationOptions, LlmProvider, LocalToolSession};

pub use backend::{HttpTaskBackend, MockTaskBackend, TaskBackend};
pub use error::{Result, TaskError};
pub use model::{Credentials, NewTask, Task, TaskUpdate};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{
        AddTaskTool, DeleteTaskByPositionTool, DeleteTaskByTitleTool, DeleteTaskTool,
        GetTasksTool, SuggestImprovementsTool, UpdateTaskByTitleTool, UpdateTaskTool,
    };
}

/// Tool session hosting every task tool
pub fn task_session(
    id: &str,
    backend: Arc<dyn TaskBackend>,
    reviewer: Arc<dyn LlmProvider>,
    options: GenerationOptions,
) -> LocalToolSession {
    use tools::*;

    LocalToolSession::new(id)
        .with_tool(GetTasksTool::new(backend.clone()))
        .with_tool(AddTaskTool::new(backend.clone()))
        .with_tool(UpdateTaskTool::new(backend.clone()))
        .with_tool(UpdateTaskByTitleTool::new(backend.clone()))
        .with_tool(DeleteTaskTool::new(backend.clone()))
        .with_tool(DeleteTaskByTitleTool::new(backend.clone()))
        .with_tool(DeleteTaskByPositionTool::new(backend.clone()))
        .with_tool(SuggestImprovementsTool::new(backend, reviewer, options))
}

/// System prompt for the task assistant
pub const TASK_ASSISTANT_PROMPT: &str = r#"You are a task-management assistant. You help the user list, add, update, delete and improve tasks stored in their task service account.

## Rules

1. Every tool needs the user's `username` and `password`. If you do not know them yet, ask the user before calling a tool.
2. Call at most one tool per reply. Wait for its result before deciding what to do next.
3. When the user refers to "the first task", "task 2" and so on, that is a 1-based position in the list returned by `get_tasks_for_user`.
4. When the user names a task by its title, prefer the `*_by_title` tools.
5. If a tool fails, read the error. Fix your arguments and retry, or explain the problem to the user.
6. Once you have what you need, answer in plain language without a tool block.

When you need to use a tool, respond with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```"#;

#[cfg(test)]
mod tests {
    use agent_core::ToolSession;

    use super::*;

    struct Offline;

    #[async_trait::async_trait]
    impl LlmProvider for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn health_check(&self) -> agent_core::Result<bool> {
            Ok(false)
        }

        async fn complete(
            &self,
            _messages: &[agent_core::Message],
            _options: &GenerationOptions,
        ) -> agent_core::Result<agent_core::provider::Completion> {
            Err(agent_core::AgentError::ProviderUnavailable("offline".into()))
        }

        async fn list_models(&self) -> agent_core::Result<Vec<agent_core::provider::ModelInfo>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_session_hosts_all_tools() {
        let session = task_session(
            "tasks",
            Arc::new(MockTaskBackend::new()),
            Arc::new(Offline),
            GenerationOptions::default(),
        );

        let mut names: Vec<&str> = session.catalog().iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            [
                "add_task_for_user",
                "delete_task_by_position",
                "delete_task_by_title",
                "delete_task_for_user",
                "get_tasks_for_user",
                "suggest_task_improvements",
                "update_task_by_title",
                "update_task_for_user",
            ]
        );
        assert!(session.catalog().iter().all(|d| {
            d.parameters
                .iter()
                .filter(|p| p.required)
                .any(|p| p.name == "username")
        }));
    }
}
