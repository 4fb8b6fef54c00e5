//! Task update tools
//!
//! `update_task_for_user` sends only the fields provided;
//! `update_task_by_title` resolves the task first and sends a complete
//! record where unspecified fields keep their current values.

use std::sync::Arc;

use agent_core::{
    AgentError, ParameterSchema, Result as CoreResult, Tool, ToolDescriptor, ToolInvocation,
    ToolOutput,
};
use async_trait::async_trait;

use super::{authenticate, descriptor, find_by_title, update_fields, write_output};
use crate::backend::TaskBackend;

fn field_params(title_key: &str, title_description: &str) -> Vec<ParameterSchema> {
    vec![
        ParameterSchema::optional(title_key, "string", title_description),
        ParameterSchema::optional("description", "string", "New description"),
        ParameterSchema::optional("due_date", "string", "New due date as YYYY-MM-DD"),
        ParameterSchema::optional("completed", "boolean", "Mark the task done or not done"),
    ]
}

pub struct UpdateTaskTool {
    backend: Arc<dyn TaskBackend>,
}

impl UpdateTaskTool {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for UpdateTaskTool {
    fn descriptor(&self) -> ToolDescriptor {
        let mut params = vec![ParameterSchema::required("task_id", "integer", "Task ID")];
        params.extend(field_params("title", "New title"));
        descriptor(
            "update_task_for_user",
            "Update the task with the given ID. Only provide the fields you want to change.",
            params,
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> CoreResult<ToolOutput> {
        let token = authenticate(self.backend.as_ref(), invocation).await?;
        let update = update_fields(invocation, "title");
        if update.is_empty() {
            return Err(AgentError::ToolProvider("No update fields provided.".into()));
        }

        let task_id = invocation.i64_arg("task_id").unwrap_or_default();
        let updated = self
            .backend
            .update_task(&token, task_id, &update)
            .await
            .map_err(|e| e.during(&format!("update task {task_id}")))?;

        write_output(format!("Task {task_id} updated successfully."), updated)
    }
}

pub struct UpdateTaskByTitleTool {
    backend: Arc<dyn TaskBackend>,
}

impl UpdateTaskByTitleTool {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for UpdateTaskByTitleTool {
    fn descriptor(&self) -> ToolDescriptor {
        let mut params = vec![ParameterSchema::required(
            "title",
            "string",
            "Current title of the task (case-insensitive)",
        )];
        params.extend(field_params("new_title", "Replacement title"));
        descriptor(
            "update_task_by_title",
            "Update a task using its title instead of its ID. Matches the first task with that title.",
            params,
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> CoreResult<ToolOutput> {
        let title = invocation.str_arg("title").unwrap_or_default();
        let token = authenticate(self.backend.as_ref(), invocation).await?;
        let tasks = self
            .backend
            .list_tasks(&token)
            .await
            .map_err(|e| e.during("fetch tasks"))?;
        let current = find_by_title(&tasks, title)?;

        let update = update_fields(invocation, "new_title").merged_over(current);
        let updated = self
            .backend
            .update_task(&token, current.id, &update)
            .await
            .map_err(|e| e.during(&format!("update task '{title}'")))?;

        write_output(format!("Task '{title}' updated successfully."), updated)
    }
}
