//! Task deletion tools (by ID, by title, by position)

use std::sync::Arc;

use agent_core::{
    ParameterSchema, Result as CoreResult, Tool, ToolDescriptor, ToolInvocation, ToolOutput,
};
use async_trait::async_trait;
use serde_json::json;

use super::{authenticate, descriptor, find_by_title, task_at_position};
use crate::backend::TaskBackend;

pub struct DeleteTaskTool {
    backend: Arc<dyn TaskBackend>,
}

impl DeleteTaskTool {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for DeleteTaskTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "delete_task_for_user",
            "Delete the task with the given ID.",
            vec![ParameterSchema::required("task_id", "integer", "Task ID")],
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> CoreResult<ToolOutput> {
        let task_id = invocation.i64_arg("task_id").unwrap_or_default();
        let token = authenticate(self.backend.as_ref(), invocation).await?;
        self.backend
            .delete_task(&token, task_id)
            .await
            .map_err(|e| e.during(&format!("delete task {task_id}")))?;

        Ok(ToolOutput::text(format!("Task {task_id} deleted successfully."))
            .with_data(json!({ "deleted": task_id })))
    }
}

pub struct DeleteTaskByTitleTool {
    backend: Arc<dyn TaskBackend>,
}

impl DeleteTaskByTitleTool {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for DeleteTaskByTitleTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "delete_task_by_title",
            "Delete the user's task by its title (case-insensitive match, first match wins).",
            vec![ParameterSchema::required("title", "string", "Title of the task")],
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
        let task_id = find_by_title(&tasks, title)?.id;

        self.backend
            .delete_task(&token, task_id)
            .await
            .map_err(|e| e.during("delete"))?;

        Ok(ToolOutput::text(format!("Task '{title}' deleted.")).with_data(json!({ "deleted": task_id })))
    }
}

pub struct DeleteTaskByPositionTool {
    backend: Arc<dyn TaskBackend>,
}

impl DeleteTaskByPositionTool {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for DeleteTaskByPositionTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "delete_task_by_position",
            "Delete the task at a specific position in the list (1-based).",
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
        let task_id = task_at_position(&tasks, position)?.id;

        self.backend
            .delete_task(&token, task_id)
            .await
            .map_err(|e| e.during("delete"))?;

        Ok(ToolOutput::text(format!("Task #{position} deleted.")).with_data(json!({ "deleted": task_id })))
    }
}
