//! Task creation tool

use std::sync::Arc;

use agent_core::{
    ParameterSchema, Result as CoreResult, Tool, ToolDescriptor, ToolInvocation, ToolOutput,
};
use async_trait::async_trait;

use super::{authenticate, descriptor, write_output};
use crate::backend::TaskBackend;
use crate::model::NewTask;

pub struct AddTaskTool {
    backend: Arc<dyn TaskBackend>,
}

impl AddTaskTool {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for AddTaskTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "add_task_for_user",
            "Log in with the given username and password, then create a task on behalf of the user.",
            vec![
                ParameterSchema::required("title", "string", "Task title"),
                ParameterSchema::optional("description", "string", "Longer description"),
                ParameterSchema::optional("due_date", "string", "Due date as YYYY-MM-DD"),
            ],
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> CoreResult<ToolOutput> {
        let token = authenticate(self.backend.as_ref(), invocation).await?;
        let task = NewTask {
            title: invocation.str_arg("title").unwrap_or_default().to_string(),
            description: invocation.str_arg("description").map(str::to_string),
            due_date: invocation.str_arg("due_date").map(str::to_string),
        };

        let created = self
            .backend
            .create_task(&token, &task)
            .await
            .map_err(|e| e.during("create task"))?;

        let username = invocation.str_arg("username").unwrap_or_default();
        tracing::info!(task_id = ?created.as_ref().map(|t| t.id), %username, "Task created");
        write_output(format!("Task '{}' created for {username}.", task.title), created)
    }
}
