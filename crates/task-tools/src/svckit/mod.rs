//! Service Kit - Agent Tools
//!
//! Task-manager tools implementing `agent_core::Tool`. Every tool logs in
//! with the supplied username and password before touching the service.

mod add_task;
mod delete_task;
mod list_tasks;
mod suggest;
mod update_task;

pub use add_task::AddTaskTool;
pub use delete_task::{DeleteTaskByPositionTool, DeleteTaskByTitleTool, DeleteTaskTool};
pub use list_tasks::GetTasksTool;
pub use suggest::{SuggestImprovementsTool, review_prompt};
pub use update_task::{UpdateTaskByTitleTool, UpdateTaskTool};

use agent_core::{
    ParameterSchema, Result as CoreResult, ToolDescriptor, ToolInvocation, ToolOutput,
};

use crate::backend::TaskBackend;
use crate::error::TaskError;
use crate::model::{Credentials, Task, TaskUpdate};

fn descriptor(name: &str, description: &str, extra: Vec<ParameterSchema>) -> ToolDescriptor {
    let mut parameters = vec![
        ParameterSchema::required("username", "string", "Task service account name"),
        ParameterSchema::required("password", "string", "Task service account password"),
    ];
    parameters.extend(extra);
    ToolDescriptor {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}

async fn authenticate(backend: &dyn TaskBackend, invocation: &ToolInvocation) -> CoreResult<String> {
    let credentials = Credentials::new(
        invocation.str_arg("username").unwrap_or_default(),
        invocation.str_arg("password").unwrap_or_default(),
    );
    let token = backend.login(&credentials).await?;
    tracing::debug!(username = %credentials.username, backend = backend.name(), "Authenticated");
    Ok(token)
}

/// First task whose trimmed title matches case-insensitively
fn find_by_title<'a>(tasks: &'a [Task], title: &str) -> Result<&'a Task, TaskError> {
    tasks
        .iter()
        .find(|t| t.title_matches(title))
        .ok_or_else(|| TaskError::NotFound(format!("No task found with title '{title}'.")))
}

/// Task at a 1-based position in service order
fn task_at_position(tasks: &[Task], position: i64) -> Result<&Task, TaskError> {
    let index = usize::try_from(position)
        .ok()
        .and_then(|p| p.checked_sub(1))
        .ok_or_else(|| TaskError::NotFound("Task positions start at 1.".into()))?;
    tasks.get(index).ok_or_else(|| {
        TaskError::NotFound(format!(
            "You only have {} task(s). Can't find task at position {position}.",
            tasks.len()
        ))
    })
}

/// Optional update fields; the title comes from `title_key`
fn update_fields(invocation: &ToolInvocation, title_key: &str) -> TaskUpdate {
    TaskUpdate {
        title: invocation.str_arg(title_key).map(str::to_string),
        description: invocation.str_arg("description").map(str::to_string),
        due_date: invocation.str_arg("due_date").map(str::to_string),
        completed: invocation.bool_arg("completed"),
    }
}

/// Success output for a write, carrying the echoed record when there is one
fn write_output(text: String, record: Option<Task>) -> CoreResult<ToolOutput> {
    let output = ToolOutput::text(text);
    Ok(match record {
        Some(task) => output.with_data(serde_json::to_value(&task)?),
        None => output,
    })
}
