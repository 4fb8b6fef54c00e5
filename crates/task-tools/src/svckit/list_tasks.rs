use std::sync::Arc;

use agent_core::{Result as CoreResult, Tool, ToolDescriptor, ToolInvocation, ToolOutput};
use async_trait::async_trait;

use super::{authenticate, descriptor};
use crate::backend::TaskBackend;

/// Lists every task of a user in service order
pub struct GetTasksTool {
    backend: Arc<dyn TaskBackend>,
}

impl GetTasksTool {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for GetTasksTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "get_tasks_for_user",
            "Return all tasks for a user in the order the task service keeps them. Positions used by other tools count from 1 in this order.",
            vec![],
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> CoreResult<ToolOutput> {
        let token = authenticate(self.backend.as_ref(), invocation).await?;
        let tasks = self
            .backend
            .list_tasks(&token)
            .await
            .map_err(|e| e.during("get tasks"))?;

        let text = serde_json::to_string_pretty(&tasks)?;
        Ok(ToolOutput::text(text).with_data(serde_json::to_value(&tasks)?))
    }
}
