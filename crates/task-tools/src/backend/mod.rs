//! Task Service Integration
//!
//! Abstractions and implementations for the REST task service.

mod http;
mod mock;

pub use http::HttpTaskBackend;
pub use mock::MockTaskBackend;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Credentials, NewTask, Task, TaskUpdate};

/// Task service client trait
///
/// Every operation except `login` takes the bearer token `login` returned.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Exchange credentials for a bearer token
    async fn login(&self, credentials: &Credentials) -> Result<String>;

    /// All tasks of the authenticated user, in service order
    async fn list_tasks(&self, token: &str) -> Result<Vec<Task>>;

    /// Create a task. Success is decided by status; the stored record is
    /// returned when the service echoes one back.
    async fn create_task(&self, token: &str, task: &NewTask) -> Result<Option<Task>>;

    async fn update_task(
        &self,
        token: &str,
        id: i64,
        update: &TaskUpdate,
    ) -> Result<Option<Task>>;

    async fn delete_task(&self, token: &str, id: i64) -> Result<()>;

    /// Backend name
    fn name(&self) -> &str;
}
