//! Mock Task Backend
//!
//! In-memory task service for testing and demo purposes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::TaskBackend;
use crate::error::{Result, TaskError};
use crate::model::{Credentials, NewTask, Task, TaskUpdate};

#[derive(Default)]
struct Store {
    passwords: HashMap<String, String>,
    tasks: HashMap<String, Vec<Task>>,
    next_id: i64,
    outage: Option<u16>,
}

/// In-memory task service keyed by username
#[derive(Default)]
pub struct MockTaskBackend {
    store: Mutex<Store>,
}

impl MockTaskBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account (builder style)
    #[must_use]
    pub fn with_user(self, username: &str, password: &str) -> Self {
        if let Ok(mut store) = self.store.lock() {
            store.passwords.insert(username.into(), password.into());
            store.tasks.entry(username.into()).or_default();
        }
        self
    }

    /// Seed a task for `username` (builder style)
    #[must_use]
    pub fn with_task(self, username: &str, title: &str, description: Option<&str>) -> Self {
        if let Ok(mut store) = self.store.lock() {
            let task = NewTask {
                title: title.into(),
                description: description.map(str::to_string),
                due_date: None,
            };
            store.insert(username, &task);
        }
        self
    }

    /// Fail every task operation with `status` (builder style)
    #[must_use]
    pub fn with_outage(self, status: u16) -> Self {
        if let Ok(mut store) = self.store.lock() {
            store.outage = Some(status);
        }
        self
    }

    /// Snapshot of a user's tasks
    pub fn tasks_of(&self, username: &str) -> Vec<Task> {
        self.store
            .lock()
            .ok()
            .and_then(|store| store.tasks.get(username).cloned())
            .unwrap_or_default()
    }

    fn with_store<T>(&self, token: &str, op: impl FnOnce(&mut Store, &str) -> Result<T>) -> Result<T> {
        let mut store = self.store.lock().map_err(|_| TaskError::Http {
            status: 500,
            body: "store poisoned".into(),
        })?;
        if let Some(status) = store.outage {
            return Err(TaskError::Http {
                status,
                body: "service unavailable".into(),
            });
        }
        let username = token
            .strip_prefix("mock-token-")
            .filter(|user| store.passwords.contains_key(*user))
            .ok_or_else(|| TaskError::Http {
                status: 401,
                body: r#"{"detail":"Given token not valid for any token type"}"#.into(),
            })?
            .to_string();
        op(&mut *store, &username)
    }
}

impl Store {
    fn insert(&mut self, username: &str, task: &NewTask) -> Task {
        self.next_id += 1;
        let created = Task {
            id: self.next_id,
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date.clone(),
            completed: false,
            created_at: Some(Utc::now()),
        };
        self.tasks.entry(username.into()).or_default().push(created.clone());
        created
    }

    fn task_mut(&mut self, username: &str, id: i64) -> Result<&mut Task> {
        self.tasks
            .get_mut(username)
            .and_then(|tasks| tasks.iter_mut().find(|t| t.id == id))
            .ok_or_else(not_found)
    }
}

fn not_found() -> TaskError {
    TaskError::Http {
        status: 404,
        body: r#"{"detail":"Not found."}"#.into(),
    }
}

#[async_trait]
impl TaskBackend for MockTaskBackend {
    async fn login(&self, credentials: &Credentials) -> Result<String> {
        let store = self.store.lock().map_err(|_| TaskError::Auth)?;
        match store.passwords.get(&credentials.username) {
            Some(password) if *password == credentials.password => {
                Ok(format!("mock-token-{}", credentials.username))
            }
            _ => Err(TaskError::Auth),
        }
    }

    async fn list_tasks(&self, token: &str) -> Result<Vec<Task>> {
        self.with_store(token, |store, user| {
            Ok(store.tasks.get(user).cloned().unwrap_or_default())
        })
    }

    async fn create_task(&self, token: &str, task: &NewTask) -> Result<Option<Task>> {
        self.with_store(token, |store, user| Ok(Some(store.insert(user, task))))
    }

    async fn update_task(
        &self,
        token: &str,
        id: i64,
        update: &TaskUpdate,
    ) -> Result<Option<Task>> {
        self.with_store(token, |store, user| {
            let task = store.task_mut(user, id)?;
            update.apply(task);
            Ok(Some(task.clone()))
        })
    }

    async fn delete_task(&self, token: &str, id: i64) -> Result<()> {
        self.with_store(token, |store, user| {
            let tasks = store.tasks.get_mut(user).ok_or_else(not_found)?;
            let index = tasks.iter().position(|t| t.id == id).ok_or_else(not_found)?;
            tasks.remove(index);
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_and_list() {
        let backend = MockTaskBackend::new()
            .with_user("sam", "pw")
            .with_task("sam", "Buy milk", None);

        assert!(matches!(
            backend.login(&Credentials::new("sam", "wrong")).await,
            Err(TaskError::Auth)
        ));

        let token = backend.login(&Credentials::new("sam", "pw")).await.unwrap();
        let tasks = backend.list_tasks(&token).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Buy milk");
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let backend = MockTaskBackend::new()
            .with_user("sam", "pw")
            .with_user("kim", "pw")
            .with_task("kim", "Private", None);

        let token = backend.login(&Credentials::new("sam", "pw")).await.unwrap();
        assert!(backend.list_tasks(&token).await.unwrap().is_empty());
        assert!(backend.delete_task(&token, 1).await.is_err());
        assert_eq!(backend.tasks_of("kim").len(), 1);
    }

    #[tokio::test]
    async fn test_outage_returns_http_error() {
        let backend = MockTaskBackend::new().with_user("sam", "pw").with_outage(503);
        let token = backend.login(&Credentials::new("sam", "pw")).await.unwrap();
        match backend.list_tasks(&token).await {
            Err(TaskError::Http { status, .. }) => assert_eq!(status, 503),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
