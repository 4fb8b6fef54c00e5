//! REST task service client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::TaskBackend;
use crate::error::{Result, TaskError};
use crate::model::{Credentials, NewTask, Task, TaskUpdate};

/// Default API root of the task service
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Task service client over HTTP with bearer-token auth
#[derive(Clone, Debug)]
pub struct HttpTaskBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTaskBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from `TASK_API_URL`, falling back to [`DEFAULT_BASE_URL`]
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("TASK_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        Self::new(&base_url, Duration::from_secs(30))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks/", self.base_url)
    }

    fn task_url(&self, id: i64) -> String {
        format!("{}/tasks/{id}/", self.base_url)
    }

    /// Pass through responses with the `expected` status; anything else becomes `TaskError::Http`
    async fn expect(response: Response, expected: StatusCode) -> Result<Response> {
        let status = response.status();
        if status == expected {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), %body, "Task service rejected request");
        Err(TaskError::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read the echoed task record of an already-successful write, if any
    async fn record(response: Response) -> Option<Task> {
        let bytes = response.bytes().await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::debug!(error = %e, "Task service returned no task record");
                None
            }
        }
    }
}

#[async_trait]
impl TaskBackend for HttpTaskBackend {
    async fn login(&self, credentials: &Credentials) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/token/", self.base_url))
            .json(credentials)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            tracing::debug!(username = %credentials.username, status = %response.status(), "Login rejected");
            return Err(TaskError::Auth);
        }

        let body: Value = Self::parse(response).await?;
        body.get("access")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or(TaskError::MissingToken)
    }

    async fn list_tasks(&self, token: &str) -> Result<Vec<Task>> {
        let response = self
            .http
            .get(self.tasks_url())
            .bearer_auth(token)
            .send()
            .await?;
        Self::parse(Self::expect(response, StatusCode::OK).await?).await
    }

    async fn create_task(&self, token: &str, task: &NewTask) -> Result<Option<Task>> {
        let response = self
            .http
            .post(self.tasks_url())
            .bearer_auth(token)
            .json(task)
            .send()
            .await?;
        Ok(Self::record(Self::expect(response, StatusCode::CREATED).await?).await)
    }

    async fn update_task(
        &self,
        token: &str,
        id: i64,
        update: &TaskUpdate,
    ) -> Result<Option<Task>> {
        let response = self
            .http
            .put(self.task_url(id))
            .bearer_auth(token)
            .json(update)
            .send()
            .await?;
        Ok(Self::record(Self::expect(response, StatusCode::OK).await?).await)
    }

    async fn delete_task(&self, token: &str, id: i64) -> Result<()> {
        let response = self
            .http
            .delete(self.task_url(id))
            .bearer_auth(token)
            .send()
            .await?;
        Self::expect(response, StatusCode::NO_CONTENT).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
