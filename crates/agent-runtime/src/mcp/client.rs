use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use agent_core::{Result as CoreResult, ToolDescriptor, ToolInvocation, ToolOutput, ToolSession};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::debug;

use super::McpError;
use super::protocol::{
    CancelledParams, InitializeParams, JsonRpcRequest, JsonRpcResponse, McpToolDefinition,
    PROTOCOL_VERSION, PeerInfo, ToolCallParams, ToolCallResult,
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const EXIT_GRACE: Duration = Duration::from_secs(5);

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One entry of the `mcpServers` configuration map
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-request timeout; none by default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Byte channel to the provider. Requests are serialized through one lock.
struct Transport {
    writer: Option<BoxedWriter>,
    reader: BoxedReader,
}

/// Tool session speaking JSON-RPC lines to a provider
pub struct McpToolSession {
    id: String,
    catalog: Vec<ToolDescriptor>,
    next_id: AtomicU64,
    transport: Mutex<Transport>,
    child: Mutex<Option<Child>>,
    in_flight: std::sync::Mutex<HashMap<String, u64>>,
    request_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl McpToolSession {
    /// Spawn a child-process provider and complete the handshake.
    pub async fn spawn(id: &str, config: &McpServerConfig) -> Result<Self, McpError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            McpError::SpawnFailed(format!("failed to spawn '{}': {e}", config.command))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdout".into()))?;

        let mut session = Self::new(id, Box::new(stdout), Box::new(stdin));
        session.child = Mutex::new(Some(child));
        session.request_timeout = config.timeout_secs.map(Duration::from_secs);

        if let Err(e) = session.handshake().await {
            let _ = session.shutdown().await;
            return Err(e);
        }
        Ok(session)
    }

    /// Connect over an already-open byte stream and complete the handshake.
    pub async fn connect<R, W>(id: &str, reader: R, writer: W) -> Result<Self, McpError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut session = Self::new(id, Box::new(reader), Box::new(writer));
        session.handshake().await?;
        Ok(session)
    }

    fn new(
        id: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: BoxedWriter,
    ) -> Self {
        Self {
            id: id.to_string(),
            catalog: Vec::new(),
            next_id: AtomicU64::new(1),
            transport: Mutex::new(Transport {
                writer: Some(writer),
                reader: BufReader::new(reader),
            }),
            child: Mutex::new(None),
            in_flight: std::sync::Mutex::new(HashMap::new()),
            request_timeout: None,
            closed: AtomicBool::new(false),
        }
    }

    /// initialize → notifications/initialized → tools/list
    async fn handshake(&mut self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: serde_json::json!({}),
            client_info: PeerInfo {
                name: "task-agent".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };

        let response = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            self.send_request("initialize", Some(serde_json::to_value(&params)?), None),
        )
        .await
        .map_err(|_| McpError::Timeout)??;
        debug!(session = %self.id, response = %response, "Tool provider initialized");

        self.send_notification("notifications/initialized", None)
            .await?;

        let listed = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            self.send_request("tools/list", None, None),
        )
        .await
        .map_err(|_| McpError::Timeout)??;

        let tools_value = listed
            .get("tools")
            .cloned()
            .unwrap_or(Value::Array(vec![]));
        let tools: Vec<McpToolDefinition> = serde_json::from_value(tools_value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools list: {e}")))?;

        self.catalog = tools
            .iter()
            .map(|t| ToolDescriptor::from_json_schema(&t.name, &t.description, &t.input_schema))
            .collect();

        tracing::info!(session = %self.id, tools = self.catalog.len(), "Tool provider handshake complete");
        Ok(())
    }

    /// Send a request and wait for the response with the same id.
    ///
    /// `invocation_id` is remembered while the request is in flight so the
    /// request can be cancelled by invocation.
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        invocation_id: Option<&str>,
    ) -> Result<Value, McpError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        line.push('\n');

        if let Some(invocation_id) = invocation_id {
            self.track(invocation_id, Some(id));
        }

        let exchange = self.exchange(&line, id);
        let response = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| McpError::Timeout)
                .and_then(|r| r),
            None => exchange.await,
        };

        if let Some(invocation_id) = invocation_id {
            self.track(invocation_id, None);
        }

        response?.into_result()
    }

    async fn exchange(&self, line: &str, id: u64) -> Result<JsonRpcResponse, McpError> {
        let mut transport = self.transport.lock().await;
        let writer = transport.writer.as_mut().ok_or(McpError::Closed)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Self::read_response(&self.id, &mut transport.reader, id).await
    }

    /// Send a JSON-RPC notification (no id, no response expected).
    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let mut line = serde_json::to_string(&JsonRpcRequest::notification(method, params))?;
        line.push('\n');

        let mut transport = self.transport.lock().await;
        let writer = transport.writer.as_mut().ok_or(McpError::Closed)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read lines until a response matching `expected_id`; stale responses of abandoned requests are skipped.
    async fn read_response(
        session: &str,
        reader: &mut BoxedReader,
        expected_id: u64,
    ) -> Result<JsonRpcResponse, McpError> {
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = reader.read_line(&mut buf).await?;
            if n == 0 {
                return Err(McpError::Transport("provider closed its output".into()));
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == Some(expected_id) => return Ok(resp),
                Ok(resp) => {
                    debug!(session, id = ?resp.id, "Skipping non-matching JSON-RPC response");
                }
                Err(_) => {
                    debug!(session, line = trimmed, "Ignoring non-JSON-RPC line from provider");
                }
            }
        }
    }

    fn track(&self, invocation_id: &str, request_id: Option<u64>) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            match request_id {
                Some(id) => {
                    in_flight.insert(invocation_id.to_string(), id);
                }
                None => {
                    in_flight.remove(invocation_id);
                }
            }
        }
    }

    /// Close stdin, then give a child process a grace period before killing it.
    async fn shutdown(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::Release);
        {
            let mut transport = self.transport.lock().await;
            if let Some(mut writer) = transport.writer.take() {
                let _ = writer.shutdown().await;
            }
        }

        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            if tokio::time::timeout(EXIT_GRACE, child.wait()).await.is_err() {
                tracing::warn!(session = %self.id, "Tool provider did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ToolSession for McpToolSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn catalog(&self) -> &[ToolDescriptor] {
        &self.catalog
    }

    async fn invoke(&self, invocation: &ToolInvocation) -> CoreResult<ToolOutput> {
        let params = ToolCallParams {
            name: invocation.name.clone(),
            arguments: invocation.arguments.clone(),
        };
        let result = self
            .send_request(
                "tools/call",
                Some(serde_json::to_value(&params).map_err(McpError::from)?),
                Some(&invocation.id),
            )
            .await?;

        let call_result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("malformed tools/call result: {e}")))?;

        let text = call_result.joined_text();
        if call_result.is_error {
            return Err(McpError::Tool(text).into());
        }

        let data = serde_json::from_str::<Value>(&text)
            .ok()
            .filter(|v| v.is_object() || v.is_array());
        Ok(ToolOutput { text, data })
    }

    async fn abandon(&self, invocation_id: &str) {
        let request_id = self
            .in_flight
            .lock()
            .ok()
            .and_then(|mut in_flight| in_flight.remove(invocation_id));
        let Some(request_id) = request_id else {
            return;
        };

        let params = CancelledParams {
            request_id,
            reason: Some("turn cancelled by user".into()),
        };
        let sent = match serde_json::to_value(&params) {
            Ok(value) => self.send_notification("notifications/cancelled", Some(value)).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            tracing::warn!(session = %self.id, error = %e, "Failed to send cancellation");
        }
    }

    async fn close(&self) -> CoreResult<()> {
        self.shutdown().await.map_err(Into::into)
    }
}
