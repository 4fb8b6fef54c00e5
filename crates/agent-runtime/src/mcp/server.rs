use std::collections::HashMap;
use std::sync::Arc;

use agent_core::{AgentError, ToolCallRequest, ToolInvocation, ToolSession};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use super::McpError;
use super::protocol::{
    CancelledParams, INVALID_PARAMS, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
    McpToolDefinition, PROTOCOL_VERSION, ToolCallParams, ToolCallResult,
};

type SharedWriter<W> = Arc<Mutex<W>>;
type Pending = Arc<std::sync::Mutex<HashMap<u64, AbortHandle>>>;

/// Serve `session`'s tools over a line-delimited JSON-RPC stream until EOF.
///
/// Each `tools/call` runs as its own task so `notifications/cancelled` can
/// abort it. Tool failures are reported as `isError` results, never as
/// JSON-RPC errors.
pub async fn serve_tools<R, W>(
    session: Arc<dyn ToolSession>,
    reader: R,
    writer: W,
) -> Result<(), McpError>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let writer: SharedWriter<W> = Arc::new(Mutex::new(writer));
    let pending: Pending = Arc::default();
    let mut lines = BufReader::new(reader).lines();

    tracing::info!(session = %session.id(), tools = session.catalog().len(), "Serving tools");

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed JSON-RPC line");
                continue;
            }
        };

        match (request.id, request.method.as_str()) {
            (None, "notifications/cancelled") => cancel(&pending, request.params),
            (None, method) => tracing::debug!(method, "Notification received"),
            (Some(id), "tools/call") => {
                let params = request
                    .params
                    .map(serde_json::from_value::<ToolCallParams>)
                    .transpose();
                match params {
                    Ok(Some(params)) => {
                        spawn_call(Arc::clone(&session), Arc::clone(&writer), &pending, id, params);
                    }
                    Ok(None) | Err(_) => {
                        let response =
                            JsonRpcResponse::err(id, INVALID_PARAMS, "tools/call requires a tool name");
                        write_message(&writer, &response).await?;
                    }
                }
            }
            (Some(id), method) => {
                let response = handle_request(session.as_ref(), id, method);
                write_message(&writer, &response).await?;
            }
        }
    }

    let outstanding: Vec<AbortHandle> = pending
        .lock()
        .map(|mut map| map.drain().map(|(_, handle)| handle).collect())
        .unwrap_or_default();
    for handle in outstanding {
        handle.abort();
    }

    tracing::info!(session = %session.id(), "Client disconnected");
    Ok(())
}

fn handle_request(session: &dyn ToolSession, id: u64, method: &str) -> JsonRpcResponse {
    match method {
        "initialize" => JsonRpcResponse::ok(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": session.id(),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "tools/list" => {
            let tools: Vec<McpToolDefinition> = session
                .catalog()
                .iter()
                .map(|d| McpToolDefinition {
                    name: d.name.clone(),
                    description: d.description.clone(),
                    input_schema: d.to_json_schema(),
                })
                .collect();
            JsonRpcResponse::ok(id, json!({ "tools": tools }))
        }
        "ping" => JsonRpcResponse::ok(id, json!({})),
        other => JsonRpcResponse::err(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
    }
}

fn spawn_call<W>(
    session: Arc<dyn ToolSession>,
    writer: SharedWriter<W>,
    pending: &Pending,
    id: u64,
    params: ToolCallParams,
) where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let Ok(mut map) = pending.lock() else {
        return;
    };

    let registry = Arc::clone(pending);
    let task = tokio::spawn(async move {
        let result = call_tool(session.as_ref(), params).await;
        if let Ok(mut map) = registry.lock() {
            map.remove(&id);
        }
        let value = serde_json::to_value(&result).unwrap_or(Value::Null);
        if let Err(e) = write_message(&writer, &JsonRpcResponse::ok(id, value)).await {
            tracing::warn!(error = %e, "Failed to write tool result");
        }
    });
    map.insert(id, task.abort_handle());
}

async fn call_tool(session: &dyn ToolSession, params: ToolCallParams) -> ToolCallResult {
    let Some(descriptor) = session.catalog().iter().find(|d| d.name == params.name) else {
        return ToolCallResult::text(AgentError::UnknownTool(params.name).to_string(), true);
    };

    if let Err(reason) = descriptor.validate(&params.arguments) {
        let error = AgentError::InvalidArguments {
            tool: params.name,
            reason,
        };
        return ToolCallResult::text(error.to_string(), true);
    }

    let invocation = ToolInvocation::new(
        ToolCallRequest {
            name: params.name,
            arguments: params.arguments,
        },
        0,
    );

    match session.invoke(&invocation).await {
        Ok(output) => ToolCallResult::text(output.text, false),
        Err(AgentError::ToolProvider(detail)) => ToolCallResult::text(detail, true),
        Err(e) => ToolCallResult::text(e.to_string(), true),
    }
}

fn cancel(pending: &Pending, params: Option<Value>) {
    let Some(params) = params.and_then(|p| serde_json::from_value::<CancelledParams>(p).ok()) else {
        return;
    };
    let handle = pending
        .lock()
        .ok()
        .and_then(|mut map| map.remove(&params.request_id));
    if let Some(handle) = handle {
        tracing::debug!(request_id = params.request_id, "Cancelling tool call");
        handle.abort();
    }
}

async fn write_message<W, T>(writer: &SharedWriter<W>, message: &T) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
