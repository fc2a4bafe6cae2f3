use crate::constants::server::{NAME as SERVER_NAME, PROTOCOL_VERSION, VERSION as SERVER_VERSION};
use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::dispatcher::ProtocolDispatcher;
use crate::mcp::protocol::{
    CallToolParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{broadcast, mpsc};

pub const LIST_CHANGED_METHOD: &str = "notifications/tools/list_changed";

/// JSON-RPC front end over a line-delimited byte stream.
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Arc<ProtocolDispatcher>,
}

impl McpServer {
    pub fn new(dispatcher: Arc<ProtocolDispatcher>) -> Self {
        Self { dispatcher }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": true}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        json!({ "tools": self.dispatcher.list_tools() })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, McpError> {
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|err| McpError::invalid_params(format!("Invalid tools/call params: {}", err)))?;
        if params.name.trim().is_empty() {
            return Err(McpError::invalid_params("Missing tool name"));
        }
        let result = self
            .dispatcher
            .call_tool(&params.name, params.arguments)
            .await?;
        serde_json::to_value(result)
            .map_err(|err| McpError::new(ErrorCode::InternalError, err.to_string()))
    }

    /// Answers one request; `None` for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id?;
        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.handle_initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(request.params).await,
            other => Err(McpError::new(
                ErrorCode::MethodNotFound,
                format!("Method not found: {}", other),
            )),
        };
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::failure(id, &err),
        })
    }

    /// Serves until the reader hits EOF. Requests run concurrently; a single
    /// task owns the writer.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_lines(writer, rx));
        let notifier = tokio::spawn(forward_list_changed(self.dispatcher.subscribe(), tx.clone()));

        let mut lines = BufReader::new(reader).lines();
        let mut pending = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|err| ToolError::internal(format!("Failed to read stdin: {}", err)))?
        {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let parsed: Value = match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(_) => {
                    let err = McpError::new(ErrorCode::ParseError, "Parse error");
                    send_line(&tx, &JsonRpcResponse::failure(Value::Null, &err));
                    continue;
                }
            };
            let request: JsonRpcRequest = match serde_json::from_value(parsed) {
                Ok(req) => req,
                Err(_) => {
                    let err = McpError::new(ErrorCode::InvalidRequest, "Invalid request");
                    send_line(&tx, &JsonRpcResponse::failure(Value::Null, &err));
                    continue;
                }
            };

            if request.is_notification() {
                tracing::debug!(method = %request.method, "notification received");
                continue;
            }

            let server = self.clone();
            let tx = tx.clone();
            pending.push(tokio::spawn(async move {
                if let Some(response) = server.handle_request(request).await {
                    send_line(&tx, &response);
                }
            }));
            pending.retain(|handle| !handle.is_finished());
        }

        for handle in pending {
            let _ = handle.await;
        }
        notifier.abort();
        drop(tx);
        writer_task
            .await
            .map_err(|err| ToolError::internal(format!("Writer task failed: {}", err)))?
    }
}

fn send_line<T: Serialize>(tx: &mpsc::UnboundedSender<String>, message: &T) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            let _ = tx.send(payload);
        }
        Err(err) => tracing::error!(error = %err, "failed to encode outgoing message"),
    }
}

async fn write_lines<W>(writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> Result<(), ToolError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn forward_list_changed(
    mut changes: broadcast::Receiver<()>,
    tx: mpsc::UnboundedSender<String>,
) {
    loop {
        match changes.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                send_line(&tx, &JsonRpcNotification::new(LIST_CHANGED_METHOD));
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub async fn run_stdio(dispatcher: Arc<ProtocolDispatcher>) -> Result<(), ToolError> {
    tracing::info!(tools = dispatcher.len(), "serving on stdio");
    McpServer::new(dispatcher)
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await
}
