// src/mcp/mod.rs — MCP client (JSON-RPC 2.0 over a line-delimited transport)

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::infra::config::McpConfig;
use crate::infra::errors::{FlywheelError, Result};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

// Standard JSON-RPC 2.0 error codes.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// A notification carries no id and expects no response.
    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: None,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A tool exposed by an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Line-delimited message transport. Subprocess stdio, TCP, and test
/// doubles all fit behind this.
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn send(&mut self, line: &str) -> Result<()>;
    async fn recv(&mut self) -> Result<String>;
}

/// MCP client: handshake, tool discovery, tool calls. Owns request-id
/// allocation and timeout handling; the transport just moves lines.
pub struct McpClient {
    name: String,
    transport: Mutex<Box<dyn McpTransport>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl McpClient {
    pub fn new(name: &str, transport: Box<dyn McpTransport>, cfg: &McpConfig) -> Self {
        Self {
            name: name.to_string(),
            transport: Mutex::new(transport),
            next_id: AtomicU64::new(1),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handshake: `initialize`, then the `notifications/initialized` ack.
    pub async fn initialize(&self) -> Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "flywheel",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        self.request("initialize", params).await?;
        self.notify("notifications/initialized", Value::Null).await
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| FlywheelError::Mcp {
                code: INTERNAL_ERROR,
                message: format!("server '{}' returned no tools field", self.name),
            })?;
        serde_json::from_value(tools).map_err(|e| FlywheelError::Mcp {
            code: PARSE_ERROR,
            message: format!("invalid tools list: {e}"),
        })
    }

    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value> {
        self.request(
            "tools/call",
            json!({ "name": tool, "arguments": arguments }),
        )
        .await
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let line = serde_json::to_string(&request).map_err(|e| FlywheelError::Mcp {
            code: INTERNAL_ERROR,
            message: format!("request serialize failed: {e}"),
        })?;

        let response = tokio::time::timeout(self.timeout, async {
            let mut transport = self.transport.lock().await;
            transport.send(&line).await?;
            // Skip unrelated frames (notifications, stale responses) until
            // our id comes back.
            loop {
                let raw = transport.recv().await?;
                let parsed: JsonRpcResponse =
                    serde_json::from_str(&raw).map_err(|e| FlywheelError::Mcp {
                        code: PARSE_ERROR,
                        message: format!("invalid response frame: {e}"),
                    })?;
                if parsed.id == Some(id) {
                    return Ok::<_, FlywheelError>(parsed);
                }
            }
        })
        .await
        .map_err(|_| FlywheelError::Cancelled(format!("MCP '{}' {method} timed out", self.name)))??;

        if let Some(error) = response.error {
            return Err(FlywheelError::Mcp {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let request = JsonRpcRequest::notification(method, params);
        let line = serde_json::to_string(&request).map_err(|e| FlywheelError::Mcp {
            code: INTERNAL_ERROR,
            message: format!("notification serialize failed: {e}"),
        })?;
        let mut transport = self.transport.lock().await;
        transport.send(&line).await
    }
}
