//! JSON-RPC 2.0 framing and the `session/update` payloads the client consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use notebook_types::{event::StatusUpdate, NotebookError, Result};

pub const METHOD_SESSION_UPDATE: &str = "session/update";
pub const LOCK_CONFLICT: &str = "active in another process";

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Any line the agent writes: a response (has `id`) or a notification
/// (has `method`). Requests from the agent carry both and are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRpcMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl JsonRpcMessage {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str(line) {
            Ok(msg) => Some(msg),
            Err(e) => {
                log::debug!("Ignoring non-JSON-RPC line ({}): {}", e, line);
                None
            }
        }
    }

    /// Id of the request this line responds to, if it is a response.
    pub fn response_id(&self) -> Option<u64> {
        if self.method.is_some() {
            return None;
        }
        self.id.as_ref().and_then(Value::as_u64)
    }

    /// Whether this is the response to request `id`.
    pub fn answers(&self, id: u64) -> bool {
        self.response_id() == Some(id)
    }

    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            let message = match (error.get("message").and_then(Value::as_str), error.get("data")) {
                (Some(message), Some(data)) => format!("{}: {}", message, data),
                (Some(message), None) => message.to_string(),
                _ => error.to_string(),
            };
            return Err(NotebookError::Rpc(message));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }

    pub fn session_update(&self) -> Option<SessionUpdate> {
        if self.method.as_deref() != Some(METHOD_SESSION_UPDATE) {
            return None;
        }
        parse_update(self.params.as_ref()?.get("update")?)
    }
}

/// The parts of a `session/update` notification the notebook reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Chunk(String),
    Status(StatusUpdate),
}

pub fn parse_update(update: &Value) -> Option<SessionUpdate> {
    let text_field = |name: &str| update.get(name).and_then(Value::as_str).map(str::to_string);
    match update.get("sessionUpdate").and_then(Value::as_str)? {
        "agent_message_chunk" => update
            .pointer("/content/text")
            .and_then(Value::as_str)
            .map(|t| SessionUpdate::Chunk(t.to_string())),
        "tool_call" => Some(SessionUpdate::Status(StatusUpdate::ToolCall {
            title: text_field("title"),
            status: text_field("status"),
        })),
        "tool_call_update" => Some(SessionUpdate::Status(StatusUpdate::ToolUpdate {
            status: text_field("status"),
        })),
        _ => None,
    }
}

/// `session/load` refused because a previous process still holds the lock.
pub fn is_lock_conflict(err: &NotebookError) -> bool {
    err.detail().contains(LOCK_CONFLICT)
}
