//! One agent process speaking JSON-RPC over its stdio.
//!
//! Requests and notifications are written one per line. Every request
//! registers a waiter under its id before it is written. Whoever holds the
//! stdout lock reads for everyone: responses go to their waiters and
//! `session/update` notifications go to the bus while a prompt streams.
//! A `session/set_model` sent mid-prompt is therefore answered as soon as
//! its response line goes by. Writes such as `session/cancel` only take
//! the stdin lock.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::process::Stdio;

use futures::channel::oneshot;
use futures::{select_biased, FutureExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use notebook_core::event_bus::EventBus;
use notebook_types::{config::AgentConfig, NotebookError, Result};

use super::protocol::{JsonRpcMessage, JsonRpcRequest, SessionUpdate};

const PROCESS_CLOSED: &str = "ACP process closed";

/// The prompt currently streaming on this process.
struct Streaming {
    session_id: String,
    text: String,
}

pub struct AcpConnection {
    child: RefCell<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<Lines<BufReader<ChildStdout>>>,
    next_id: Cell<u64>,
    pending: RefCell<HashMap<u64, oneshot::Sender<JsonRpcMessage>>>,
    streaming: RefCell<Option<Streaming>>,
    bus: EventBus,
}

impl AcpConnection {
    pub fn spawn(cli_path: &str, args: &[String], bus: EventBus) -> Result<Self> {
        let mut child = Command::new(cli_path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NotebookError::Rpc(format!("Failed to spawn {}: {}", cli_path, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| NotebookError::Rpc("Failed to capture agent stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| NotebookError::Rpc("Failed to capture agent stdout".to_string()))?;
        log::debug!("Spawned {} (pid {:?})", cli_path, child.id());

        Ok(Self {
            child: RefCell::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout).lines()),
            next_id: Cell::new(0),
            pending: RefCell::new(HashMap::new()),
            streaming: RefCell::new(None),
            bus,
        })
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn register(&self) -> (u64, oneshot::Receiver<JsonRpcMessage>) {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().insert(id, tx);
        (id, rx)
    }

    async fn write_request(&self, id: u64, method: &str, params: Value) -> Result<()> {
        let mut line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        line.push('\n');
        log::debug!(">>> [id={}] {}", id, method);

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Write a registered request and wait for its response. `None` when
    /// the process closed its stdout first.
    async fn request(&self, method: &str, params: Value) -> Result<Option<JsonRpcMessage>> {
        let (id, rx) = self.register();
        if let Err(e) = self.write_request(id, method, params).await {
            self.pending.borrow_mut().remove(&id);
            return Err(e);
        }
        self.response(id, rx).await
    }

    /// Either another reader hands the response over, or this caller takes
    /// the stdout lock and reads until it shows up.
    async fn response(
        &self,
        id: u64,
        mut rx: oneshot::Receiver<JsonRpcMessage>,
    ) -> Result<Option<JsonRpcMessage>> {
        let mut stdout = select_biased! {
            msg = rx => return Ok(msg.ok()),
            stdout = self.stdout.lock().fuse() => stdout,
        };
        match rx.try_recv() {
            Ok(Some(msg)) => return Ok(Some(msg)),
            Ok(None) => {}
            Err(_) => return Ok(None),
        }

        loop {
            let Some(line) = stdout.next_line().await? else {
                // Dropping the senders wakes every other waiter with `None`
                self.pending.borrow_mut().clear();
                return Ok(None);
            };
            let Some(msg) = JsonRpcMessage::parse(&line) else {
                continue;
            };
            if msg.answers(id) {
                self.pending.borrow_mut().remove(&id);
                return Ok(Some(msg));
            }
            self.route(msg);
        }
    }

    fn route(&self, msg: JsonRpcMessage) {
        if let Some(update) = msg.session_update() {
            self.publish(update);
            return;
        }
        let Some(id) = msg.response_id() else {
            return;
        };
        let waiter = self.pending.borrow_mut().remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(msg);
            }
            None => log::debug!("Dropping response to unknown request {}", id),
        }
    }

    fn publish(&self, update: SessionUpdate) {
        let mut streaming = self.streaming.borrow_mut();
        let Some(streaming) = streaming.as_mut() else {
            log::debug!("Ignoring session/update outside a prompt");
            return;
        };
        match update {
            SessionUpdate::Chunk(chunk) => {
                streaming.text.push_str(&chunk);
                self.bus.publish_chunk(&streaming.session_id, chunk);
            }
            SessionUpdate::Status(update) => {
                self.bus.publish_status(&streaming.session_id, update);
            }
        }
    }

    /// Send a request and wait for its response.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        match self.request(method, params).await? {
            Some(msg) => msg.into_result(),
            None => Err(NotebookError::Rpc(PROCESS_CLOSED.to_string())),
        }
    }

    pub async fn initialize(&self, config: &AgentConfig) -> Result<Value> {
        self.call(
            "initialize",
            json!({
                "protocolVersion": config.protocol_version,
                "clientCapabilities": {},
                "clientInfo": {
                    "name": config.client_name,
                    "version": config.client_version,
                },
            }),
        )
        .await
    }

    pub async fn new_session(&self, cwd: &str) -> Result<String> {
        let result = self
            .call("session/new", json!({ "cwd": cwd, "mcpServers": [] }))
            .await?;
        result
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| NotebookError::Rpc("No sessionId in response".to_string()))
    }

    pub async fn load_session(&self, session_id: &str, cwd: &str) -> Result<()> {
        self.call(
            "session/load",
            json!({ "sessionId": session_id, "cwd": cwd, "mcpServers": [] }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_model(&self, session_id: &str, model_id: &str) -> Result<()> {
        self.call(
            "session/set_model",
            json!({ "sessionId": session_id, "modelId": model_id }),
        )
        .await?;
        Ok(())
    }

    /// Run a prompt, publishing `session/update` notifications on the bus
    /// until the prompt's response arrives. Returns the accumulated text.
    pub async fn prompt(&self, session_id: &str, text: &str) -> Result<String> {
        *self.streaming.borrow_mut() = Some(Streaming {
            session_id: session_id.to_string(),
            text: String::new(),
        });
        let outcome = self
            .request(
                "session/prompt",
                json!({
                    "sessionId": session_id,
                    "prompt": [{ "type": "text", "text": text }],
                }),
            )
            .await;
        let full = self
            .streaming
            .borrow_mut()
            .take()
            .map(|s| s.text)
            .unwrap_or_default();

        match outcome {
            Ok(Some(msg)) => msg
                .into_result()
                .map(|_| full)
                .map_err(|e| NotebookError::Prompt(e.detail())),
            Ok(None) if !full.is_empty() => {
                log::warn!("Agent for {} exited mid-response", session_id);
                Ok(full)
            }
            Ok(None) => Err(NotebookError::Prompt(PROCESS_CLOSED.to_string())),
            Err(e) => Err(NotebookError::Prompt(e.detail())),
        }
    }

    /// Ask the agent to stop the running prompt. The prompt itself resolves
    /// through its own response.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let id = self.next_id();
        self.write_request(id, "session/cancel", json!({ "sessionId": session_id }))
            .await
    }

    pub fn kill(&self) {
        let mut child = self.child.borrow_mut();
        if let Err(e) = child.start_kill() {
            log::debug!("Agent process already gone: {}", e);
        }
    }
}
