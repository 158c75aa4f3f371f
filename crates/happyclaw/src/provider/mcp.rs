// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MCP-style provider: a session backed by one child speaking JSON-RPC 2.0
//! over stdio via [`crate::mcp::McpBridge`].
//!
//! On construction the child is started, an `initialize` handshake is
//! performed, and `notifications/initialized` is fired. Incoming
//! notifications are routed to typed messages/events; `send` is a
//! `tools/call` of `send_message`.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::process::Command;

use super::{
    reject_if_local, terminate_child, BoxFuture, EventHandler, ListenerSlot, MessageBuffer, MessageHandler, Provider,
    ProviderSession, ReadPage, SpawnOptions,
};
use crate::error::{Error, Result};
use crate::mcp::{McpBridge, DEFAULT_TIMEOUT};
use crate::model::{EventKind, MessageKind, Mode, PermissionOutcome, SessionEvent, SessionMessage, Severity};

/// Builds the MCP provider's command line for one session. The `cwd`,
/// `mode`, and `resume_session_id` from [`SpawnOptions`] are available to
/// shape the spawned argv (e.g. appending `--resume <id>`).
pub type CommandBuilder = Arc<dyn Fn(&str, &SpawnOptions) -> Vec<String> + Send + Sync>;

pub struct McpProvider {
    command: CommandBuilder,
    request_timeout: Duration,
}

impl McpProvider {
    pub fn new(command: CommandBuilder) -> Self {
        Self { command, request_timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Provider for McpProvider {
    fn name(&self) -> &'static str {
        "mcp"
    }

    fn spawn<'a>(&'a self, id: &'a str, opts: &'a SpawnOptions) -> BoxFuture<'a, Result<Arc<dyn ProviderSession>>> {
        Box::pin(async move {
            let argv = (self.command)(id, opts);
            let (program, args) = argv.split_first().ok_or_else(|| Error::SpawnFailed("empty command".into()))?;

            let child = Command::new(program)
                .args(args)
                .current_dir(&opts.cwd)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| Error::SpawnFailed(e.to_string()))?;

            let bridge = McpBridge::new(child, self.request_timeout)?;
            let session = Arc::new(McpProviderSession::new(id.to_string(), opts.clone(), bridge));
            if let Err(e) = session.clone().init().await {
                let _ = session.stop(true).await;
                return Err(e);
            }
            Ok(session as Arc<dyn ProviderSession>)
        })
    }
}

struct Shared {
    id: String,
    cwd: String,
    mode: Mode,
    buffer: MessageBuffer,
    stopped: AtomicBool,
    event_handler: ListenerSlot<dyn Fn(SessionEvent) + Send + Sync>,
    message_handler: ListenerSlot<dyn Fn(SessionMessage) + Send + Sync>,
}

fn emit_event(shared: &Shared, event: SessionEvent) {
    if let Some(handler) = shared.event_handler.get() {
        handler(event);
    }
}

fn emit_message(shared: &Shared, message: SessionMessage) {
    shared.buffer.push(message.clone());
    if let Some(handler) = shared.message_handler.get() {
        handler(message);
    }
}

/// Route one notification frame to a typed message or event, per the
/// `notifications/*` method table this provider understands.
fn route_notification(shared: &Shared, frame: Value) {
    let method = frame.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = frame.get("params").cloned().unwrap_or(Value::Null);

    match method {
        "notifications/message" => {
            let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
            emit_message(shared, SessionMessage::new(MessageKind::Text, text));
        }
        "notifications/tools/call_progress" => {
            let tool = params.get("tool").and_then(Value::as_str).unwrap_or("unknown").to_string();
            let detail = params.get("detail").and_then(Value::as_str).unwrap_or_default();
            emit_message(shared, SessionMessage::new(MessageKind::ToolUse, detail).with_meta("tool", tool));
        }
        "notifications/permission_request" => {
            let request_id = params.get("requestId").and_then(Value::as_str).unwrap_or_default().to_string();
            let tool_name = params.get("toolName").and_then(Value::as_str).unwrap_or("unknown").to_string();
            let input = params.get("input").cloned().unwrap_or(Value::Null);
            emit_event(shared, SessionEvent::permission_request(&shared.id, request_id, tool_name, input));
        }
        "notifications/error" => {
            let message = params.get("message").and_then(Value::as_str).unwrap_or("mcp error");
            let mut ev = SessionEvent::new(EventKind::Error, Severity::Warning, &shared.id, message);
            ev.summary = message.to_string();
            emit_event(shared, ev);
        }
        _ => {}
    }
}

/// A session backed by one MCP child, wired through [`McpBridge`].
pub struct McpProviderSession {
    shared: Arc<Shared>,
    bridge: Arc<McpBridge>,
}

impl McpProviderSession {
    fn new(id: String, opts: SpawnOptions, bridge: McpBridge) -> Self {
        let shared = Arc::new(Shared {
            id,
            cwd: opts.cwd,
            mode: opts.mode,
            buffer: MessageBuffer::new(),
            stopped: AtomicBool::new(false),
            event_handler: ListenerSlot::new(),
            message_handler: ListenerSlot::new(),
        });
        let bridge = Arc::new(bridge);

        {
            let shared = Arc::clone(&shared);
            bridge.set_notification_handler(Arc::new(move |frame| route_notification(&shared, frame)));
        }
        {
            let shared = Arc::clone(&shared);
            bridge.set_exit_handler(Arc::new(move |code, _signal| {
                shared.stopped.store(true, Ordering::SeqCst);
                let kind = if code == Some(0) { EventKind::TaskComplete } else { EventKind::Error };
                let severity = if code == Some(0) { Severity::Info } else { Severity::Warning };
                emit_event(&shared, SessionEvent::new(kind, severity, &shared.id, "child exited"));
            }));
        }

        Self { shared, bridge }
    }

    /// Perform the `initialize` handshake and fire `notifications/initialized`.
    async fn init(self: Arc<Self>) -> Result<()> {
        self.bridge
            .request("initialize", json!({"protocolVersion": "2024-11-05", "clientInfo": {"name": "happyclaw"}}))
            .await?;
        self.bridge.notify("notifications/initialized", json!({}))?;
        Ok(())
    }
}

impl ProviderSession for McpProviderSession {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn pid(&self) -> Option<u32> {
        self.bridge.pid()
    }

    fn mode(&self) -> Mode {
        self.shared.mode
    }

    fn cwd(&self) -> &str {
        &self.shared.cwd
    }

    fn provider(&self) -> &'static str {
        "mcp"
    }

    fn send<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            reject_if_local(self.shared.mode, "send")?;
            if self.shared.stopped.load(Ordering::SeqCst) {
                return Err(Error::SessionStopped(self.shared.id.clone()));
            }
            let result =
                self.bridge.request("tools/call", json!({"name": "send_message", "arguments": {"text": input}})).await?;
            let text = result.get("content").and_then(Value::as_str).unwrap_or(input);
            emit_message(&self.shared, SessionMessage::new(MessageKind::Text, text));
            Ok(())
        })
    }

    fn read(&self, cursor: usize, limit: usize) -> Result<ReadPage> {
        reject_if_local(self.shared.mode, "read")?;
        Ok(self.shared.buffer.read(cursor, limit))
    }

    fn respond_to_permission<'a>(&'a self, request_id: &'a str, outcome: PermissionOutcome) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            reject_if_local(self.shared.mode, "respondToPermission")?;
            let (allow, reason) = match outcome {
                PermissionOutcome::Allow => (true, None),
                PermissionOutcome::Deny { reason } => (false, reason),
            };
            self.bridge
                .request("respond_permission", json!({"requestId": request_id, "allow": allow, "reason": reason}))
                .await?;
            Ok(())
        })
    }

    fn stop(&self, force: bool) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.shared.stopped.store(true, Ordering::SeqCst);
            if let Some(pid) = self.bridge.pid() {
                terminate_child(pid, force).await?;
            }
            Ok(())
        })
    }

    fn on_event(&self, handler: EventHandler) {
        self.shared.event_handler.set(handler);
    }

    fn on_message(&self, handler: MessageHandler) {
        self.shared.message_handler.set(handler);
    }
}

#[cfg(test)]
#[path = "mcp_provider_tests.rs"]
mod tests;
