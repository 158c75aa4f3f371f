// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SDK-driven provider.
//!
//! Wraps a third-party streaming agent (the concrete SDK is an injection
//! point behind [`AgentHandle`]) that yields typed messages and raises
//! permission prompts as an in-process callback. A single background task
//! owns the handle exclusively, so reading the next stream event and
//! dispatching a queued send never contend for the same lock — they are
//! two arms of one `select!`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use super::{
    reject_if_local, BoxFuture, EventHandler, ListenerSlot, MessageBuffer, MessageHandler, Provider, ProviderSession,
    ReadPage, SpawnOptions,
};
use crate::error::{Error, Result};
use crate::model::{EventKind, MessageKind, Mode, PermissionOutcome, SessionEvent, SessionMessage, Severity};

/// One content unit inside an `assistant` message, exploded 1:1 into a
/// [`SessionMessage`] each.
#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text(String),
    ToolUse { id: String, name: String, input: Value },
    Thinking(String),
}

/// One message yielded by an [`AgentHandle`]'s stream, mirroring the
/// upstream SDK's own discriminated union.
#[derive(Debug, Clone)]
pub enum SdkMessage {
    SystemInit,
    Assistant { content: Vec<ContentBlock> },
    User { text: String },
    ToolProgress { tool: String, detail: String },
    Result { summary: String },
}

/// One event an [`AgentHandle`] can yield: a message, or a permission
/// prompt parked until `respond` is called.
pub enum SdkEvent {
    Message(SdkMessage),
    PermissionRequest { tool_name: String, input: Value, respond: oneshot::Sender<PermissionOutcome> },
}

/// The injected contract for a streaming agent SDK. A concrete
/// implementation wraps whatever upstream client library is actually
/// linked; this layer only needs the async-iterator-plus-send shape.
pub trait AgentHandle: Send {
    fn next(&mut self) -> BoxFuture<'_, Option<SdkEvent>>;
    fn send<'a>(&'a mut self, input: &'a str) -> BoxFuture<'a, Result<()>>;
    fn stop(&mut self) -> BoxFuture<'_, Result<()>>;
    fn pid(&self) -> Option<u32>;
}

/// Constructs an [`AgentHandle`] for a fresh spawn or a resume.
pub type HandleFactory = Arc<dyn Fn(SpawnOptions) -> BoxFuture<'static, Result<Box<dyn AgentHandle>>> + Send + Sync>;

pub struct SdkProvider {
    factory: HandleFactory,
}

impl SdkProvider {
    pub fn new(factory: HandleFactory) -> Self {
        Self { factory }
    }
}

impl Provider for SdkProvider {
    fn name(&self) -> &'static str {
        "sdk"
    }

    fn spawn<'a>(&'a self, id: &'a str, opts: &'a SpawnOptions) -> BoxFuture<'a, Result<Arc<dyn ProviderSession>>> {
        Box::pin(async move {
            let handle = (self.factory)(opts.clone()).await?;
            Ok(Arc::new(SdkProviderSession::new(id.to_string(), opts.clone(), handle)) as Arc<dyn ProviderSession>)
        })
    }
}

struct Shared {
    id: String,
    cwd: String,
    mode: Mode,
    pid: Option<u32>,
    buffer: MessageBuffer,
    pending_permissions: StdMutex<HashMap<String, oneshot::Sender<PermissionOutcome>>>,
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

fn explode(shared: &Shared, msg: SdkMessage) -> bool {
    match msg {
        SdkMessage::SystemInit => {
            emit_event(shared, SessionEvent::new(EventKind::Ready, Severity::Info, &shared.id, "agent initialized"));
            false
        }
        SdkMessage::Assistant { content } => {
            for block in content {
                let message = match block {
                    ContentBlock::Text(text) => SessionMessage::new(MessageKind::Text, text),
                    ContentBlock::ToolUse { id, name, input } => {
                        SessionMessage::new(MessageKind::ToolUse, input.to_string())
                            .with_meta("tool", name)
                            .with_meta("toolUseId", id)
                    }
                    ContentBlock::Thinking(text) => SessionMessage::new(MessageKind::Thinking, text),
                };
                emit_message(shared, message);
            }
            false
        }
        SdkMessage::User { text } => {
            emit_message(shared, SessionMessage::new(MessageKind::User, text));
            false
        }
        SdkMessage::ToolProgress { tool, detail } => {
            emit_message(shared, SessionMessage::new(MessageKind::ToolResult, detail).with_meta("tool", tool));
            false
        }
        SdkMessage::Result { summary } => {
            emit_message(shared, SessionMessage::new(MessageKind::Result, summary.clone()));
            emit_event(shared, SessionEvent::new(EventKind::TaskComplete, Severity::Info, &shared.id, summary));
            true
        }
    }
}

/// A session backed by one [`AgentHandle`], driven by a single background
/// task that owns it for the session's whole lifetime.
pub struct SdkProviderSession {
    shared: Arc<Shared>,
    send_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl SdkProviderSession {
    fn new(id: String, opts: SpawnOptions, mut handle: Box<dyn AgentHandle>) -> Self {
        let pid = handle.pid();
        let shared = Arc::new(Shared {
            id,
            cwd: opts.cwd,
            mode: opts.mode,
            pid,
            buffer: MessageBuffer::new(),
            pending_permissions: StdMutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            event_handler: ListenerSlot::new(),
            message_handler: ListenerSlot::new(),
        });

        let (send_tx, mut send_rx) = mpsc::unbounded_channel::<String>();
        let shutdown = CancellationToken::new();

        {
            let shared = Arc::clone(&shared);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut in_flight = false;
                let mut pending: VecDeque<String> = VecDeque::new();

                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            let _ = handle.stop().await;
                            break;
                        }
                        event = handle.next() => {
                            match event {
                                None => {
                                    shared.stopped.store(true, Ordering::SeqCst);
                                    break;
                                }
                                Some(SdkEvent::Message(msg)) => {
                                    if explode(&shared, msg) {
                                        in_flight = false;
                                        if let Some(next_input) = pending.pop_front() {
                                            in_flight = true;
                                            if let Err(e) = handle.send(&next_input).await {
                                                warn!(session_id = %shared.id, error = %e, "sdk: queued send failed");
                                                in_flight = false;
                                            }
                                        }
                                    }
                                }
                                Some(SdkEvent::PermissionRequest { tool_name, input, respond }) => {
                                    let request_id = Uuid::new_v4().to_string();
                                    shared
                                        .pending_permissions
                                        .lock()
                                        .unwrap_or_else(|e| e.into_inner())
                                        .insert(request_id.clone(), respond);
                                    emit_event(
                                        &shared,
                                        SessionEvent::permission_request(&shared.id, request_id, tool_name, input),
                                    );
                                }
                            }
                        }
                        received = send_rx.recv() => {
                            match received {
                                Some(text) if in_flight => pending.push_back(text),
                                Some(text) => {
                                    in_flight = true;
                                    if let Err(e) = handle.send(&text).await {
                                        warn!(session_id = %shared.id, error = %e, "sdk: send failed");
                                        in_flight = false;
                                    }
                                }
                                None => {
                                    // Sender dropped without a prior `stop`; treat as abandonment.
                                    let _ = handle.stop().await;
                                    shared.stopped.store(true, Ordering::SeqCst);
                                    break;
                                }
                            }
                        }
                    }
                }
            });
        }

        Self { shared, send_tx, shutdown }
    }
}

impl ProviderSession for SdkProviderSession {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn pid(&self) -> Option<u32> {
        self.shared.pid
    }

    fn mode(&self) -> Mode {
        self.shared.mode
    }

    fn cwd(&self) -> &str {
        &self.shared.cwd
    }

    fn provider(&self) -> &'static str {
        "sdk"
    }

    fn send<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            reject_if_local(self.shared.mode, "send")?;
            if self.shared.stopped.load(Ordering::SeqCst) {
                return Err(Error::SessionStopped(self.shared.id.clone()));
            }
            self.send_tx.send(input.to_string()).map_err(|_| Error::SessionStopped(self.shared.id.clone()))
        })
    }

    fn read(&self, cursor: usize, limit: usize) -> Result<ReadPage> {
        reject_if_local(self.shared.mode, "read")?;
        Ok(self.shared.buffer.read(cursor, limit))
    }

    fn respond_to_permission<'a>(&'a self, request_id: &'a str, outcome: PermissionOutcome) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            reject_if_local(self.shared.mode, "respondToPermission")?;
            let responder =
                self.shared.pending_permissions.lock().unwrap_or_else(|e| e.into_inner()).remove(request_id);
            match responder {
                Some(tx) => {
                    let _ = tx.send(outcome);
                    Ok(())
                }
                None => Err(Error::AlreadyResolved(request_id.to_string())),
            }
        })
    }

    fn stop(&self, _force: bool) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.shutdown.cancel();
            self.shared.stopped.store(true, Ordering::SeqCst);
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
#[path = "sdk_tests.rs"]
mod tests;
