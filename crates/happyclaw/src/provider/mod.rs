// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The uniform session contract every concrete child-process wrapper
//! implements, plus the small pieces shared across all three: a message
//! buffer and a TERM-then-KILL stop sequence.

pub mod mcp;
pub mod pty;
pub mod sdk;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::warn;

use crate::error::{Error, Result};
use crate::health::is_process_alive;
use crate::model::{Mode, PermissionOutcome, SessionEvent, SessionMessage};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type MessageHandler = Arc<dyn Fn(SessionMessage) + Send + Sync>;
pub type EventHandler = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// How long `stop` waits after TERM before escalating to KILL.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Options passed to a [`Provider`]'s `spawn`/`resume`.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub cwd: String,
    pub mode: Mode,
    pub owner_id: String,
    /// Set by `resume`: the session id the child should reload its own
    /// history for. `None` for a fresh `spawn`.
    pub resume_session_id: Option<String>,
}

/// A page returned by `ProviderSession::read`.
#[derive(Debug, Clone)]
pub struct ReadPage {
    pub messages: Vec<SessionMessage>,
    pub next_cursor: usize,
}

/// A factory for sessions of one kind (SDK, MCP, PTY).
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn spawn<'a>(&'a self, id: &'a str, opts: &'a SpawnOptions) -> BoxFuture<'a, Result<Arc<dyn ProviderSession>>>;
}

/// The capability set shared by every concrete session kind. Local-mode
/// sessions (stdio attached to the human terminal) implement `send`, `read`,
/// and `respond_to_permission` as an immediate **NotSupported** error.
pub trait ProviderSession: Send + Sync {
    fn id(&self) -> &str;
    fn pid(&self) -> Option<u32>;
    fn mode(&self) -> Mode;
    fn cwd(&self) -> &str;
    fn provider(&self) -> &'static str;

    fn send<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<()>>;
    fn read(&self, cursor: usize, limit: usize) -> Result<ReadPage>;
    fn respond_to_permission<'a>(&'a self, request_id: &'a str, outcome: PermissionOutcome) -> BoxFuture<'a, Result<()>>;
    fn stop(&self, force: bool) -> BoxFuture<'_, Result<()>>;
    fn on_event(&self, handler: EventHandler);
    fn on_message(&self, handler: MessageHandler);
}

/// Insertion-ordered message log shared by every provider's `read`
/// implementation. Never removes entries; `read` only slices forward.
#[derive(Default)]
pub struct MessageBuffer {
    messages: StdMutex<Vec<SessionMessage>>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: SessionMessage) {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).push(message);
    }

    pub fn read(&self, cursor: usize, limit: usize) -> ReadPage {
        let messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        let start = cursor.min(messages.len());
        let end = (start + limit).min(messages.len());
        ReadPage { messages: messages[start..end].to_vec(), next_cursor: end }
    }
}

/// Fan-out registry for a session's `on_event`/`on_message` listeners. A
/// session keeps at most one listener of each kind at a time — re-registering
/// replaces the previous one, mirroring the manager's single-EventBus wiring.
#[derive(Default)]
pub struct ListenerSlot<T> {
    handler: StdMutex<Option<Arc<T>>>,
}

impl<T: ?Sized> ListenerSlot<T> {
    pub fn new() -> Self {
        Self { handler: StdMutex::new(None) }
    }

    pub fn set(&self, handler: Arc<T>) {
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.handler.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// `true` iff `mode` is local (stdio attached to the human terminal), in
/// which case `send`/`read`/`respond_to_permission` are illegal.
pub fn reject_if_local(mode: Mode, op: &str) -> Result<()> {
    match mode {
        Mode::Local => Err(Error::NotSupported(format!("{op} is not supported on a local-mode session"))),
        Mode::Remote => Ok(()),
    }
}

/// Send TERM, poll for exit up to [`STOP_GRACE`], then escalate to KILL.
/// Never fails on a process that is already gone.
pub async fn terminate_child(pid: u32, force: bool) -> Result<()> {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return Ok(());
    };
    let nix_pid = Pid::from_raw(pid_i32);

    if force {
        let _ = signal::kill(nix_pid, Signal::SIGKILL);
        return Ok(());
    }

    if signal::kill(nix_pid, Signal::SIGTERM).is_err() {
        return Ok(());
    }

    let deadline = tokio::time::Instant::now() + STOP_GRACE;
    let mut poll = tokio::time::interval(Duration::from_millis(100));
    loop {
        if !is_process_alive(pid) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        poll.tick().await;
    }

    warn!(pid, "child did not exit within grace window, sending KILL");
    let _ = signal::kill(nix_pid, Signal::SIGKILL);
    Ok(())
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
