// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed JSON-RPC-2.0 client over a child's stdin/stdout.
//!
//! Framing is one JSON object per line. Requests carry a monotonically
//! increasing integer id; a pending-response map keyed by that id correlates
//! responses back to the awaiting caller. Frames without an id are dispatched
//! to the session's notification handler.

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::{Error, Result};

/// Handler for a JSON-RPC frame with no `id` (a notification).
pub type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;
/// Handler invoked once when the child exits, with `(code, signal)`.
pub type ExitHandler = Arc<dyn Fn(Option<i32>, Option<i32>) + Send + Sync>;

type PendingMap = Arc<StdMutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>>>;

/// Default deadline for a `request` awaiting its matching response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A JSON-RPC-over-stdio client bound to one child process.
pub struct McpBridge {
    pid: Option<u32>,
    stdin_tx: mpsc::UnboundedSender<String>,
    next_id: AtomicU64,
    pending: PendingMap,
    timeout: Duration,
    notification_handler: Arc<StdRwLock<Option<NotificationHandler>>>,
    exit_handler: Arc<StdRwLock<Option<ExitHandler>>>,
}

impl McpBridge {
    /// Take ownership of `child`'s stdio and start the reader/writer/waiter
    /// tasks. `child` must have been spawned with piped stdin and stdout.
    pub fn new(mut child: Child, timeout: Duration) -> Result<Self> {
        let stdin = child.stdin.take().ok_or_else(|| Error::SpawnFailed("child has no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| Error::SpawnFailed("child has no stdout".into()))?;
        let pid = child.id();

        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let notification_handler: Arc<StdRwLock<Option<NotificationHandler>>> = Arc::new(StdRwLock::new(None));
        let exit_handler: Arc<StdRwLock<Option<ExitHandler>>> = Arc::new(StdRwLock::new(None));

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        {
            let pending = Arc::clone(&pending);
            let notification_handler = Arc::clone(&notification_handler);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) if !line.trim().is_empty() => {
                            match serde_json::from_str::<Value>(&line) {
                                Ok(value) => dispatch_frame(value, &pending, &notification_handler),
                                Err(e) => warn!(error = %e, "mcp: malformed frame dropped"),
                            }
                        }
                        Ok(Some(_)) => {}
                        Ok(None) | Err(_) => break,
                    }
                }
            });
        }

        {
            let pending = Arc::clone(&pending);
            let exit_handler = Arc::clone(&exit_handler);
            tokio::spawn(async move {
                let status = child.wait().await;
                fail_all_pending(&pending);
                let (code, signal) = match status {
                    Ok(s) => (s.code(), s.signal()),
                    Err(_) => (None, None),
                };
                if let Some(handler) = exit_handler.read().unwrap_or_else(|e| e.into_inner()).clone() {
                    handler(code, signal);
                }
            });
        }

        Ok(Self {
            pid,
            stdin_tx,
            next_id: AtomicU64::new(1),
            pending,
            timeout,
            notification_handler,
            exit_handler,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn set_notification_handler(&self, handler: NotificationHandler) {
        *self.notification_handler.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub fn set_exit_handler(&self, handler: ExitHandler) {
        *self.exit_handler.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Allocate an id, write the frame, and await the matching response
    /// (or **RpcError**/**Timeout**/**TransportClosed**).
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).insert(id, tx);

        let frame = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if self.stdin_tx.send(frame.to_string()).is_err() {
            self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
            return Err(Error::TransportClosed(method.to_string()));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(Error::RpcError(message)),
            Ok(Err(_canceled)) => Err(Error::TransportClosed(method.to_string())),
            Err(_elapsed) => {
                self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                Err(Error::Timeout(method.to_string()))
            }
        }
    }

    /// Fire-and-forget frame without an id.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        let frame = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.stdin_tx.send(frame.to_string()).map_err(|_| Error::TransportClosed(method.to_string()))
    }
}

fn dispatch_frame(
    value: Value,
    pending: &PendingMap,
    notification_handler: &Arc<StdRwLock<Option<NotificationHandler>>>,
) {
    match value.get("id").and_then(Value::as_u64) {
        Some(id) => {
            let Some(tx) = pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id) else {
                warn!(id, "mcp: response id has no pending request, dropping");
                return;
            };
            if let Some(error) = value.get("error") {
                let message = error.get("message").and_then(Value::as_str).unwrap_or("rpc error").to_string();
                let _ = tx.send(Err(message));
            } else {
                let result = value.get("result").cloned().unwrap_or(Value::Null);
                let _ = tx.send(Ok(result));
            }
        }
        None => {
            if let Some(handler) = notification_handler.read().unwrap_or_else(|e| e.into_inner()).clone() {
                handler(value);
            }
        }
    }
}

/// Drop every pending sender without a response, so each awaiting `request`
/// sees its `oneshot::Receiver` resolve to `RecvError` and maps that to
/// **TransportClosed** rather than a synthesized **RpcError**.
fn fail_all_pending(pending: &PendingMap) {
    pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
}

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod tests;
