// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY-driven provider.
//!
//! Spawns the child CLI under a pseudo-terminal via `forkpty` with generous
//! dimensions to reduce wrap-induced mis-parsing. A single background task
//! owns the master fd for the session's whole lifetime: it mirrors every
//! raw chunk into a headless [`Screen`] (for potential future screen
//! queries) and, independently, ANSI-strips the same chunk and feeds it
//! line-by-line into [`PtyParser`]. Permission prompts recovered this way
//! are heuristic and best-effort only, per the parser's own contract.

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execvp, ForkResult, Pid};
use regex::Regex;
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    reject_if_local, terminate_child, BoxFuture, EventHandler, ListenerSlot, MessageBuffer, MessageHandler, Provider,
    ProviderSession, ReadPage, SpawnOptions,
};
use crate::error::{Error, Result};
use crate::model::{EventKind, Mode, PermissionOutcome, SessionEvent, SessionMessage, Severity};
use crate::pty_io::{read_chunk, set_nonblocking, write_all, PtyFd};
use crate::pty_parser::PtyParser;
use crate::screen::Screen;

/// Builds the PTY provider's argv for one session, mirroring
/// [`crate::provider::mcp::CommandBuilder`].
pub type CommandBuilder = Arc<dyn Fn(&str, &SpawnOptions) -> Vec<String> + Send + Sync>;

/// Terminal dimensions generous enough to reduce wrap-induced mis-parsing.
pub const DEFAULT_COLS: u16 = 200;
pub const DEFAULT_ROWS: u16 = 50;

pub struct PtyProvider {
    command: CommandBuilder,
    cols: u16,
    rows: u16,
}

impl PtyProvider {
    pub fn new(command: CommandBuilder) -> Self {
        Self { command, cols: DEFAULT_COLS, rows: DEFAULT_ROWS }
    }

    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

impl Provider for PtyProvider {
    fn name(&self) -> &'static str {
        "pty"
    }

    fn spawn<'a>(&'a self, id: &'a str, opts: &'a SpawnOptions) -> BoxFuture<'a, Result<Arc<dyn ProviderSession>>> {
        Box::pin(async move {
            let argv = (self.command)(id, opts);
            let session = PtyProviderSession::spawn(id.to_string(), opts.clone(), &argv, self.cols, self.rows)?;
            Ok(Arc::new(session) as Arc<dyn ProviderSession>)
        })
    }
}

struct Shared {
    id: String,
    cwd: String,
    mode: Mode,
    pid: Option<u32>,
    buffer: MessageBuffer,
    stopped: AtomicBool,
    event_handler: ListenerSlot<dyn Fn(SessionEvent) + Send + Sync>,
    message_handler: ListenerSlot<dyn Fn(SessionMessage) + Send + Sync>,
    /// The single outstanding permission prompt's request id, if any. Only
    /// one is tracked at a time: a second prompt arriving before the first
    /// resolves is dropped, mirroring the "answer first, discard later"
    /// behavior this layer already accepts for the SDK provider.
    pending_permission: StdMutex<Option<String>>,
    #[allow(dead_code)]
    screen: StdMutex<Screen>,
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

fn handle_detected_event(shared: &Shared, event: SessionEvent) {
    if event.kind == EventKind::PermissionRequest {
        let mut pending = shared.pending_permission.lock().unwrap_or_else(|e| e.into_inner());
        if pending.is_some() {
            return;
        }
        if let Some(detail) = &event.permission {
            *pending = Some(detail.request_id.clone());
        }
    }
    emit_event(shared, event);
}

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\x1b(\[[0-9;?]*[a-zA-Z]|\][^\x07\x1b]*(\x07|\x1b\\)|[()][A-Za-z0-9]|[=>M78])")
            .unwrap_or_else(|_| Regex::new("").expect("empty regex is always valid"))
    })
}

/// Strip ANSI/CSI/OSC escape sequences, leaving the plain text stream the
/// parser rules classify.
fn strip_ansi(s: &str) -> String {
    ansi_regex().replace_all(s, "").into_owned()
}

/// Split `chunk` (ANSI-stripped and appended to `line_buf`) into complete
/// lines, feeding each to `parser` and routing the resulting messages/events.
fn feed_lines(shared: &Shared, parser: &mut PtyParser, line_buf: &mut String, chunk: &[u8]) {
    line_buf.push_str(&strip_ansi(&String::from_utf8_lossy(chunk)));

    while let Some(pos) = line_buf.find('\n') {
        let line: String = line_buf.drain(..=pos).collect();
        let line = line.trim_end_matches(['\n', '\r']);
        if let Some(message) = parser.parse(line) {
            emit_message(shared, message);
        }
        if let Some(event) = parser.detect_event(line, &shared.id) {
            handle_detected_event(shared, event);
        }
    }
}

fn wait_for_exit(pid: Pid) -> std::result::Result<(Option<i32>, Option<i32>), nix::errno::Errno> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok((Some(code), None)),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok((None, Some(sig as i32))),
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// A session backed by one child spawned on a pseudo-terminal.
pub struct PtyProviderSession {
    shared: Arc<Shared>,
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: CancellationToken,
}

impl PtyProviderSession {
    // forkpty's child branch runs partially-initialized until execvp; this
    // function never returns through the child's copy of this stack frame.
    #[allow(unsafe_code)]
    fn spawn(id: String, opts: SpawnOptions, argv: &[String], cols: u16, rows: u16) -> Result<Self> {
        if argv.is_empty() {
            return Err(Error::SpawnFailed("empty command".into()));
        }

        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: the child branch below only calls async-signal-safe calls
        // (env/cwd setup, execvp) before replacing itself via exec.
        let result = unsafe { forkpty(&winsize, None) }.map_err(|e| Error::SpawnFailed(format!("forkpty: {e}")))?;
        let ForkptyResult { master, fork_result } = result;

        match fork_result {
            ForkResult::Child => {
                std::env::set_var("TERM", "xterm-256color");
                if std::env::set_current_dir(&opts.cwd).is_err() {
                    std::process::exit(127);
                }
                let c_args: std::result::Result<Vec<CString>, _> =
                    argv.iter().map(|s| CString::new(s.as_bytes())).collect();
                let Ok(c_args) = c_args else {
                    std::process::exit(127);
                };
                let _ = execvp(&c_args[0], &c_args);
                std::process::exit(127);
            }
            ForkResult::Parent { child } => {
                set_nonblocking(&master).map_err(|e| Error::SpawnFailed(e.to_string()))?;
                let afd = AsyncFd::new(PtyFd(master)).map_err(|e| Error::SpawnFailed(e.to_string()))?;
                let pid = child.as_raw() as u32;

                let shared = Arc::new(Shared {
                    id: id.clone(),
                    cwd: opts.cwd.clone(),
                    mode: opts.mode,
                    pid: Some(pid),
                    buffer: MessageBuffer::new(),
                    stopped: AtomicBool::new(false),
                    event_handler: ListenerSlot::new(),
                    message_handler: ListenerSlot::new(),
                    pending_permission: StdMutex::new(None),
                    screen: StdMutex::new(Screen::new(cols, rows)),
                });

                let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
                let shutdown = CancellationToken::new();

                {
                    let shared = Arc::clone(&shared);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let mut parser = PtyParser::new();
                        let mut line_buf = String::new();

                        loop {
                            tokio::select! {
                                _ = shutdown.cancelled() => break,
                                received = input_rx.recv() => {
                                    match received {
                                        Some(bytes) => {
                                            if write_all(&afd, &bytes).await.is_err() {
                                                break;
                                            }
                                        }
                                        None => break,
                                    }
                                }
                                result = read_chunk(&afd, &mut buf) => {
                                    match result {
                                        Ok(0) => break,
                                        Ok(n) => {
                                            let chunk = &buf[..n];
                                            shared.screen.lock().unwrap_or_else(|e| e.into_inner()).feed(chunk);
                                            feed_lines(&shared, &mut parser, &mut line_buf, chunk);
                                        }
                                        Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
                                        Err(_) => break,
                                    }
                                }
                            }
                        }

                        shared.stopped.store(true, Ordering::SeqCst);
                        let status = tokio::task::spawn_blocking(move || wait_for_exit(child)).await;
                        let (kind, severity) = match status {
                            Ok(Ok((Some(0), _))) => (EventKind::TaskComplete, Severity::Info),
                            _ => (EventKind::Error, Severity::Warning),
                        };
                        emit_event(&shared, SessionEvent::new(kind, severity, &shared.id, "pty child exited"));
                    });
                }

                Ok(Self { shared, input_tx, shutdown })
            }
        }
    }
}

impl ProviderSession for PtyProviderSession {
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
        "pty"
    }

    fn send<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            reject_if_local(self.shared.mode, "send")?;
            if self.shared.stopped.load(Ordering::SeqCst) {
                return Err(Error::SessionStopped(self.shared.id.clone()));
            }
            let filtered = PtyParser::filter_input(input).ok_or_else(|| Error::InputBlocked(input.to_string()))?;
            let mut bytes = filtered.as_bytes().to_vec();
            bytes.push(b'\r');
            self.input_tx.send(bytes).map_err(|_| Error::SessionStopped(self.shared.id.clone()))
        })
    }

    fn read(&self, cursor: usize, limit: usize) -> Result<ReadPage> {
        reject_if_local(self.shared.mode, "read")?;
        Ok(self.shared.buffer.read(cursor, limit))
    }

    fn respond_to_permission<'a>(&'a self, request_id: &'a str, outcome: PermissionOutcome) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            reject_if_local(self.shared.mode, "respondToPermission")?;
            let mut pending = self.shared.pending_permission.lock().unwrap_or_else(|e| e.into_inner());
            match pending.take() {
                Some(current) if current == request_id => {
                    drop(pending);
                    let bytes = match outcome {
                        PermissionOutcome::Allow => b"y\r".to_vec(),
                        PermissionOutcome::Deny { .. } => b"n\r".to_vec(),
                    };
                    self.input_tx.send(bytes).map_err(|_| Error::SessionStopped(self.shared.id.clone()))
                }
                Some(other) => {
                    *pending = Some(other);
                    Err(Error::AlreadyResolved(request_id.to_string()))
                }
                None => Err(Error::AlreadyResolved(request_id.to_string())),
            }
        })
    }

    fn stop(&self, force: bool) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.shared.stopped.store(true, Ordering::SeqCst);
            self.shutdown.cancel();
            if let Some(pid) = self.shared.pid {
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
#[path = "pty_tests.rs"]
mod tests;
