// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unified error surface for every `session.*` operation.
///
/// Each variant carries its own stable discriminant (via [`Error::code`]) so
/// JSON serialization at the tool surface is deterministic regardless of how
/// the error was constructed internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Error {
    /// `cwd` is not within the configured whitelist.
    PathDenied(String),
    /// No session exists with the given id.
    UnknownSession(String),
    /// The caller does not own the given session.
    NotOwner(String),
    /// The session's child process is no longer running.
    SessionStopped(String),
    /// The session is mid-switch (draining/switching) and cannot serve the request.
    SessionBusy(String),
    /// The operation is not legal in the session's current mode.
    NotSupported(String),
    /// The PTY input-safety filter rejected the input.
    InputBlocked(String),
    /// An MCP peer returned a JSON-RPC error response.
    RpcError(String),
    /// An MCP request did not receive a response within its deadline.
    Timeout(String),
    /// The child exited (or its stdio closed) before a pending MCP request resolved.
    TransportClosed(String),
    /// The persistence file exists but could not be parsed.
    CorruptStore(String),
    /// The child process could not be started.
    SpawnFailed(String),
    /// A permission request was already resolved.
    AlreadyResolved(String),
}

impl Error {
    /// The stable, wire-visible discriminant for this error ("its name").
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathDenied(_) => "PATH_DENIED",
            Self::UnknownSession(_) => "UNKNOWN_SESSION",
            Self::NotOwner(_) => "NOT_OWNER",
            Self::SessionStopped(_) => "SESSION_STOPPED",
            Self::SessionBusy(_) => "SESSION_BUSY",
            Self::NotSupported(_) => "NOT_SUPPORTED",
            Self::InputBlocked(_) => "INPUT_BLOCKED",
            Self::RpcError(_) => "RPC_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::TransportClosed(_) => "TRANSPORT_CLOSED",
            Self::CorruptStore(_) => "CORRUPT_STORE",
            Self::SpawnFailed(_) => "SPAWN_FAILED",
            Self::AlreadyResolved(_) => "ALREADY_RESOLVED",
        }
    }

    /// Whether a caller can reasonably retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RpcError(_) | Self::Timeout(_) | Self::TransportClosed(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::PathDenied(m)
            | Self::UnknownSession(m)
            | Self::NotOwner(m)
            | Self::SessionStopped(m)
            | Self::SessionBusy(m)
            | Self::NotSupported(m)
            | Self::InputBlocked(m)
            | Self::RpcError(m)
            | Self::Timeout(m)
            | Self::TransportClosed(m)
            | Self::CorruptStore(m)
            | Self::SpawnFailed(m)
            | Self::AlreadyResolved(m) => m,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
