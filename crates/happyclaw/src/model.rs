// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data model: [`SessionRecord`], [`PersistedSession`], [`SessionMessage`],
//! [`SessionEvent`], [`PermissionRequest`], and [`AuditEntry`].

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Which kind of stdio contract a session's child process was spawned under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The child's stdio is attached directly to the human's controlling terminal.
    Local,
    /// The child's stdio is captured and mediated by this layer.
    Remote,
}

/// The finite-state tag a session presents during a mode transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchState {
    Running,
    Draining,
    Switching,
    Error,
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// The in-memory entity owned by the [`crate::manager::SessionManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub provider: String,
    pub cwd: String,
    pub mode: Mode,
    pub owner_id: String,
    pub pid: Option<u32>,
    pub switch_state: SwitchState,
    pub created_at: u64,
    pub last_activity: u64,
}

impl SessionRecord {
    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            id: self.id.clone(),
            provider: self.provider.clone(),
            cwd: self.cwd.clone(),
            pid: self.pid,
            owner_id: self.owner_id.clone(),
            mode: self.mode,
            created_at: self.created_at,
        }
    }
}

/// Durable projection of a [`SessionRecord`]. No other state survives a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub id: String,
    pub provider: String,
    pub cwd: String,
    pub pid: Option<u32>,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    pub mode: Mode,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

/// The kind of a [`SessionMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    ToolUse,
    ToolResult,
    Code,
    Thinking,
    Error,
    Result,
    User,
}

/// A typed unit in a session's read buffer, ordered by insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl SessionMessage {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self { kind, content: content.into(), timestamp: now_ms(), metadata: HashMap::new() }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// The kind of a [`SessionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Ready,
    WaitingForInput,
    TaskComplete,
    Error,
    PermissionRequest,
}

impl EventKind {
    /// EventBus delivery priority; lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            Self::PermissionRequest => 0,
            Self::Error => 1,
            Self::WaitingForInput => 2,
            Self::TaskComplete => 3,
            Self::Ready => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Urgent,
}

/// Detail carried by a `permission_request` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionDetail {
    pub request_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
}

/// A state-transition notification published to the [`crate::event_bus::EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub severity: Severity,
    pub session_id: String,
    pub timestamp: u64,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<PermissionDetail>,
}

impl SessionEvent {
    pub fn new(kind: EventKind, severity: Severity, session_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            session_id: session_id.into(),
            timestamp: now_ms(),
            summary: summary.into(),
            permission: None,
        }
    }

    pub fn permission_request(
        session_id: impl Into<String>,
        request_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        let mut ev = Self::new(EventKind::PermissionRequest, Severity::Urgent, session_id, "permission requested");
        ev.permission = Some(PermissionDetail {
            request_id: request_id.into(),
            tool_name: tool_name.into(),
            input,
        });
        ev
    }
}

/// A pending authorization prompt from a child, identified by `(session_id, request_id)`.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub session_id: String,
    pub request_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
}

/// The outcome a caller passes to `respondToPermission`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOutcome {
    Allow,
    Deny { reason: Option<String> },
}

/// An append-only audit record. Never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: u64,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub action: String,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(user_id: impl Into<String>, action: impl Into<String>, session_id: Option<String>) -> Self {
        Self { timestamp: now_ms(), user_id: user_id.into(), action: action.into(), session_id, details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
