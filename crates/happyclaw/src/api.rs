// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed request/response structs for each `session.*` tool operation,
//! dispatched by the host's plugin table. This is the seam a future host
//! crate links against: it deserializes a generic JSON payload into one of
//! these parameter structs, calls the matching [`SessionManager`] method,
//! and serializes the typed result back out — this layer never sees the
//! wire format the bridge ultimately uses.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::manager::SessionManager;
use crate::model::{Mode, PermissionOutcome, SessionMessage, SessionRecord};

/// Identity of the caller a host plugin layer injects into every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnParams {
    pub provider: String,
    pub cwd: String,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeParams {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendParams {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub input: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadParams {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Serialized as a string on the wire, per the cursor contract.
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResult {
    pub messages: Vec<SessionMessage>,
    #[serde(rename = "nextCursor")]
    pub next_cursor: String,
}

/// Default page size for `session.read` when the caller omits `limit`.
pub const DEFAULT_READ_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondParams {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub approved: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchParams {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopParams {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub force: bool,
}

/// The eight `session.*` operations, each backed by a typed parameter
/// struct and delegating straight to the [`SessionManager`].
pub struct ToolSurface {
    manager: SessionManager,
}

impl ToolSurface {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }

    pub fn list(&self, ctx: &CallerContext, params: ListParams) -> Vec<SessionRecord> {
        self.manager.list(&ctx.user_id, params.cwd.as_deref(), params.provider.as_deref())
    }

    pub async fn spawn(&self, ctx: &CallerContext, params: SpawnParams) -> Result<SessionRecord> {
        self.manager.spawn(&params.provider, &params.cwd, params.mode, &ctx.user_id).await
    }

    pub async fn resume(&self, ctx: &CallerContext, params: ResumeParams) -> Result<SessionRecord> {
        self.manager.resume(&params.session_id, params.mode, &ctx.user_id).await
    }

    pub async fn send(&self, ctx: &CallerContext, params: SendParams) -> Result<()> {
        self.manager.send(&ctx.user_id, &params.session_id, &params.input).await
    }

    pub fn read(&self, ctx: &CallerContext, params: ReadParams) -> Result<ReadResult> {
        let cursor = params.cursor.as_deref().and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let limit = params.limit.unwrap_or(DEFAULT_READ_LIMIT);
        let page = self.manager.read_messages(&ctx.user_id, &params.session_id, cursor, limit)?;
        Ok(ReadResult { messages: page.messages, next_cursor: page.next_cursor.to_string() })
    }

    pub async fn respond(&self, ctx: &CallerContext, params: RespondParams) -> Result<()> {
        let outcome =
            if params.approved { PermissionOutcome::Allow } else { PermissionOutcome::Deny { reason: params.message } };
        self.manager.respond_to_permission(&ctx.user_id, &params.session_id, &params.request_id, outcome).await
    }

    pub async fn switch(&self, ctx: &CallerContext, params: SwitchParams) -> Result<SessionRecord> {
        self.manager.switch_mode(&ctx.user_id, &params.session_id, params.mode).await
    }

    pub async fn stop(&self, ctx: &CallerContext, params: StopParams) -> Result<()> {
        self.manager.stop(&ctx.user_id, &params.session_id, params.force).await
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
