// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered process configuration: CLI flags over environment variables,
//! validated once at startup and threaded explicitly through the
//! [`crate::manager::SessionManager`] and its collaborators. Nothing here is
//! re-read from the environment at call time.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Local session supervisor for long-running AI command-line agents.
#[derive(Debug, Parser)]
#[command(name = "happyclaw", version, about)]
pub struct Config {
    /// Directory for `sessions.json` and `audit.log`.
    #[arg(long, env = "HAPPYCLAW_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directories a session's `cwd` may live under. Empty allows everything.
    #[arg(long = "allow-cwd", env = "HAPPYCLAW_ALLOWED_CWDS", value_delimiter = ',')]
    pub allowed_cwds: Vec<PathBuf>,

    /// Health-check probe interval, in seconds.
    #[arg(long, env = "HAPPYCLAW_HEALTH_INTERVAL_SECS", default_value = "30")]
    pub health_interval_secs: u64,

    /// How long `switchMode` waits for the outgoing child to drain, in seconds.
    #[arg(long, env = "HAPPYCLAW_DRAIN_TIMEOUT_SECS", default_value = "5")]
    pub drain_timeout_secs: u64,

    /// EventBus debounce window, in milliseconds.
    #[arg(long, env = "HAPPYCLAW_EVENT_DEBOUNCE_MS", default_value = "500")]
    pub event_debounce_ms: u64,

    /// EventBus max batch size before an immediate flush.
    #[arg(long, env = "HAPPYCLAW_EVENT_MAX_BATCH", default_value = "20")]
    pub event_max_batch: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HAPPYCLAW_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, env = "HAPPYCLAW_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// MCP request timeout, in seconds.
    #[arg(long, env = "HAPPYCLAW_MCP_TIMEOUT_SECS", default_value = "30")]
    pub mcp_timeout_secs: u64,

    /// PTY terminal columns.
    #[arg(long, env = "HAPPYCLAW_PTY_COLS", default_value = "200")]
    pub pty_cols: u16,

    /// PTY terminal rows.
    #[arg(long, env = "HAPPYCLAW_PTY_ROWS", default_value = "50")]
    pub pty_rows: u16,

    /// Provider to drive from the bundled CLI front-end (sdk, mcp, pty).
    #[arg(long, env = "HAPPYCLAW_PROVIDER", default_value = "pty")]
    pub provider: String,

    /// `cwd` for the CLI front-end's convenience session.
    #[arg(long, env = "HAPPYCLAW_CWD")]
    pub cwd: Option<PathBuf>,

    /// Resume an existing session id instead of spawning fresh.
    #[arg(long, env = "HAPPYCLAW_RESUME")]
    pub resume: Option<String>,

    /// Command line of the agent CLI to drive (PTY/MCP providers).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Config {
    /// Validate the configuration as a unit. A provider cannot be configured
    /// with both `--resume` and a fresh `--cwd` conflict: a resume reloads
    /// the agent's own history and ignores `cwd`.
    pub fn validate(&self) -> Result<(), String> {
        if !["sdk", "mcp", "pty"].contains(&self.provider.as_str()) {
            return Err(format!("invalid provider: {}", self.provider));
        }
        if self.resume.is_some() && self.cwd.is_some() {
            return Err("--resume cannot be combined with an explicit --cwd".to_string());
        }
        if self.resume.is_none() && self.command.is_empty() {
            return Err("a command is required unless --resume is given".to_string());
        }
        if !["json", "text"].contains(&self.log_format.as_str()) {
            return Err(format!("invalid log format: {}", self.log_format));
        }
        Ok(())
    }

    /// `<home>/.happyclaw` unless overridden by `--data-dir`/`HAPPYCLAW_DATA_DIR`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn event_debounce(&self) -> Duration {
        Duration::from_millis(self.event_debounce_ms)
    }

    pub fn mcp_timeout(&self) -> Duration {
        Duration::from_secs(self.mcp_timeout_secs)
    }
}

/// `$HOME/.happyclaw`, or `.happyclaw` relative to the working directory if
/// `HOME` is unset.
pub fn default_data_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".happyclaw"),
        Err(_) => PathBuf::from(".happyclaw"),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
