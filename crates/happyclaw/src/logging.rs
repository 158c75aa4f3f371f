// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured, leveled tracing initialization with a selectable text/JSON
//! formatter, matching how this layer is operated both interactively and
//! under a supervisor.

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Initialize the global tracing subscriber from `config`. Uses `try_init`
/// so it is safe to call more than once (e.g. from tests).
///
/// Priority: `--log-level`/`HAPPYCLAW_LOG_LEVEL` wins over `RUST_LOG` unless
/// the caller left the level at its default, in which case `RUST_LOG` (if
/// set) takes over — this lets an operator reach for the familiar env var
/// without having to also pass a flag.
pub fn init(config: &Config) {
    let filter = if std::env::var("HAPPYCLAW_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => tracing_subscriber::fmt().with_env_filter(filter).json().try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}
