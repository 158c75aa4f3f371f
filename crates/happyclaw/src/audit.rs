// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSON-lines log of tool invocations.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::model::AuditEntry;

/// Writes newline-delimited JSON entries to `<data_dir>/audit.log`.
///
/// Every [`AuditLogger::log`] call opens the file in append mode, writes one
/// line, and flushes before returning — the caller is guaranteed the entry
/// reached the filesystem.
pub struct AuditLogger {
    path: PathBuf,
    // Serializes concurrent appends so lines never interleave.
    write_lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { path: data_dir.into().join("audit.log"), write_lock: Mutex::new(()) }
    }

    /// Append `entry`. Never returns an error: a logging fault must not break
    /// the call it is observing, so failures are swallowed after a warning.
    pub fn log(&self, entry: &AuditEntry) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(parent) = self.path.parent() else { return };
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(error = %e, path = %self.path.display(), "failed to create audit log directory");
            return;
        }

        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize audit entry");
                return;
            }
        };

        let result = OpenOptions::new().create(true).append(true).open(&self.path).and_then(|mut file| {
            writeln!(file, "{line}")?;
            file.flush()?;
            file.sync_data()
        });

        if let Err(e) = result {
            warn!(error = %e, path = %self.path.display(), "failed to append audit entry");
        }
    }

    /// Read entries, newest-first. Malformed lines are silently skipped for
    /// forward-compatibility with future schemas.
    pub fn read(&self, since: Option<u64>, limit: Option<usize>) -> Vec<AuditEntry> {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };

        let mut entries: Vec<AuditEntry> = contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<AuditEntry>(line).ok())
            .filter(|e| since.is_none_or(|since| e.timestamp >= since))
            .collect();

        entries.reverse();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
