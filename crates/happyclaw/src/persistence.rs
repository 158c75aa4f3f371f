// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic snapshot of the session directory to a single JSON file.
//!
//! `sessions.json` holds a top-level JSON array of [`PersistedSession`]
//! records. Every mutation is written via the tmp-file-then-rename pattern so
//! a reader never observes a partially-written file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::PersistedSession;

/// Single-file snapshot store at `<data_dir>/sessions.json`.
///
/// Writes are serialized through an internal lock: the manager may issue
/// concurrent mutations, but at most one `save` is ever in flight.
pub struct Persistence {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Persistence {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { path: data_dir.into().join("sessions.json"), write_lock: Mutex::new(()) }
    }

    /// Parsed array, or empty on a missing file, or empty on a top-level
    /// non-array value. Fails with [`Error::CorruptStore`] on unparseable
    /// content.
    pub fn load(&self) -> Result<Vec<PersistedSession>> {
        load_from(&self.path)
    }

    /// Write `sessions.json.tmp` then rename over the target. Creates the
    /// parent directory on demand.
    pub fn save(&self, sessions: &[PersistedSession]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        save_to(&self.path, sessions)
    }

    /// Load, append `session`, save.
    pub fn add(&self, session: PersistedSession) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut sessions = load_from(&self.path)?;
        sessions.push(session);
        save_to(&self.path, &sessions)
    }

    /// Load, replace the entry matching `session.id`, save. A silent no-op if
    /// no entry has that id.
    pub fn update(&self, session: PersistedSession) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut sessions = load_from(&self.path)?;
        if let Some(existing) = sessions.iter_mut().find(|s| s.id == session.id) {
            *existing = session;
        }
        save_to(&self.path, &sessions)
    }

    /// Load, drop the entry with the given id, save. Silent no-op if absent.
    pub fn remove(&self, id: &str) -> Result<()> {
        self.remove_many(std::slice::from_ref(&id.to_string()))
    }

    /// Load, drop every entry whose id is in `ids`, save.
    pub fn remove_many(&self, ids: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut sessions = load_from(&self.path)?;
        sessions.retain(|s| !ids.iter().any(|id| id == &s.id));
        save_to(&self.path, &sessions)
    }
}

fn load_from(path: &Path) -> Result<Vec<PersistedSession>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::CorruptStore(format!("{}: {e}", path.display()))),
    };

    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| Error::CorruptStore(format!("{}: {e}", path.display())))?;

    match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)
            .map_err(|e| Error::CorruptStore(format!("{}: {e}", path.display()))),
        _ => Ok(Vec::new()),
    }
}

fn save_to(path: &Path, sessions: &[PersistedSession]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::CorruptStore(format!("{}: {e}", parent.display())))?;
    }

    let mut json = serde_json::to_string_pretty(sessions)
        .map_err(|e| Error::CorruptStore(e.to_string()))?;
    json.push('\n');

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)
        .map_err(|e| Error::CorruptStore(format!("{}: {e}", tmp_path.display())))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| Error::CorruptStore(format!("{}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
#[path = "persistence_tests.rs"]
mod tests;
