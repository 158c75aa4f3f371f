// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory session ownership: records user→session ownership, rejects
//! non-owner access.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Records which user owns each live session.
///
/// Ownership is recorded at spawn/resume and cleared on stop. Owner identity
/// is immutable for the lifetime of a session — there is no `transfer` operation.
#[derive(Debug, Default)]
pub struct SessionAcl {
    owners: RwLock<HashMap<String, String>>,
}

impl SessionAcl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ownership for a newly spawned/resumed session.
    pub fn record(&self, session_id: &str, owner_id: &str) {
        self.owners.write().unwrap_or_else(|e| e.into_inner()).insert(session_id.to_string(), owner_id.to_string());
    }

    /// Drop ownership for a session (called on stop).
    pub fn clear(&self, session_id: &str) {
        self.owners.write().unwrap_or_else(|e| e.into_inner()).remove(session_id);
    }

    /// `true` iff `user` owns `session_id`. `false` for an unknown session.
    pub fn can_access(&self, user: &str, session_id: &str) -> bool {
        self.owners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .is_some_and(|owner| owner == user)
    }

    pub fn owner_of(&self, session_id: &str) -> Option<String> {
        self.owners.read().unwrap_or_else(|e| e.into_inner()).get(session_id).cloned()
    }

    /// Fails with [`Error::UnknownSession`] if absent, [`Error::NotOwner`] on mismatch.
    pub fn assert_owner(&self, user: &str, session_id: &str) -> Result<()> {
        match self.owner_of(session_id) {
            None => Err(Error::UnknownSession(session_id.to_string())),
            Some(owner) if owner == user => Ok(()),
            Some(_) => Err(Error::NotOwner(session_id.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "acl_tests.rs"]
mod tests;
