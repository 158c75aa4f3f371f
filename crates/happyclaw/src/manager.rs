// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The central registry: spawn/resume/stop/switch, ownership, persistence,
//! event aggregation, and the per-session switch-state machine.
//!
//! `SessionManager` is a thin `Arc`-wrapped handle — cloning it is cheap and
//! every clone shares the same registry, mirroring how this layer's other
//! shared-state types (`Store`, `MuxState` in the wider system) are passed
//! around rather than threaded by reference.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::acl::SessionAcl;
use crate::audit::AuditLogger;
use crate::command::intercept;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, EventBusConfig};
use crate::health::{HealthChecker, LivenessTarget, LiveSession};
use crate::model::{now_ms, EventKind, Mode, PermissionOutcome, SessionEvent, SessionRecord, Severity, SwitchState};
use crate::persistence::Persistence;
use crate::provider::{Provider, ProviderSession, ReadPage, SpawnOptions};
use crate::whitelist::{canonical_form, CwdWhitelist};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct Entry {
    record: SessionRecord,
    session: Arc<dyn ProviderSession>,
}

struct Inner {
    providers: HashMap<&'static str, Arc<dyn Provider>>,
    acl: SessionAcl,
    whitelist: CwdWhitelist,
    persistence: Persistence,
    audit: AuditLogger,
    event_bus: Arc<EventBus>,
    drain_timeout: Duration,
    entries: StdRwLock<HashMap<String, Entry>>,
}

/// Top-level registry owning every live session's lifecycle, ownership,
/// persistence, and switch-state machine.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(config: &Config, providers: HashMap<&'static str, Arc<dyn Provider>>) -> Self {
        let data_dir = config.resolved_data_dir();
        let event_bus = Arc::new(EventBus::new(EventBusConfig {
            debounce: config.event_debounce(),
            max_batch_size: config.event_max_batch,
        }));
        Self {
            inner: Arc::new(Inner {
                providers,
                acl: SessionAcl::new(),
                whitelist: CwdWhitelist::new(config.allowed_cwds.clone()),
                persistence: Persistence::new(&data_dir),
                audit: AuditLogger::new(&data_dir),
                event_bus,
                drain_timeout: config.drain_timeout(),
                entries: StdRwLock::new(HashMap::new()),
            }),
        }
    }

    /// The shared event bus, for a caller that wants to subscribe directly.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.event_bus
    }

    fn new_id(provider: &str) -> String {
        format!("{provider}_{}", Uuid::new_v4())
    }

    fn audit(&self, user_id: &str, action: &str, session_id: Option<String>, details: Option<Value>) {
        let mut entry = crate::model::AuditEntry::new(user_id, action, session_id);
        if let Some(details) = details {
            entry = entry.with_details(details);
        }
        self.inner.audit.log(&entry);
    }

    fn touch_last_activity(&self, id: &str) {
        if let Some(entry) = self.inner.entries.write().unwrap_or_else(|e| e.into_inner()).get_mut(id) {
            entry.record.last_activity = now_ms();
        }
    }

    fn snapshot(&self, id: &str) -> Option<SessionRecord> {
        self.inner.entries.read().unwrap_or_else(|e| e.into_inner()).get(id).map(|e| e.record.clone())
    }

    fn persist_snapshot(&self) -> Result<()> {
        let records: Vec<_> = self
            .inner
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|e| e.record.to_persisted())
            .collect();
        self.inner.persistence.save(&records)
    }

    /// Register the manager's own listeners on a freshly spawned provider
    /// session: last-activity tracking, and forwarding events into the bus.
    fn wire(&self, session: &Arc<dyn ProviderSession>, id: String) {
        let mgr = self.clone();
        session.on_event(Arc::new(move |event: SessionEvent| {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.emit(event).await });
        }));
        let mgr = self.clone();
        let touch_id = id;
        session.on_message(Arc::new(move |_message| {
            mgr.touch_last_activity(&touch_id);
        }));
    }

    fn provider_for(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.inner.providers.get(name).cloned().ok_or_else(|| Error::SpawnFailed(format!("unknown provider: {name}")))
    }

    /// Publish an event to the bus, touching the session's last-activity
    /// stamp first. The entry point providers and the [`HealthChecker`] use
    /// to reach the bus without holding a reference back into the manager's
    /// internals.
    pub async fn emit(&self, event: SessionEvent) {
        self.touch_last_activity(&event.session_id);
        self.inner.event_bus.publish(event).await;
    }

    /// Assert `cwd` is whitelisted, spawn a fresh provider session, record
    /// ownership, persist, and audit.
    pub async fn spawn(&self, provider: &str, cwd: &str, mode: Mode, owner_id: &str) -> Result<SessionRecord> {
        self.inner.whitelist.assert(cwd)?;
        let provider_impl = self.provider_for(provider)?;
        let canonical_cwd = canonical_form(cwd).display().to_string();
        let id = Self::new_id(provider);

        let opts = SpawnOptions { cwd: canonical_cwd.clone(), mode, owner_id: owner_id.to_string(), resume_session_id: None };
        let session = match provider_impl.spawn(&id, &opts).await {
            Ok(session) => session,
            Err(e) => {
                self.audit(owner_id, "spawn_failed", None, Some(serde_json::json!({"provider": provider, "error": e.code()})));
                return Err(e);
            }
        };
        self.wire(&session, id.clone());

        let record = SessionRecord {
            id: id.clone(),
            provider: provider.to_string(),
            cwd: canonical_cwd,
            mode,
            owner_id: owner_id.to_string(),
            pid: session.pid(),
            switch_state: SwitchState::Running,
            created_at: now_ms(),
            last_activity: now_ms(),
        };

        self.inner.acl.record(&id, owner_id);
        self.inner.entries.write().unwrap_or_else(|e| e.into_inner()).insert(id.clone(), Entry { record: record.clone(), session });

        if let Err(e) = self.persist_snapshot() {
            warn!(session_id = %id, error = %e, "spawn: failed to persist new session");
        }
        self.audit(owner_id, "spawn", Some(id.clone()), Some(serde_json::json!({"provider": provider, "cwd": record.cwd})));
        info!(session_id = %id, provider, "session spawned");
        Ok(record)
    }

    /// Re-spawn a session's provider with `resumeSessionId` set so the agent
    /// reloads its own history. The caller must own the persisted record.
    pub async fn resume(&self, session_id: &str, mode: Mode, owner_id: &str) -> Result<SessionRecord> {
        let already_live = self.inner.entries.read().unwrap_or_else(|e| e.into_inner()).contains_key(session_id);
        if already_live {
            return Err(Error::SessionBusy(session_id.to_string()));
        }

        let persisted = self
            .inner
            .persistence
            .load()?
            .into_iter()
            .find(|s| s.id == session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
        if persisted.owner_id != owner_id {
            return Err(Error::NotOwner(session_id.to_string()));
        }

        let provider_impl = self.provider_for(&persisted.provider)?;
        let opts = SpawnOptions {
            cwd: persisted.cwd.clone(),
            mode,
            owner_id: owner_id.to_string(),
            resume_session_id: Some(session_id.to_string()),
        };
        let session = provider_impl.spawn(session_id, &opts).await?;
        self.wire(&session, session_id.to_string());

        let record = SessionRecord {
            id: session_id.to_string(),
            provider: persisted.provider.clone(),
            cwd: persisted.cwd.clone(),
            mode,
            owner_id: owner_id.to_string(),
            pid: session.pid(),
            switch_state: SwitchState::Running,
            created_at: persisted.created_at,
            last_activity: now_ms(),
        };

        self.inner.acl.record(session_id, owner_id);
        self.inner
            .entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string(), Entry { record: record.clone(), session });

        if let Err(e) = self.persist_snapshot() {
            warn!(session_id, error = %e, "resume: failed to persist session");
        }
        self.audit(owner_id, "resume", Some(session_id.to_string()), None);
        Ok(record)
    }

    /// A read-only lookup; fails with `UnknownSession`/`NotOwner` via the ACL.
    pub fn get(&self, user_id: &str, session_id: &str) -> Result<SessionRecord> {
        self.inner.acl.assert_owner(user_id, session_id)?;
        self.snapshot(session_id).ok_or_else(|| Error::UnknownSession(session_id.to_string()))
    }

    /// Every session `user_id` owns, optionally narrowed by `cwd`/`provider`.
    pub fn list(&self, user_id: &str, cwd: Option<&str>, provider: Option<&str>) -> Vec<SessionRecord> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|e| &e.record)
            .filter(|r| r.owner_id == user_id)
            .filter(|r| cwd.is_none_or(|c| r.cwd == c))
            .filter(|r| provider.is_none_or(|p| r.provider == p))
            .cloned()
            .collect()
    }

    pub fn get_switch_state(&self, session_id: &str) -> Option<SwitchState> {
        self.inner.entries.read().unwrap_or_else(|e| e.into_inner()).get(session_id).map(|e| e.record.switch_state)
    }

    pub fn get_last_activity(&self, session_id: &str) -> Option<u64> {
        self.inner.entries.read().unwrap_or_else(|e| e.into_inner()).get(session_id).map(|e| e.record.last_activity)
    }

    fn running_entry(&self, session_id: &str) -> Result<Arc<dyn ProviderSession>> {
        let entries = self.inner.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(session_id).ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
        if entry.record.switch_state != SwitchState::Running {
            return Err(Error::SessionBusy(session_id.to_string()));
        }
        Ok(Arc::clone(&entry.session))
    }

    /// Delegates to the provider's `read`, after an ownership and
    /// switch-state check.
    pub fn read_messages(&self, user_id: &str, session_id: &str, cursor: usize, limit: usize) -> Result<ReadPage> {
        self.inner.acl.assert_owner(user_id, session_id)?;
        let session = self.running_entry(session_id)?;
        session.read(cursor, limit)
    }

    /// Runs the send pre-filter, then delegates to the provider.
    pub async fn send(&self, user_id: &str, session_id: &str, input: &str) -> Result<()> {
        self.inner.acl.assert_owner(user_id, session_id)?;
        let session = self.running_entry(session_id)?;
        let intercepted = intercept(input);
        session.send(intercepted.content).await?;
        self.touch_last_activity(session_id);
        self.audit(user_id, "send", Some(session_id.to_string()), Some(serde_json::json!({"literal": intercepted.literal})));
        Ok(())
    }

    pub async fn respond_to_permission(
        &self,
        user_id: &str,
        session_id: &str,
        request_id: &str,
        outcome: PermissionOutcome,
    ) -> Result<()> {
        self.inner.acl.assert_owner(user_id, session_id)?;
        let session = self.running_entry(session_id)?;
        session.respond_to_permission(request_id, outcome).await?;
        self.audit(user_id, "respond_permission", Some(session_id.to_string()), Some(serde_json::json!({"requestId": request_id})));
        Ok(())
    }

    /// Stop a session owned by `user_id`: delegates to `provider.stop`,
    /// removes the record, persists, and audits.
    pub async fn stop(&self, user_id: &str, session_id: &str, force: bool) -> Result<()> {
        self.inner.acl.assert_owner(user_id, session_id)?;
        let result = self.stop_unchecked(session_id, force).await;
        self.audit(user_id, "stop", Some(session_id.to_string()), Some(serde_json::json!({"force": force})));
        result
    }

    /// `stop`, without the ACL check — used by the health checker, which is
    /// not acting on behalf of any one user.
    async fn stop_unchecked(&self, session_id: &str, force: bool) -> Result<()> {
        let session = {
            let mut entries = self.inner.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.remove(session_id).map(|e| e.session)
        };
        self.inner.acl.clear(session_id);
        if let Err(e) = self.persist_snapshot() {
            warn!(session_id, error = %e, "stop: failed to persist removal");
        }
        self.inner.event_bus.remove_session(session_id).await;

        match session {
            Some(session) => session.stop(force).await,
            None => Ok(()),
        }
    }

    /// Drive the switch-state machine: drain the current child, then
    /// re-spawn the provider in `target` mode, preserving the session id.
    pub async fn switch_mode(&self, user_id: &str, session_id: &str, target: Mode) -> Result<SessionRecord> {
        self.inner.acl.assert_owner(user_id, session_id)?;

        let (old_session, mut record) = {
            let mut entries = self.inner.entries.write().unwrap_or_else(|e| e.into_inner());
            let entry = entries.get_mut(session_id).ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
            if entry.record.switch_state != SwitchState::Running {
                return Err(Error::SessionBusy(session_id.to_string()));
            }
            entry.record.switch_state = SwitchState::Draining;
            (Arc::clone(&entry.session), entry.record.clone())
        };

        debug!(session_id, "switch: draining outgoing session");
        if tokio::time::timeout(self.inner.drain_timeout, old_session.stop(false)).await.is_err() {
            warn!(session_id, "switch: drain timed out, forcing kill");
            let _ = old_session.stop(true).await;
        }

        self.set_switch_state(session_id, SwitchState::Switching);

        let provider_impl = self.provider_for(&record.provider)?;
        let opts = SpawnOptions {
            cwd: record.cwd.clone(),
            mode: target,
            owner_id: user_id.to_string(),
            resume_session_id: Some(session_id.to_string()),
        };

        match provider_impl.spawn(session_id, &opts).await {
            Ok(new_session) => {
                self.wire(&new_session, session_id.to_string());
                record.mode = target;
                record.pid = new_session.pid();
                record.switch_state = SwitchState::Running;
                record.last_activity = now_ms();
                self.inner
                    .entries
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(session_id.to_string(), Entry { record: record.clone(), session: new_session });
                if let Err(e) = self.persist_snapshot() {
                    warn!(session_id, error = %e, "switch: failed to persist");
                }
                self.audit(user_id, "switch", Some(session_id.to_string()), Some(serde_json::json!({"mode": target})));
                Ok(record)
            }
            Err(e) => {
                record.switch_state = SwitchState::Error;
                if let Some(entry) = self.inner.entries.write().unwrap_or_else(|e| e.into_inner()).get_mut(session_id) {
                    entry.record.switch_state = SwitchState::Error;
                }
                self.audit(user_id, "switch_failed", Some(session_id.to_string()), Some(serde_json::json!({"error": e.code()})));
                self.emit(SessionEvent::new(EventKind::Error, Severity::Urgent, session_id, format!("switch failed: {e}"))).await;
                Err(e)
            }
        }
    }

    fn set_switch_state(&self, session_id: &str, state: SwitchState) {
        if let Some(entry) = self.inner.entries.write().unwrap_or_else(|e| e.into_inner()).get_mut(session_id) {
            entry.record.switch_state = state;
        }
    }

    /// Spawn the [`HealthChecker`]'s probe loop against this manager.
    pub fn spawn_health_checker(&self, interval: Duration, shutdown: tokio_util::sync::CancellationToken) {
        let checker = HealthChecker::new(interval);
        checker.spawn(Arc::new(self.clone()), shutdown);
    }
}

impl LivenessTarget for SessionManager {
    fn live_sessions(&self) -> Vec<LiveSession> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|e| LiveSession { id: e.record.id.clone(), pid: e.record.pid })
            .collect()
    }

    fn on_dead(&self, session_id: String) -> BoxFuture<'static, ()> {
        let mgr = self.clone();
        Box::pin(async move {
            mgr.emit(SessionEvent::new(EventKind::Error, Severity::Urgent, &session_id, "session process is no longer alive"))
                .await;
            let _ = mgr.stop_unchecked(&session_id, true).await;
        })
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
