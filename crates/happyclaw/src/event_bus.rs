// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced, priority-sorted event fan-out to per-session and global
//! subscribers.
//!
//! A `permission_request` always bypasses batching and is delivered
//! synchronously as its own one-event batch. Every other event is folded
//! into a per-session pending batch that flushes either when it reaches
//! `max_batch_size` or after `debounce` has elapsed with no further activity
//! on that session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::model::{EventKind, SessionEvent};

/// A registered event-batch handler.
pub type EventHandler = Arc<dyn Fn(Vec<SessionEvent>) + Send + Sync>;

/// Opaque handle returned by `subscribe`/`subscribe_all`, passed back to the
/// matching `unsubscribe`/`unsubscribe_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Tunable batching parameters.
#[derive(Debug, Clone, Copy)]
pub struct EventBusConfig {
    pub debounce: Duration,
    pub max_batch_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(500), max_batch_size: 20 }
    }
}

#[derive(Default)]
struct SessionBatch {
    pending: Vec<SessionEvent>,
    /// Bumped on every publish; a debounce task that wakes and finds its
    /// snapshot stale knows a later event already reset the timer.
    generation: u64,
}

struct Inner {
    config: EventBusConfig,
    next_token: AtomicU64,
    sessions: AsyncMutex<HashMap<String, SessionBatch>>,
    session_subs: StdRwLock<HashMap<String, Vec<(SubscriptionToken, EventHandler)>>>,
    global_subs: StdRwLock<Vec<(SubscriptionToken, EventHandler)>>,
}

/// Priority-sorted, debounced event fan-out.
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                next_token: AtomicU64::new(1),
                sessions: AsyncMutex::new(HashMap::new()),
                session_subs: StdRwLock::new(HashMap::new()),
                global_subs: StdRwLock::new(Vec::new()),
            }),
        }
    }

    fn next_token(&self) -> SubscriptionToken {
        SubscriptionToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribe to events for one session. May be called multiple times with
    /// the same handler; each registration receives its own delivery.
    pub fn subscribe(&self, session_id: &str, handler: EventHandler) -> SubscriptionToken {
        let token = self.next_token();
        self.inner
            .session_subs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(session_id.to_string())
            .or_default()
            .push((token, handler));
        token
    }

    pub fn unsubscribe(&self, session_id: &str, token: SubscriptionToken) {
        let mut subs = self.inner.session_subs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = subs.get_mut(session_id) {
            list.retain(|(t, _)| *t != token);
        }
    }

    /// Subscribe to events for every session.
    pub fn subscribe_all(&self, handler: EventHandler) -> SubscriptionToken {
        let token = self.next_token();
        self.inner.global_subs.write().unwrap_or_else(|e| e.into_inner()).push((token, handler));
        token
    }

    pub fn unsubscribe_all(&self, token: SubscriptionToken) {
        self.inner.global_subs.write().unwrap_or_else(|e| e.into_inner()).retain(|(t, _)| *t != token);
    }

    /// Publish one event. Permission requests bypass batching entirely.
    pub async fn publish(&self, event: SessionEvent) {
        if event.kind == EventKind::PermissionRequest {
            deliver(&self.inner, &event.session_id.clone(), vec![event]);
            return;
        }

        let session_id = event.session_id.clone();
        let (flush_now, generation) = {
            let mut sessions = self.inner.sessions.lock().await;
            let batch = sessions.entry(session_id.clone()).or_default();
            batch.pending.push(event);
            batch.generation += 1;
            if batch.pending.len() >= self.inner.config.max_batch_size {
                let events = std::mem::take(&mut batch.pending);
                (Some(events), batch.generation)
            } else {
                (None, batch.generation)
            }
        };

        if let Some(events) = flush_now {
            deliver(&self.inner, &session_id, events);
            return;
        }

        let inner = Arc::clone(&self.inner);
        let debounce = self.inner.config.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let events = {
                let mut sessions = inner.sessions.lock().await;
                match sessions.get_mut(&session_id) {
                    Some(batch) if batch.generation == generation && !batch.pending.is_empty() => {
                        Some(std::mem::take(&mut batch.pending))
                    }
                    _ => None,
                }
            };
            if let Some(events) = events {
                deliver(&inner, &session_id, events);
            }
        });
    }

    /// Flush any pending batch for `session_id` (even with no subscribers),
    /// then drop all bus state for it.
    pub async fn remove_session(&self, session_id: &str) {
        let events = {
            let mut sessions = self.inner.sessions.lock().await;
            sessions.remove(session_id).map(|b| b.pending).filter(|p| !p.is_empty())
        };
        if let Some(events) = events {
            deliver(&self.inner, session_id, events);
        }
        self.inner.session_subs.write().unwrap_or_else(|e| e.into_inner()).remove(session_id);
    }

    /// Flush every session's pending batch, then clear all state.
    pub async fn dispose(&self) {
        let drained: Vec<(String, Vec<SessionEvent>)> = {
            let mut sessions = self.inner.sessions.lock().await;
            sessions.drain().map(|(id, b)| (id, b.pending)).filter(|(_, p)| !p.is_empty()).collect()
        };
        for (session_id, events) in drained {
            deliver(&self.inner, &session_id, events);
        }
        self.inner.session_subs.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.inner.global_subs.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Sort by (priority asc, timestamp asc — stable) and fan out to every
/// subscriber registered for `session_id` plus every global subscriber.
/// Handler panics are caught so one bad subscriber cannot break the rest.
fn deliver(inner: &Inner, session_id: &str, mut events: Vec<SessionEvent>) {
    events.sort_by_key(|e| (e.kind.priority(), e.timestamp));

    let session_handlers: Vec<EventHandler> = inner
        .session_subs
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(session_id)
        .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
        .unwrap_or_default();
    let global_handlers: Vec<EventHandler> =
        inner.global_subs.read().unwrap_or_else(|e| e.into_inner()).iter().map(|(_, h)| Arc::clone(h)).collect();

    for handler in session_handlers.into_iter().chain(global_handlers) {
        let events = events.clone();
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(events))).is_err() {
            warn!(session_id, "event subscriber panicked; swallowed");
        }
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
