// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic liveness probe of every session's pid.
//!
//! Mirrors the process-liveness tier of this layer's provider detectors
//! (signal-0 probe), but runs once globally across all sessions rather than
//! once per child.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal;
use nix::unistd::Pid;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// `true` iff a process with the given pid answers a signal-0 probe.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(pid_i32), None).is_ok()
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Snapshot of one session's id and (if known) child pid, as seen by the
/// manager at probe time.
pub struct LiveSession {
    pub id: String,
    pub pid: Option<u32>,
}

/// Collaborator contract the [`HealthChecker`] drives every tick. Implemented
/// by the [`crate::manager::SessionManager`]; kept as a trait so the checker
/// never holds a direct reference back to the manager (see DESIGN.md on
/// breaking the manager/checker cycle).
pub trait LivenessTarget: Send + Sync {
    /// Every currently-live session this checker should probe.
    fn live_sessions(&self) -> Vec<LiveSession>;
    /// Called when `session_id`'s pid no longer answers signal-0: the
    /// implementation must emit an urgent error event, stop the session
    /// (swallowing any error — the process is already gone), and remove
    /// the record.
    fn on_dead(&self, session_id: String) -> BoxFuture<'static, ()>;
}

/// Runs a timer every `interval` probing every live session's pid.
pub struct HealthChecker {
    interval: Duration,
}

impl HealthChecker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn with_default_interval() -> Self {
        Self::new(Duration::from_secs(30))
    }

    /// Spawn the probe loop. The returned `CancellationToken` is cloned into
    /// the loop; dropping it has no effect (cancellation is explicit via
    /// `cancel()`), but the spawned task itself holds no reference to the
    /// runtime that would block process exit.
    pub fn spawn(&self, target: Arc<dyn LivenessTarget>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                for session in target.live_sessions() {
                    // No pid to probe (e.g. an in-process SDK agent) counts as alive:
                    // only an OS-confirmed dead pid should trigger a reap.
                    let alive = session.pid.is_none_or(is_process_alive);
                    if !alive {
                        warn!(session_id = %session.id, "health check: pid no longer alive");
                        target.on_dead(session.id).await;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
