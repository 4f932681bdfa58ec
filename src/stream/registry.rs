use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::permission::{PermissionCorrelator, PermissionGate};
use crate::state::request_id::RequestIdGenerator;
use crate::util::unix_now_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPhase {
    Generating,
    Stopping,
    Finished,
}

/// Snapshot of one session, as reported by `/v1/streams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamState {
    pub event_id: String,
    pub provider_id: String,
    pub model_id: String,
    pub phase: StreamPhase,
    pub events_delivered: u64,
    pub started_at: u64,
}

struct SessionEntry {
    event_id: String,
    provider_id: String,
    model_id: String,
    started_at: u64,
    cancel: CancellationToken,
    stopping: AtomicBool,
    events_delivered: AtomicU64,
    finished: watch::Sender<bool>,
}

impl SessionEntry {
    fn phase(&self) -> StreamPhase {
        if *self.finished.borrow() {
            StreamPhase::Finished
        } else if self.stopping.load(Ordering::Acquire) || self.cancel.is_cancelled() {
            StreamPhase::Stopping
        } else {
            StreamPhase::Generating
        }
    }

    fn snapshot(&self) -> StreamState {
        StreamState {
            event_id: self.event_id.clone(),
            provider_id: self.provider_id.clone(),
            model_id: self.model_id.clone(),
            phase: self.phase(),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            started_at: self.started_at,
        }
    }

    fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.cancel.cancel();
    }
}

/// Registry of in-flight sessions with admission control.
///
/// All inserts and removals go through one mutex, so operations on the same
/// event id are totally ordered.
pub struct SessionRegistry {
    sessions: Mutex<FxHashMap<String, Arc<SessionEntry>>>,
    max_concurrent: usize,
    permissions: Arc<PermissionCorrelator>,
    ids: RequestIdGenerator,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(max_concurrent: usize, permissions: Arc<PermissionCorrelator>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(FxHashMap::default()),
            max_concurrent,
            permissions,
            ids: RequestIdGenerator::new(),
        })
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Admit a new session, generating an event id when none is supplied.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Capacity`] when the ceiling is reached,
    /// [`GatewayError::InvalidRequest`] when `event_id` is already active.
    pub fn admit(
        self: &Arc<Self>,
        event_id: Option<String>,
        provider_id: &str,
        model_id: &str,
    ) -> Result<SessionHandle, GatewayError> {
        let event_id = match event_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => self.ids.next_event_id(),
        };

        let mut sessions = self.sessions.lock();
        if sessions.len() >= self.max_concurrent {
            tracing::warn!(
                event_id = %event_id,
                active = sessions.len(),
                limit = self.max_concurrent,
                "session rejected at concurrency ceiling"
            );
            return Err(GatewayError::Capacity {
                limit: self.max_concurrent,
            });
        }
        if sessions.contains_key(&event_id) {
            return Err(GatewayError::InvalidRequest(format!(
                "Event id '{event_id}' is already streaming"
            )));
        }

        let (finished, _) = watch::channel(false);
        let entry = Arc::new(SessionEntry {
            event_id: event_id.clone(),
            provider_id: provider_id.to_string(),
            model_id: model_id.to_string(),
            started_at: unix_now_secs(),
            cancel: CancellationToken::new(),
            stopping: AtomicBool::new(false),
            events_delivered: AtomicU64::new(0),
            finished,
        });
        sessions.insert(event_id.clone(), Arc::clone(&entry));
        let active = sessions.len();
        drop(sessions);

        tracing::info!(
            event_id = %event_id,
            provider = provider_id,
            model = model_id,
            active,
            "session admitted"
        );
        Ok(SessionHandle {
            registry: Arc::clone(self),
            entry,
            released: false,
        })
    }

    /// Signal one session to stop. Returns `false` when it is not active.
    pub fn stop(&self, event_id: &str) -> bool {
        let entry = self.sessions.lock().get(event_id).cloned();
        match entry {
            Some(entry) => {
                entry.request_stop();
                tracing::info!(event_id, "session stop requested");
                true
            }
            None => false,
        }
    }

    /// Broadcast cancellation to every active session.
    pub fn cancel_all(&self) -> usize {
        let entries: Vec<_> = self.sessions.lock().values().cloned().collect();
        for entry in &entries {
            entry.request_stop();
        }
        if !entries.is_empty() {
            tracing::info!(cancelled = entries.len(), "all sessions cancelled");
        }
        entries.len()
    }

    /// Cancel every active session and wait until each has delivered its
    /// terminal event.
    pub async fn stop_all(&self) -> usize {
        let waiters: Vec<_> = {
            let sessions = self.sessions.lock();
            sessions
                .values()
                .map(|entry| {
                    entry.request_stop();
                    entry.finished.subscribe()
                })
                .collect()
        };
        let count = waiters.len();
        for mut finished in waiters {
            // A closed channel means the entry is already gone.
            let _ = finished.wait_for(|done| *done).await;
        }
        if count > 0 {
            tracing::info!(stopped = count, "all sessions stopped");
        }
        count
    }

    #[must_use]
    pub fn is_generating(&self, event_id: &str) -> bool {
        self.sessions
            .lock()
            .get(event_id)
            .is_some_and(|entry| entry.phase() == StreamPhase::Generating)
    }

    #[must_use]
    pub fn stream_state(&self, event_id: &str) -> Option<StreamState> {
        self.sessions.lock().get(event_id).map(|entry| entry.snapshot())
    }

    /// All active sessions, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<StreamState> {
        let mut states: Vec<_> = self
            .sessions
            .lock()
            .values()
            .map(|entry| entry.snapshot())
            .collect();
        states.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        states
    }

    fn release(&self, entry: &Arc<SessionEntry>) {
        {
            let mut sessions = self.sessions.lock();
            if sessions
                .get(&entry.event_id)
                .is_some_and(|current| Arc::ptr_eq(current, entry))
            {
                sessions.remove(&entry.event_id);
            }
        }
        entry.cancel.cancel();
        entry.finished.send_replace(true);
        self.permissions.discard_session(&entry.event_id);
        tracing::info!(
            event_id = %entry.event_id,
            events = entry.events_delivered.load(Ordering::Relaxed),
            "session released"
        );
    }
}

/// Scoped ownership of one admitted session. The session is deregistered
/// exactly once: on [`SessionHandle::release`] or when the handle is dropped.
pub struct SessionHandle {
    registry: Arc<SessionRegistry>,
    entry: Arc<SessionEntry>,
    released: bool,
}

impl SessionHandle {
    #[must_use]
    pub fn event_id(&self) -> &str {
        &self.entry.event_id
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.entry.cancel.clone()
    }

    #[must_use]
    pub fn permission_gate(&self) -> PermissionGate {
        PermissionGate::new(
            Arc::clone(&self.registry.permissions),
            self.entry.event_id.clone(),
            self.entry.cancel.clone(),
        )
    }

    pub fn record_event(&self) {
        self.entry.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.entry.snapshot()
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.entry);
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.release();
    }
}
