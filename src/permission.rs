//! Correlates out-of-band permission decisions with suspended tool calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::util::format_request_seq_hex;

/// A tool invocation waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPermission {
    pub request_id: String,
    pub session_id: String,
    pub tool_name: String,
    pub description: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub rememberable: bool,
}

struct PendingEntry {
    permission: PendingPermission,
    reply: oneshot::Sender<bool>,
}

#[derive(Default)]
struct CorrelatorInner {
    pending: FxHashMap<String, PendingEntry>,
    /// `(session_id, tool_name)` → remembered decision.
    remembered: FxHashMap<(String, String), bool>,
}

/// Outcome of registering a permission request.
pub enum Registration {
    /// A remembered decision applied; nothing is pending.
    Decided(bool),
    Pending(PendingPermission, PermissionTicket),
}

/// The suspended side of a pending permission.
pub struct PermissionTicket {
    reply: oneshot::Receiver<bool>,
    cancel: CancellationToken,
}

impl PermissionTicket {
    /// Wait for the decision. Cancellation of the owning session, or the
    /// entry being discarded, counts as a denial.
    pub async fn wait(self) -> bool {
        let PermissionTicket { reply, cancel } = self;
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            decision = reply => decision.unwrap_or(false),
        }
    }
}

/// Shared table of pending permissions, keyed by request id.
pub struct PermissionCorrelator {
    inner: Mutex<CorrelatorInner>,
    seq: AtomicU64,
}

impl Default for PermissionCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CorrelatorInner::default()),
            seq: AtomicU64::new(1),
        }
    }

    /// Register a suspended tool invocation for `session_id`.
    pub fn register(
        &self,
        session_id: &str,
        tool_name: &str,
        description: &str,
        options: Vec<String>,
        rememberable: bool,
        cancel: CancellationToken,
    ) -> Registration {
        let mut inner = self.inner.lock();
        if let Some(&decision) = inner
            .remembered
            .get(&(session_id.to_string(), tool_name.to_string()))
        {
            tracing::debug!(session_id, tool = tool_name, decision, "remembered permission applied");
            return Registration::Decided(decision);
        }

        let request_id = format_request_seq_hex("perm_", self.seq.fetch_add(1, Ordering::Relaxed));
        let permission = PendingPermission {
            request_id: request_id.clone(),
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            description: description.to_string(),
            options,
            rememberable,
        };
        let (tx, rx) = oneshot::channel();
        inner.pending.insert(
            request_id.clone(),
            PendingEntry {
                permission: permission.clone(),
                reply: tx,
            },
        );
        drop(inner);

        tracing::info!(request_id = %request_id, session_id, tool = tool_name, "permission pending");
        Registration::Pending(
            permission,
            PermissionTicket {
                reply: rx,
                cancel,
            },
        )
    }

    /// Deliver a decision to the one continuation waiting on `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PermissionNotFound`] when nothing is pending
    /// under that id; other entries are untouched.
    pub fn resolve(
        &self,
        request_id: &str,
        granted: bool,
        remember: bool,
    ) -> Result<PendingPermission, GatewayError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .pending
            .remove(request_id)
            .ok_or_else(|| GatewayError::PermissionNotFound(request_id.to_string()))?;

        let PendingEntry { permission, reply } = entry;
        if remember && permission.rememberable {
            inner.remembered.insert(
                (permission.session_id.clone(), permission.tool_name.clone()),
                granted,
            );
        }
        drop(inner);

        if reply.send(granted).is_err() {
            tracing::debug!(request_id, "permission resolved after its waiter went away");
        }
        tracing::info!(
            request_id,
            session_id = %permission.session_id,
            granted,
            remember,
            "permission resolved"
        );
        Ok(permission)
    }

    /// Pending permissions, optionally filtered to one session, in creation order.
    #[must_use]
    pub fn pending(&self, session_id: Option<&str>) -> Vec<PendingPermission> {
        let inner = self.inner.lock();
        let mut out: Vec<PendingPermission> = inner
            .pending
            .values()
            .filter(|entry| session_id.map_or(true, |sid| entry.permission.session_id == sid))
            .map(|entry| entry.permission.clone())
            .collect();
        out.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        out
    }

    /// Drop every pending entry and remembered decision of a finished session.
    /// Dropped waiters observe a denial.
    pub fn discard_session(&self, session_id: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.pending.len();
        inner
            .pending
            .retain(|_, entry| entry.permission.session_id != session_id);
        inner.remembered.retain(|(sid, _), _| sid != session_id);
        let discarded = before - inner.pending.len();
        if discarded > 0 {
            tracing::debug!(session_id, discarded, "pending permissions discarded");
        }
        discarded
    }
}

/// Handle a provider uses to suspend a tool call pending approval.
#[derive(Clone)]
pub struct PermissionGate {
    correlator: Arc<PermissionCorrelator>,
    session_id: String,
    cancel: CancellationToken,
}

impl PermissionGate {
    #[must_use]
    pub fn new(
        correlator: Arc<PermissionCorrelator>,
        session_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            correlator,
            session_id: session_id.into(),
            cancel,
        }
    }

    pub fn request(
        &self,
        tool_name: &str,
        description: &str,
        options: Vec<String>,
        rememberable: bool,
    ) -> Registration {
        self.correlator.register(
            &self.session_id,
            tool_name,
            description,
            options,
            rememberable,
            self.cancel.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_of(reg: Registration) -> (PendingPermission, PermissionTicket) {
        match reg {
            Registration::Pending(p, t) => (p, t),
            Registration::Decided(_) => panic!("expected a pending registration"),
        }
    }

    fn register(
        c: &PermissionCorrelator,
        session: &str,
        tool: &str,
        rememberable: bool,
    ) -> Registration {
        c.register(
            session,
            tool,
            "run it",
            vec!["allow".into(), "deny".into()],
            rememberable,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_resolution_reaches_only_its_session() {
        let c = PermissionCorrelator::new();
        let (p1, t1) = pending_of(register(&c, "s1", "bash", false));
        let (p2, _t2) = pending_of(register(&c, "s2", "bash", false));

        c.resolve(&p1.request_id, true, false).unwrap();
        assert!(t1.wait().await);
        let remaining = c.pending(None);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].request_id, p2.request_id);
    }

    #[test]
    fn test_unknown_request_id_fails_without_side_effects() {
        let c = PermissionCorrelator::new();
        let (p, _t) = pending_of(register(&c, "s1", "bash", false));
        let err = c.resolve("perm_nope", true, false).unwrap_err();
        assert!(matches!(err, GatewayError::PermissionNotFound(_)));
        assert_eq!(c.pending(None), vec![p.clone()]);

        c.resolve(&p.request_id, false, false).unwrap();
        assert!(matches!(
            c.resolve(&p.request_id, true, false),
            Err(GatewayError::PermissionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_denies() {
        let c = PermissionCorrelator::new();
        let cancel = CancellationToken::new();
        let (_p, t) = pending_of(c.register("s", "bash", "", vec![], false, cancel.clone()));
        cancel.cancel();
        assert!(!t.wait().await);
    }

    #[tokio::test]
    async fn test_discard_session_denies_waiters() {
        let c = PermissionCorrelator::new();
        let (_p, t) = pending_of(register(&c, "s", "bash", false));
        register(&c, "other", "bash", false);
        assert_eq!(c.discard_session("s"), 1);
        assert!(!t.wait().await);
        assert_eq!(c.pending(Some("other")).len(), 1);
        assert!(c.pending(Some("s")).is_empty());
    }

    #[test]
    fn test_remember_applies_to_same_tool_in_same_session() {
        let c = PermissionCorrelator::new();
        let (p, _t) = pending_of(register(&c, "s", "bash", true));
        c.resolve(&p.request_id, true, true).unwrap();

        assert!(matches!(register(&c, "s", "bash", true), Registration::Decided(true)));
        assert!(matches!(register(&c, "s", "edit", true), Registration::Pending(..)));
        assert!(matches!(register(&c, "t", "bash", true), Registration::Pending(..)));
    }

    #[test]
    fn test_remember_ignored_when_not_rememberable() {
        let c = PermissionCorrelator::new();
        let (p, _t) = pending_of(register(&c, "s", "bash", false));
        c.resolve(&p.request_id, true, true).unwrap();
        assert!(matches!(register(&c, "s", "bash", false), Registration::Pending(..)));
    }
}
