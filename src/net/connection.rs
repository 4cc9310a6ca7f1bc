//! Session identity and per-port lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for log correlation
//! - Count live sessions per user port (RAII guard)
//! - Mirror the count into the `gateway_active_sessions` gauge

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough; only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts live sessions on one user port.
///
/// Clones share the same counter, so the HTTP status page can read what the
/// port server writes.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    user: Arc<str>,
    active_count: Arc<AtomicU64>,
}

impl SessionTracker {
    pub fn new(user: impl Into<Arc<str>>) -> Self {
        Self {
            user: user.into(),
            active_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a new session. The guard decrements on drop.
    pub fn track(&self) -> SessionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_sessions(&self.user, active);
        SessionGuard {
            user: Arc::clone(&self.user),
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

/// Lifetime of one session.
#[derive(Debug)]
pub struct SessionGuard {
    user: Arc<str>,
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl SessionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_active_sessions(&self.user, active);
        tracing::trace!(connection_id = %self.id, user = %self.user, "Session closed");
    }
}
