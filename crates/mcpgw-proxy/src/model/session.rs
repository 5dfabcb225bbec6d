//! `Session` (spec.md §3): the gateway's view of one connected client.

use super::ids::{BackendId, NamespaceId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initializing,
    Connected,
    Disconnected,
    Error,
}

/// Principal a session acts as, carried through to rate-limit key
/// derivation (spec.md §4.7) and audit context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub org_id: super::ids::OrgId,
    pub role: String,
}

/// A connected client session (spec.md §3 `Session`).
///
/// The session exclusively owns its client transport handle and the set
/// of backend connections it references; the pool (not the session)
/// owns the backend connections themselves (spec.md §3 "Ownership").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub namespace_id: NamespaceId,
    pub principal: Principal,
    /// Backend ids this session has successfully initialized against.
    pub backend_connections: Vec<BackendId>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: SessionStatus,
}

impl Session {
    #[must_use]
    pub fn new(namespace_id: NamespaceId, principal: Principal) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            namespace_id,
            principal,
            backend_connections: Vec::new(),
            created_at: now,
            last_activity: now,
            status: SessionStatus::Initializing,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// `true` once initialize has succeeded for every backend the caller
    /// expects this session to reach (spec.md §3 "`connected` requires
    /// successful backend `initialize` for every referenced backend").
    #[must_use]
    pub fn is_fully_connected(&self, expected_backends: &[BackendId]) -> bool {
        expected_backends
            .iter()
            .all(|b| self.backend_connections.contains(b))
    }

    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
        now - self.last_activity >= idle_timeout
    }
}
