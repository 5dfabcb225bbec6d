//! Session registry (spec.md §4.2 step 4, §5 "Session lifecycle").
//!
//! Distinct from [`crate::model::Session`], the data record: this module
//! is the `tokio::sync::RwLock`-guarded table of live sessions plus the
//! create/touch/close lifecycle and its published events.

use crate::error::{GatewayError, GatewayResult};
use crate::events::EventChannel;
use crate::model::{NamespaceId, Principal, Session, SessionId, SessionStatus};
use crate::router::Router;
use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Published on session create/close (spec.md §5 step 6).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Created { session_id: SessionId, namespace_id: NamespaceId },
    Closed { session_id: SessionId },
}

/// Live session table. `RwLock`-guarded (spec.md §5 "session registry
/// ... `tokio::sync::RwLock`, async, multi-reader"), with create/close
/// publishing to a shared [`EventChannel`].
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
    events: EventChannel<SessionEvent>,
    max_sessions: usize,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), events: EventChannel::new(), max_sessions }
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Creates and registers a new session, publishing `session_created`
    /// (spec.md §4.2 step 4), then eagerly runs the `initialize` handshake
    /// against every backend `namespace_id` aggregates (spec.md §4.2 step
    /// 3). A handshake failure doesn't fail session creation: it leaves
    /// the session registered with `status=error` (or, with
    /// `soft_init=true`, the failing backend is excluded and the session
    /// still reaches `connected`), matching "a failure here sets session
    /// state to error" rather than rejecting the caller outright.
    ///
    /// Rejects outright once `max_sessions` live sessions are already
    /// registered.
    pub async fn create(&self, router: &Router, namespace_id: NamespaceId, principal: Principal) -> GatewayResult<SessionId> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(GatewayError::configuration("session registry at capacity"));
        }
        let session = Session::new(namespace_id, principal);
        let id = session.id;
        sessions.insert(id, session);
        drop(sessions);
        self.events.publish(SessionEvent::Created { session_id: id, namespace_id });

        match router.initialize_namespace_backends(namespace_id, id).await {
            Ok(connected) => {
                for backend_id in connected {
                    let _ = self.record_backend_connected(id, backend_id).await;
                }
                let _ = self.mark_status(id, SessionStatus::Connected).await;
            }
            Err(_) => {
                let _ = self.mark_status(id, SessionStatus::Error).await;
            }
        }
        Ok(id)
    }

    pub async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn touch(&self, id: SessionId) -> GatewayResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| GatewayError::routing("session_not_found"))?;
        session.touch();
        Ok(())
    }

    pub async fn mark_status(&self, id: SessionId, status: SessionStatus) -> GatewayResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| GatewayError::routing("session_not_found"))?;
        session.status = status;
        Ok(())
    }

    pub async fn record_backend_connected(&self, id: SessionId, backend_id: crate::model::BackendId) -> GatewayResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| GatewayError::routing("session_not_found"))?;
        if !session.backend_connections.contains(&backend_id) {
            session.backend_connections.push(backend_id);
        }
        Ok(())
    }

    /// Removes the session and publishes `session_closed` (spec.md §5 step
    /// 6 "removes registry entry"). A no-op (not an error) if the session
    /// was already gone, since close is idempotent from the caller's view.
    pub async fn close(&self, id: SessionId) {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            self.events.publish(SessionEvent::Closed { session_id: id });
        }
    }

    /// Returns the ids of every session idle for at least `idle_timeout`,
    /// for the caller to disconnect and close (spec.md §5 step 6 "idle for
    /// 30 min -> gateway issues Disconnect ... emits session_closed").
    pub async fn idle_sessions(&self, now: chrono::DateTime<chrono::Utc>, idle_timeout: ChronoDuration) -> Vec<SessionId> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_idle(now, idle_timeout))
            .map(|s| s.id)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{CircuitBreaker, LoadBalancerAlgorithm};
    use crate::config::BackendValidationConfig;
    use crate::model::{Namespace, OrgId};
    use crate::pool::ConnectionPool;
    use std::time::Duration;

    fn principal() -> Principal {
        Principal { user_id: "u1".into(), org_id: OrgId::new(), role: "member".into() }
    }

    fn router() -> Router {
        Router::new(
            ConnectionPool::new(Duration::from_secs(30), Duration::from_secs(30)),
            CircuitBreaker::new(5, 2, Duration::from_secs(30)),
            LoadBalancerAlgorithm::RoundRobin,
            BackendValidationConfig::default(),
        )
    }

    /// A namespace with no members: `initialize_namespace_backends`
    /// succeeds trivially with nothing to connect to, so session creation
    /// doesn't need a live backend to exercise the eager-init path.
    fn register_empty_namespace(router: &Router) -> NamespaceId {
        let ns = Namespace {
            id: NamespaceId::new(),
            org: OrgId::new(),
            name: "ns1".into(),
            members: Vec::new(),
            tool_overrides: Vec::new(),
            sampling_backend: None,
            soft_init: false,
        };
        let id = ns.id;
        router.register_namespace(ns);
        id
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let r = router();
        let registry = SessionRegistry::new(10);
        let ns = register_empty_namespace(&r);
        let id = registry.create(&r, ns, principal()).await.unwrap();
        let session = registry.get(id).await.unwrap();
        assert_eq!(session.namespace_id, ns);
    }

    #[tokio::test]
    async fn create_reaches_connected_when_namespace_has_no_members_to_initialize() {
        let r = router();
        let registry = SessionRegistry::new(10);
        let ns = register_empty_namespace(&r);
        let id = registry.create(&r, ns, principal()).await.unwrap();
        let session = registry.get(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Connected);
    }

    #[tokio::test]
    async fn create_on_unknown_namespace_lands_in_error_status() {
        let r = router();
        let registry = SessionRegistry::new(10);
        let id = registry.create(&r, NamespaceId::new(), principal()).await.unwrap();
        let session = registry.get(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Error);
    }

    #[tokio::test]
    async fn create_publishes_a_session_created_event() {
        let r = router();
        let registry = SessionRegistry::new(10);
        let ns = register_empty_namespace(&r);
        let mut rx = registry.subscribe();
        let id = registry.create(&r, ns, principal()).await.unwrap();
        match rx.recv().await.unwrap() {
            SessionEvent::Created { session_id, .. } => assert_eq!(session_id, id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_removes_the_session_and_publishes_closed() {
        let r = router();
        let registry = SessionRegistry::new(10);
        let ns = register_empty_namespace(&r);
        let id = registry.create(&r, ns, principal()).await.unwrap();
        let mut rx = registry.subscribe();
        registry.close(id).await;
        assert!(registry.get(id).await.is_none());
        match rx.recv().await.unwrap() {
            SessionEvent::Closed { session_id } => assert_eq!(session_id, id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn closing_an_unknown_session_is_a_no_op() {
        let registry = SessionRegistry::new(10);
        registry.close(SessionId::new()).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn registry_rejects_new_sessions_at_capacity() {
        let r = router();
        let registry = SessionRegistry::new(1);
        let ns = register_empty_namespace(&r);
        registry.create(&r, ns, principal()).await.unwrap();
        assert!(registry.create(&r, ns, principal()).await.is_err());
    }

    #[tokio::test]
    async fn touching_an_unknown_session_errors() {
        let registry = SessionRegistry::new(10);
        assert!(registry.touch(SessionId::new()).await.is_err());
    }
}
