//! Idle-session and unreferenced-connection sweep (spec.md §5 step 6:
//! "idle for 30 min -> gateway issues Disconnect ... emits session_closed").

use mcpgw_proxy::router::Router;
use mcpgw_proxy::session::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub async fn run(router: Arc<Router>, sessions: Arc<SessionRegistry>, idle_timeout: Duration, sweep_interval: Duration) {
    let idle_timeout = chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::seconds(1800));
    let mut ticker = tokio::time::interval(sweep_interval);
    loop {
        ticker.tick().await;
        let idle = sessions.idle_sessions(chrono::Utc::now(), idle_timeout).await;
        for session_id in &idle {
            sessions.close(*session_id).await;
        }
        if !idle.is_empty() {
            debug!(count = idle.len(), "closed idle sessions");
        }
        let evicted = router.evict_idle_connections().await;
        if evicted > 0 {
            debug!(count = evicted, "evicted unreferenced pooled connections");
        }
    }
}
