//! Gateway data model (spec.md §3).

mod backend;
mod breaker;
mod ids;
mod namespace;
mod session;

pub use backend::{AdapterType, BackendProtocol, BackendServer, BackendStatus, ToolOverride, ToolOverrideStatus, VirtualServerSpec};
pub use breaker::{CircuitBreakerState, CircuitState};
pub use ids::{BackendId, NamespaceId, OrgId, SessionId};
pub use namespace::Namespace;
pub use session::{Principal, Session, SessionStatus};
