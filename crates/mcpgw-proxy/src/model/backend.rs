//! `BackendServer` and `VirtualServerSpec` (spec.md §3).

use super::ids::{BackendId, OrgId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Wire protocol a backend speaks (spec.md §3 `protocol`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProtocol {
    Http,
    Https,
    Ws,
    Sse,
    Stdio,
}

/// Lifecycle status of a registered backend. Health checker writes this
/// field exclusively; nothing else mutates it after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Active,
    Inactive,
    Unhealthy,
    Maintenance,
}

/// A registered backend MCP server (spec.md §3 `BackendServer`).
///
/// Soft-deleted via `is_active = false` rather than row removal, so
/// in-flight sessions referencing it still resolve during teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendServer {
    pub id: BackendId,
    pub org: OrgId,
    pub name: String,
    pub url: String,
    pub protocol: BackendProtocol,
    pub weight: u32,
    pub health_url: Option<String>,
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
    pub max_retries: u32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub status: BackendStatus,
    pub is_active: bool,
}

impl BackendServer {
    /// Eligible for routing: active status, not soft-deleted. Circuit
    /// breaker / load balancer health is a separate, faster-moving signal
    /// layered on top of this (spec.md §4.5/§4.6).
    #[must_use]
    pub fn is_routable(&self) -> bool {
        self.is_active && matches!(self.status, BackendStatus::Active)
    }
}

/// Which outbound protocol a virtual server's adapter speaks (spec.md §3
/// `adapter_type`). `GraphQl`/`GRpc`/`Soap` are typed but inert — see
/// `crate::adapters` for what "inert" means operationally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterType {
    Rest,
    GraphQl,
    GRpc,
    Soap,
}

/// Whether a namespace's override of a backend tool enables or disables it
/// (spec.md §3 `Namespace.tool_overrides`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolOverrideStatus {
    Active,
    Inactive,
}

/// One `(backend_id, tool_name, status)` tuple from `Namespace.tool_overrides`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOverride {
    pub backend_id: BackendId,
    pub tool_name: String,
    pub status: ToolOverrideStatus,
}

/// Immutable definition of a non-MCP service wrapped as a virtual MCP
/// server (spec.md §3 `VirtualServerSpec`, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualServerSpec {
    pub id: BackendId,
    pub name: String,
    pub adapter_type: AdapterType,
    pub tools: Vec<VirtualToolSpec>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// One tool's adapter-specific call spec, fully determining how a
/// `tools/call` translates to an outbound call (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualToolSpec {
    pub name: String,
    pub input_schema: serde_json::Value,
    /// REST call spec (method/url template/headers/...); `None` for
    /// adapter types that don't have a live call spec yet (spec.md §4.9
    /// supplement).
    #[serde(default)]
    pub rest_call: Option<crate::adapters::rest::RestCallSpec>,
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BackendServer {
        BackendServer {
            id: BackendId::new(),
            org: OrgId::new(),
            name: "server1".into(),
            url: "https://backend.example/mcp".into(),
            protocol: BackendProtocol::Https,
            weight: 1,
            health_url: None,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            metadata: HashMap::new(),
            status: BackendStatus::Active,
            is_active: true,
        }
    }

    #[test]
    fn active_server_is_routable() {
        assert!(sample().is_routable());
    }

    #[test]
    fn soft_deleted_server_is_not_routable() {
        let mut s = sample();
        s.is_active = false;
        assert!(!s.is_routable());
    }

    #[test]
    fn unhealthy_status_is_not_routable() {
        let mut s = sample();
        s.status = BackendStatus::Unhealthy;
        assert!(!s.is_routable());
    }

    #[test]
    fn timeout_round_trips_as_milliseconds() {
        let s = sample();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["timeout"], 5000);
        let back: BackendServer = serde_json::from_value(json).unwrap();
        assert_eq!(back.timeout, Duration::from_secs(5));
    }
}
