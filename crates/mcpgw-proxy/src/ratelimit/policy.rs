//! Rate-limit policy matching and key derivation (spec.md §4.7).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-request context a policy matches against (spec.md §4.7).
#[derive(Debug, Clone, Default)]
pub struct RateLimitContext {
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    pub role: Option<String>,
    pub method: String,
    pub path: String,
    pub remote_ip: String,
    pub user_agent: Option<String>,
}

/// Which part of the context a matched policy's limit key is derived
/// from (spec.md §4.7 "limit key").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKeyKind {
    PerUser,
    PerOrg,
    PerEndpointMethodPath,
    PerIp,
}

/// Conditions gating whether a policy applies; `None` fields match
/// anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyCondition {
    pub method: Option<String>,
    pub path_prefix: Option<String>,
    pub role: Option<String>,
}

impl PolicyCondition {
    fn matches(&self, ctx: &RateLimitContext) -> bool {
        if let Some(m) = &self.method {
            if m != &ctx.method {
                return false;
            }
        }
        if let Some(p) = &self.path_prefix {
            if !ctx.path.starts_with(p.as_str()) {
                return false;
            }
        }
        if let Some(r) = &self.role {
            if ctx.role.as_deref() != Some(r.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One entry of the rate-limit policy table (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub priority: i32,
    #[serde(default)]
    pub condition: PolicyCondition,
    pub key_kind: LimitKeyKind,
    pub limit: u64,
    #[serde(with = "crate::config::humantime_duration")]
    pub window: Duration,
}

impl RateLimitPolicy {
    fn derive_key(&self, ctx: &RateLimitContext) -> String {
        match self.key_kind {
            LimitKeyKind::PerUser => format!("user:{}", ctx.user_id.as_deref().unwrap_or("anonymous")),
            LimitKeyKind::PerOrg => format!("org:{}", ctx.org_id.as_deref().unwrap_or("none")),
            LimitKeyKind::PerEndpointMethodPath => format!("endpoint:{}:{}", ctx.method, ctx.path),
            LimitKeyKind::PerIp => format!("ip:{}", ctx.remote_ip),
        }
    }
}

/// Evaluates `policies` in descending priority order and returns the
/// first match's derived key and `(limit, window)` pair, per spec.md
/// §4.7 "the first policy whose conditions match yields a limit key".
#[must_use]
pub fn select_policy<'a>(
    policies: &'a [RateLimitPolicy],
    ctx: &RateLimitContext,
) -> Option<(&'a RateLimitPolicy, String)> {
    let mut sorted: Vec<&RateLimitPolicy> = policies.iter().collect();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
    sorted
        .into_iter()
        .find(|p| p.condition.matches(ctx))
        .map(|p| (p, p.derive_key(ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RateLimitContext {
        RateLimitContext {
            user_id: Some("alice".into()),
            org_id: Some("acme".into()),
            role: Some("member".into()),
            method: "tools/call".into(),
            path: "/mcp/rpc".into(),
            remote_ip: "203.0.113.9".into(),
            user_agent: None,
        }
    }

    #[test]
    fn higher_priority_policy_wins_when_both_match() {
        let policies = vec![
            RateLimitPolicy {
                priority: 1,
                condition: PolicyCondition::default(),
                key_kind: LimitKeyKind::PerIp,
                limit: 1000,
                window: Duration::from_secs(60),
            },
            RateLimitPolicy {
                priority: 10,
                condition: PolicyCondition::default(),
                key_kind: LimitKeyKind::PerUser,
                limit: 2,
                window: Duration::from_secs(60),
            },
        ];
        let (policy, key) = select_policy(&policies, &ctx()).unwrap();
        assert_eq!(policy.limit, 2);
        assert_eq!(key, "user:alice");
    }

    #[test]
    fn non_matching_condition_is_skipped() {
        let policies = vec![RateLimitPolicy {
            priority: 10,
            condition: PolicyCondition { method: Some("ping".into()), ..Default::default() },
            key_kind: LimitKeyKind::PerUser,
            limit: 2,
            window: Duration::from_secs(60),
        }];
        assert!(select_policy(&policies, &ctx()).is_none());
    }

    #[test]
    fn per_ip_key_derivation() {
        let policies = vec![RateLimitPolicy {
            priority: 1,
            condition: PolicyCondition::default(),
            key_kind: LimitKeyKind::PerIp,
            limit: 100,
            window: Duration::from_secs(60),
        }];
        let (_, key) = select_policy(&policies, &ctx()).unwrap();
        assert_eq!(key, "ip:203.0.113.9");
    }
}
