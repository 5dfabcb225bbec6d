//! Gateway configuration (spec.md §6 "ambient config").
//!
//! Loaded from TOML/JSON/YAML via `serde`, with `${VAR}` / `${VAR:-default}`
//! placeholders resolved against the process environment before
//! deserialization, the way `DB_*`/`REDIS_*`/`JWT_SECRET` are wired through
//! in the admin surface this core sits behind.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::balancer::load_balancer::LoadBalancerAlgorithm;
use crate::ratelimit::RateLimitAlgorithm;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub session: SessionConfig,
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub backend_validation: BackendValidationConfig,
    #[serde(default)]
    pub websocket_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            backend_validation: BackendValidationConfig::default(),
            websocket_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(with = "humantime_duration")]
    pub idle_timeout: Duration,
    pub max_sessions: usize,
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(1800),
            max_sessions: 10_000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub algorithm: LoadBalancerAlgorithm,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self { algorithm: LoadBalancerAlgorithm::RoundRobin }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    #[serde(with = "humantime_duration")]
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub algorithm: RateLimitAlgorithm,
    pub limit: u64,
    #[serde(with = "humantime_duration")]
    pub window: Duration,
    /// Request paths exempt from rate limiting regardless of policy match
    /// (spec.md §4.7 "health checks and admin probes are never throttled").
    #[serde(default)]
    pub skip_paths: Vec<String>,
    /// When set, the client IP used for `PerIp` keys and the
    /// `RateLimitContext` is taken from this header (e.g.
    /// `X-Forwarded-For`'s first hop) instead of the raw socket peer
    /// address, for deployments fronted by a trusted reverse proxy.
    #[serde(default)]
    pub trusted_ip_header: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            algorithm: RateLimitAlgorithm::SlidingWindow,
            limit: 600,
            window: Duration::from_secs(60),
            skip_paths: vec!["/healthz".to_string()],
            trusted_ip_header: None,
        }
    }
}

/// SSRF protection level for backend/REST-adapter URL validation (spec.md
/// §4.9 "SSRF protection" / §7 edge cases).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SsrfProtection {
    #[default]
    Strict,
    Balanced { allowed_private_networks: Vec<IpNetwork> },
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendValidationConfig {
    pub ssrf_protection: SsrfProtection,
    pub allowed_schemes: Vec<String>,
    #[serde(default)]
    pub blocked_hosts: Vec<String>,
}

impl Default for BackendValidationConfig {
    fn default() -> Self {
        Self {
            ssrf_protection: SsrfProtection::Strict,
            allowed_schemes: vec!["http".into(), "https".into(), "ws".into(), "wss".into()],
            blocked_hosts: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Parses `raw` (TOML) after resolving `${VAR}`/`${VAR:-default}`
    /// placeholders against the process environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let resolved = substitute_env(raw, &|key| std::env::var(key).ok());
        toml::from_str(&resolved).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
}

/// Resolves `${VAR}` and `${VAR:-default}` placeholders in `input`. A
/// lookup failure with no default is left untouched — the downstream TOML
/// parser will fail loudly on the literal `${VAR}` rather than silently
/// producing an empty string.
fn substitute_env(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            break;
        };
        let body = &after[..end];
        let resolved = match body.split_once(":-") {
            Some((key, default)) => lookup(key).unwrap_or_else(|| default.to_string()),
            None => lookup(body).unwrap_or_else(|| format!("${{{body}}}")),
        };
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Millisecond-based `Duration` (de)serialization, shared by every config
/// struct in this crate that carries a duration field.
pub(crate) mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_plain_var() {
        let out = substitute_env("url = \"${HOST}\"", &|k| {
            (k == "HOST").then(|| "example.com".to_string())
        });
        assert_eq!(out, "url = \"example.com\"");
    }

    #[test]
    fn falls_back_to_default_when_unset() {
        let out = substitute_env("port = ${PORT:-8080}", &|_| None);
        assert_eq!(out, "port = 8080");
    }

    #[test]
    fn prefers_env_value_over_default() {
        let out = substitute_env("port = ${PORT:-8080}", &|k| {
            (k == "PORT").then(|| "9000".to_string())
        });
        assert_eq!(out, "port = 9000");
    }

    #[test]
    fn unresolved_var_without_default_is_left_as_placeholder() {
        let out = substitute_env("secret = ${JWT_SECRET}", &|_| None);
        assert_eq!(out, "secret = ${JWT_SECRET}");
    }

    #[test]
    fn multiple_placeholders_in_one_string_all_resolve() {
        let out = substitute_env("${A}-${B:-b}", &|k| (k == "A").then(|| "a".to_string()));
        assert_eq!(out, "a-b");
    }

    #[test]
    fn default_gateway_config_round_trips() {
        let cfg = GatewayConfig::default();
        let toml_str = toml::to_string(&cfg).unwrap();
        let back: GatewayConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.session.max_sessions, cfg.session.max_sessions);
    }
}
