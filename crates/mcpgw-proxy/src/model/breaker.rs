//! `CircuitBreaker` per-backend state record (spec.md §3).
//!
//! This is pure data; the transition rules live in
//! `crate::balancer::circuit_breaker`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Unix millis, `None` until the breaker first opens.
    pub opened_at_ms: Option<i64>,
    pub next_retry_at_ms: Option<i64>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at_ms: None,
            next_retry_at_ms: None,
        }
    }
}
