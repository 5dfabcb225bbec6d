//! Method-table dispatch for `POST /mcp/rpc` (spec.md §6).
//!
//! Parses the one JSON-RPC request already deserialized by the HTTP layer,
//! routes it to the matching [`mcpgw_proxy::router::Router`] operation, and
//! folds the outcome back into a [`JsonRpcResponse`]. Notifications (no
//! `id`) are handled but never produce a response body.

use crate::state::AppState;
use mcpgw_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, MessageId};
use mcpgw_proxy::filter::{FilterAction, FilterContext, FilterDirection};
use mcpgw_proxy::model::SessionId;
use mcpgw_proxy::{GatewayError, GatewayResult};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Dispatches one request and returns its response, or `None` for
/// notifications (`notifications/initialized` is accepted and ignored;
/// spec.md §6 method list). Runs the configured filter chain inbound
/// around method handling and outbound around the result (spec.md §4.8).
pub async fn dispatch(state: &AppState, session_id: SessionId, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    if request.is_notification() {
        return None;
    }
    let id = request.id.clone().unwrap_or(MessageId::Number(0));
    let outcome = run_filtered(state, session_id, &request.method, request.params).await;
    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(err) => JsonRpcResponse::failure(id, err.to_protocol_error().to_jsonrpc()),
    })
}

async fn run_filtered(state: &AppState, session_id: SessionId, method: &str, params: Option<Value>) -> GatewayResult<Value> {
    let namespace_id = state.resolve_namespace(params.as_ref())?;
    let ctx = FilterContext {
        session_id,
        namespace_id,
        backend_id: None,
        method: method.to_string(),
        cancellation: CancellationToken::new(),
    };

    let inbound_content = params.clone().unwrap_or(Value::Null);
    let (inbound, filtered_content) = state.filters.apply(&ctx, FilterDirection::Inbound, "json", inbound_content).await;
    if inbound.blocked && matches!(inbound.action, Some(FilterAction::Block)) {
        return Err(GatewayError::FilteredOut { filter: "inbound".into(), reason: inbound.violations.join(", ") });
    }
    let params = if inbound.modified { Some(filtered_content) } else { params };

    let result = handle_method(state, session_id, method, params).await?;

    let (outbound, filtered_result) = state.filters.apply(&ctx, FilterDirection::Outbound, "json", result.clone()).await;
    if outbound.blocked && matches!(outbound.action, Some(FilterAction::Block)) {
        return Err(GatewayError::FilteredOut { filter: "outbound".into(), reason: outbound.violations.join(", ") });
    }
    Ok(if outbound.modified { filtered_result } else { result })
}

async fn handle_method(
    state: &AppState,
    session_id: SessionId,
    method: &str,
    params: Option<Value>,
) -> GatewayResult<Value> {
    match method {
        "notifications/initialized" => Ok(Value::Null),
        "initialize" => {
            let namespace_id = state.resolve_namespace(params.as_ref())?;
            let result = state.router.initialize(namespace_id).await?;
            Ok(serde_json::to_value(result)?)
        }
        "ping" => Ok(state.router.ping()),
        "tools/list" => {
            let namespace_id = state.resolve_namespace(params.as_ref())?;
            let tools = state.router.list_tools(namespace_id).await?;
            Ok(serde_json::json!({ "tools": tools }))
        }
        "tools/call" => {
            let namespace_id = state.resolve_namespace(params.as_ref())?;
            let params = params.ok_or_else(|| GatewayError::routing("tools/call requires params".to_string()))?;
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::invalid_tool_name("tools/call missing \"name\""))?;
            let arguments = params
                .get("arguments")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?;
            let result = state.router.call_tool(session_id, namespace_id, name, arguments).await?;
            Ok(serde_json::to_value(result)?)
        }
        "resources/list" => {
            let namespace_id = state.resolve_namespace(params.as_ref())?;
            let resources = state.router.list_resources(namespace_id).await?;
            Ok(serde_json::json!({ "resources": resources }))
        }
        "resources/read" => {
            let namespace_id = state.resolve_namespace(params.as_ref())?;
            let uri = params
                .as_ref()
                .and_then(|p| p.get("uri"))
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::routing("resources/read requires \"uri\"".to_string()))?;
            let contents = state.router.read_resource(namespace_id, uri).await?;
            Ok(serde_json::json!({ "contents": contents }))
        }
        "prompts/list" => {
            let namespace_id = state.resolve_namespace(params.as_ref())?;
            let prompts = state.router.list_prompts(namespace_id).await?;
            Ok(serde_json::json!({ "prompts": prompts }))
        }
        "prompts/get" => {
            let namespace_id = state.resolve_namespace(params.as_ref())?;
            let params = params.ok_or_else(|| GatewayError::routing("prompts/get requires params".to_string()))?;
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::routing("prompts/get missing \"name\"".to_string()))?;
            let arguments = params
                .get("arguments")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?;
            let result = state.router.get_prompt(namespace_id, name, arguments).await?;
            Ok(serde_json::to_value(result)?)
        }
        "completion/complete" => {
            let namespace_id = state.resolve_namespace(params.as_ref())?;
            state.router.completion_complete(namespace_id, params).await
        }
        other => Err(GatewayError::routing(format!("unknown method {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgw_proxy::balancer::{CircuitBreaker, LoadBalancerAlgorithm};
    use mcpgw_proxy::config::BackendValidationConfig;
    use mcpgw_proxy::filter::FilterChain;
    use mcpgw_proxy::model::NamespaceId;
    use mcpgw_proxy::pool::ConnectionPool;
    use mcpgw_proxy::ratelimit::{InMemoryRateLimitStore, RateLimitAlgorithm, RateLimiter};
    use mcpgw_proxy::router::Router;
    use mcpgw_proxy::session::SessionRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> AppState {
        let router = Router::new(
            ConnectionPool::new(Duration::from_secs(30), Duration::from_secs(30)),
            CircuitBreaker::new(5, 2, Duration::from_secs(30)),
            LoadBalancerAlgorithm::RoundRobin,
            BackendValidationConfig::default(),
        );
        AppState {
            router: Arc::new(router),
            sessions: Arc::new(SessionRegistry::new(10)),
            rate_limiter: Arc::new(RateLimiter::new(
                RateLimitAlgorithm::SlidingWindow,
                Arc::new(InMemoryRateLimitStore::new(Duration::from_secs(300))),
            )),
            rate_limit_policies: Arc::new(Vec::new()),
            filters: Arc::new(FilterChain::new(Vec::new())),
            config: Arc::new(mcpgw_proxy::config::GatewayConfig::default()),
            default_namespace: NamespaceId::new(),
        }
    }

    #[tokio::test]
    async fn ping_returns_a_result_without_touching_any_backend() {
        let state = state();
        let request = JsonRpcRequest::new(MessageId::Number(1), "ping", None);
        let response = dispatch(&state, SessionId::new(), request).await.unwrap();
        assert_eq!(response.id, MessageId::Number(1));
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let state = state();
        let request = JsonRpcRequest {
            jsonrpc: mcpgw_protocol::jsonrpc::JsonRpcVersionTag,
            method: "notifications/initialized".into(),
            params: None,
            id: None,
        };
        assert!(dispatch(&state, SessionId::new(), request).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method_maps_to_method_not_found() {
        let state = state();
        let request = JsonRpcRequest::new(MessageId::Number(2), "nonexistent/method", None);
        let response = dispatch(&state, SessionId::new(), request).await.unwrap();
        match response.outcome {
            mcpgw_protocol::jsonrpc::JsonRpcOutcome::Error { error } => assert_eq!(error.code, -32601),
            other => panic!("expected an error outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tools_list_on_unknown_namespace_maps_to_method_not_found() {
        let state = state();
        let request = JsonRpcRequest::new(MessageId::Number(3), "tools/list", None);
        let response = dispatch(&state, SessionId::new(), request).await.unwrap();
        match response.outcome {
            mcpgw_protocol::jsonrpc::JsonRpcOutcome::Error { error } => assert_eq!(error.code, -32601),
            other => panic!("expected an error outcome, got {other:?}"),
        }
    }
}
