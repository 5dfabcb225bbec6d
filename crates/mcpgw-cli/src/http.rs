//! External HTTP surface (spec.md §6): `POST /mcp/rpc`, the SSE transport
//! pair, `GET /mcp/ws`, and `POST /mcp/stream`. The admin REST surface is
//! intentionally absent here — spec.md §6 scopes it as a request/response
//! type contract only (`mcpgw_proxy::config`/`mcpgw_proxy::model`), not a
//! running HTTP router.
//!
//! Grounded on `turbomcp-proxy::cli::commands::serve::ServeCommand`'s axum
//! wiring, widened from one bridged backend to the gateway's full
//! method-table dispatch (see [`crate::rpc`]).

use crate::rpc;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use dashmap::DashMap;
use futures::stream::{self, Stream};
use mcpgw_protocol::jsonrpc::JsonRpcRequest;
use mcpgw_proxy::model::{OrgId, Principal, SessionId};
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Outbound channels for sessions connected over the SSE transport, keyed
/// by session id (spec.md §6 "`GET /mcp/sse?session_id=...`" + its
/// companion `POST /mcp/sse/send`).
#[derive(Clone, Default)]
pub struct SseHub {
    channels: Arc<DashMap<SessionId, mpsc::UnboundedSender<String>>>,
}

pub fn build_router(state: AppState) -> AxumRouter {
    let hub = SseHub::default();
    AxumRouter::new()
        .route("/mcp/rpc", post(handle_rpc))
        .route("/mcp/sse", get(handle_sse))
        .route("/mcp/sse/send", post(handle_sse_send))
        .route("/mcp/ws", get(handle_ws))
        .route("/mcp/stream", post(handle_stream))
        .route("/healthz", get(handle_healthz))
        .with_state((state, hub))
}

type AppStateWithHub = (AppState, SseHub);

async fn handle_healthz() -> &'static str {
    "ok"
}

/// Resolves (or creates) the session for a request, attaching rate-limit
/// usage headers (spec.md §6 "Rate-limit response headers") to whatever the
/// caller returns. Returns `None` both when no policy matches and when
/// `path` is on the configured skip-list (spec.md §4.7).
async fn rate_limit_check(
    state: &AppState,
    session_key: &str,
    path: &str,
    remote_addr: SocketAddr,
    headers: &HeaderMap,
) -> Option<mcpgw_proxy::ratelimit::RateLimitDecision> {
    if mcpgw_proxy::ratelimit::is_skip_path(path, &state.config.rate_limit.skip_paths) {
        return None;
    }
    let trusted_header = state.config.rate_limit.trusted_ip_header.as_deref();
    let header_value = trusted_header.and_then(|h| headers.get(h)).and_then(|v| v.to_str().ok());
    let remote_ip = mcpgw_proxy::ratelimit::resolve_remote_ip(trusted_header, header_value, &remote_addr.ip().to_string());

    let ctx = mcpgw_proxy::ratelimit::RateLimitContext {
        user_id: Some(session_key.to_string()),
        org_id: None,
        role: None,
        method: "POST".into(),
        path: path.to_string(),
        remote_ip,
        user_agent: headers.get(axum::http::header::USER_AGENT).and_then(|v| v.to_str().ok()).map(str::to_string),
    };
    let (policy, derived_key) = mcpgw_proxy::ratelimit::select_policy(&state.rate_limit_policies, &ctx)?;
    Some(state.rate_limiter.check(&derived_key, policy.limit, policy.window).await)
}

fn rate_limit_headers(decision: &mcpgw_proxy::ratelimit::RateLimitDecision) -> [(&'static str, String); 3] {
    [
        ("X-RateLimit-Limit", decision.usage.limit.to_string()),
        ("X-RateLimit-Remaining", decision.usage.remaining.to_string()),
        ("X-RateLimit-Reset", decision.usage.reset_at.to_string()),
    ]
}

async fn ensure_session(state: &AppState, namespace_id: mcpgw_proxy::model::NamespaceId) -> mcpgw_proxy::GatewayResult<SessionId> {
    state
        .sessions
        .create(&state.router, namespace_id, Principal { user_id: "anonymous".into(), org_id: OrgId::new(), role: "client".into() })
        .await
}

// -- POST /mcp/rpc ------------------------------------------------------

async fn handle_rpc(
    State((state, _hub)): State<AppStateWithHub>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let namespace_id = match state.resolve_namespace(request.params.as_ref()) {
        Ok(id) => id,
        Err(err) => return rpc_error_response(request.id, err),
    };
    let session_id = match ensure_session(&state, namespace_id).await {
        Ok(id) => id,
        Err(err) => return rpc_error_response(request.id, err),
    };

    let decision = rate_limit_check(&state, &session_id.to_string(), "/mcp/rpc", remote_addr, &headers).await;
    if let Some(decision) = &decision {
        if !decision.allowed {
            state.sessions.close(session_id).await;
            let headers = rate_limit_headers(decision);
            return (axum::http::StatusCode::TOO_MANY_REQUESTS, headers, "rate limit exceeded").into_response();
        }
    }

    let response = rpc::dispatch(&state, session_id, request).await;
    state.sessions.close(session_id).await;

    match (response, decision) {
        (Some(resp), Some(decision)) => (rate_limit_headers(&decision), Json(resp)).into_response(),
        (Some(resp), None) => Json(resp).into_response(),
        (None, _) => axum::http::StatusCode::ACCEPTED.into_response(),
    }
}

fn rpc_error_response(
    id: Option<mcpgw_protocol::jsonrpc::MessageId>,
    err: mcpgw_proxy::GatewayError,
) -> Response {
    let id = id.unwrap_or(mcpgw_protocol::jsonrpc::MessageId::Number(0));
    let resp = mcpgw_protocol::jsonrpc::JsonRpcResponse::failure(id, err.to_protocol_error().to_jsonrpc());
    Json(resp).into_response()
}

// -- GET /mcp/sse + POST /mcp/sse/send -----------------------------------

#[derive(Deserialize)]
struct SseQuery {
    session_id: Option<String>,
}

async fn handle_sse(
    State((state, hub)): State<AppStateWithHub>,
    Query(query): Query<SseQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = match query.session_id.as_deref().and_then(|s| s.parse::<uuid::Uuid>().ok()) {
        Some(uuid) => SessionId(uuid),
        None => {
            let id = ensure_session(&state, state.default_namespace).await.unwrap_or_else(|_| SessionId::new());
            id
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    hub.channels.insert(session_id, tx);

    let opening = Event::default().event("session").data(session_id.to_string());
    let body_stream = stream::unfold((Some(opening), rx), move |(first, mut rx)| async move {
        if let Some(event) = first {
            return Some((Ok(event), (None, rx)));
        }
        rx.recv().await.map(|payload| (Ok(Event::default().event("message").data(payload)), (None, rx)))
    });

    Sse::new(body_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn handle_sse_send(
    State((state, hub)): State<AppStateWithHub>,
    Query(query): Query<SseQuery>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let Some(session_id) = query.session_id.as_deref().and_then(|s| s.parse::<uuid::Uuid>().ok()).map(SessionId) else {
        return axum::http::StatusCode::BAD_REQUEST.into_response();
    };
    let Some(channel) = hub.channels.get(&session_id).map(|c| c.clone()) else {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    };
    if let Some(response) = rpc::dispatch(&state, session_id, request).await {
        if let Ok(payload) = serde_json::to_string(&response) {
            let _ = channel.send(payload);
        }
    }
    axum::http::StatusCode::ACCEPTED.into_response()
}

// -- GET /mcp/ws ----------------------------------------------------------

async fn handle_ws(State((state, _hub)): State<AppStateWithHub>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let Ok(session_id) = ensure_session(&state, state.default_namespace).await else {
        let _ = socket.close().await;
        return;
    };
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else { continue };
        let Ok(request) = serde_json::from_str::<JsonRpcRequest>(&text) else { continue };
        if let Some(response) = rpc::dispatch(&state, session_id, request).await {
            let Ok(payload) = serde_json::to_string(&response) else { continue };
            if socket.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    }
    state.sessions.close(session_id).await;
}

// -- POST /mcp/stream -----------------------------------------------------

/// Streamable HTTP (spec.md §6 "chunked body"): the request body carries
/// newline-delimited JSON-RPC requests, the response body streams back one
/// newline-delimited JSON-RPC response per request as each completes.
async fn handle_stream(State((state, _hub)): State<AppStateWithHub>, body: Body) -> Response {
    let Ok(bytes) = axum::body::to_bytes(body, 16 * 1024 * 1024).await else {
        return axum::http::StatusCode::BAD_REQUEST.into_response();
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();

    let Ok(session_id) = ensure_session(&state, state.default_namespace).await else {
        return axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes, std::io::Error>>();
    tokio::spawn(async move {
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let Ok(request) = serde_json::from_str::<JsonRpcRequest>(line) else { continue };
            if let Some(response) = rpc::dispatch(&state, session_id, request).await {
                if let Ok(mut payload) = serde_json::to_string(&response) {
                    payload.push('\n');
                    if tx.send(Ok(Bytes::from(payload))).is_err() {
                        break;
                    }
                }
            }
        }
        state.sessions.close(session_id).await;
    });

    let output = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(output))
        .unwrap_or_else(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
