//! HTTP + WebSocket surface.
//!
//! Router assembly, middleware stack, and `bind_with_fallback` follow the
//! `dashboard/mod.rs` pattern this crate is built from: security-headers
//! and host-validation middleware, a CORS-to-localhost policy, and a
//! fallback-to-random-port behaviour on `AddrInUse`. The routes themselves
//! are new — a snapshot/session/stats/hook surface instead of a read-only
//! ledger query API.

pub mod dto;
pub mod handlers;
pub mod ws;

use crate::enrichment::store::EnrichmentStore;
use crate::errors::AgentWatchError;
use crate::hooks::HookStore;
use crate::live_store::LiveStore;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub live: Arc<LiveStore>,
    pub hooks: Arc<HookStore>,
    pub connections: Arc<ws::ConnectionManager>,
    pub enrichment: Arc<EnrichmentStore>,
}

impl IntoResponse for AgentWatchError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(dto::ErrorDto { error: self.to_string() })).into_response()
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin([
            "http://127.0.0.1".parse::<HeaderValue>().unwrap(),
            "http://localhost".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(tower_http::cors::Any)
}

fn is_local_host(host: &str) -> bool {
    let hostname = host.split(':').next().unwrap_or("");
    hostname.is_empty() || hostname == "127.0.0.1" || hostname == "localhost" || hostname == "[::1]"
}

/// Reject requests whose `Host` header isn't a loopback name, so a browser
/// tab on another origin can't be DNS-rebound into hitting this daemon.
async fn validate_host(request: Request, next: Next) -> Response {
    let host = request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !is_local_host(host) {
        return (StatusCode::FORBIDDEN, "host not allowed").into_response();
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let is_api = request.uri().path().starts_with("/api/");
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'self'; connect-src 'self' ws://127.0.0.1:* ws://localhost:*"),
    );
    if is_api {
        headers.insert("cache-control", HeaderValue::from_static("no-store"));
    }
    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/snapshot", get(handlers::get_snapshot))
        .route("/api/sessions", get(handlers::list_sessions))
        .route("/api/sessions/{id}", get(handlers::get_session))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/hooks/{event}", post(handlers::post_hook))
        .route("/ws", get(handlers::ws_upgrade))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(validate_host))
        .layer(cors_layer())
        .with_state(state)
}

/// Bind the requested port; on `AddrInUse`, fall back to an OS-assigned
/// port rather than fail the daemon outright. An interactive prompt isn't
/// an option here since the daemon runs unattended, so the fallback is
/// just logged.
pub async fn bind_with_fallback(host: &str, port: u16) -> crate::errors::Result<tokio::net::TcpListener> {
    let requested: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| AgentWatchError::InputInvalid(format!("invalid bind address {host}:{port}: {e}")))?;

    match tokio::net::TcpListener::bind(requested).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            tracing::warn!(port, "requested port in use, falling back to an OS-assigned port");
            let fallback: SocketAddr = format!("{host}:0")
                .parse()
                .map_err(|e| AgentWatchError::InputInvalid(e.to_string()))?;
            tokio::net::TcpListener::bind(fallback)
                .await
                .map_err(|e| AgentWatchError::io_fatal(host, e))
        }
        Err(e) => Err(AgentWatchError::io_fatal(host, e)),
    }
}

/// Run the server until cancelled. Spawns one task per store that forwards
/// change notifications into WebSocket frames.
pub async fn serve(state: AppState, listener: tokio::net::TcpListener) -> crate::errors::Result<()> {
    let local_addr = listener.local_addr().map_err(|e| AgentWatchError::io_fatal("listener", e))?;
    tracing::info!(%local_addr, "http server listening");

    let app = router(state.clone());

    tokio::spawn(forward_live_changes(state.clone()));
    tokio::spawn(forward_hook_changes(state));

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| AgentWatchError::Internal(e.to_string()))
}

async fn forward_live_changes(state: AppState) {
    let mut changes = state.live.subscribe();
    loop {
        match changes.recv().await {
            Ok(crate::live_store::ChangeKind::Agents) => {
                let agents = state.live.agents();
                state.connections.broadcast(&ws::Frame::Agents { agents: &agents });
            }
            Ok(crate::live_store::ChangeKind::Repos) => {
                let repos: Vec<dto::RepoDto> = state.live.repos().into_iter().map(Into::into).collect();
                state.connections.broadcast(&ws::Frame::Repos { repos: &repos });
            }
            Ok(crate::live_store::ChangeKind::Ports) => {
                let ports = state.live.ports();
                state.connections.broadcast(&ws::Frame::Ports { ports: &ports });
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn forward_hook_changes(state: AppState) {
    let mut changes = state.hooks.subscribe();
    loop {
        match changes.recv().await {
            Ok(crate::hooks::HookChange::Session) | Ok(crate::hooks::HookChange::ToolUsage) => {
                // A single changed session isn't identified by the broadcast
                // payload, so the whole list is walked and each active
                // session re-pushed; cheap relative to the tick interval.
                for session in state.hooks.sessions() {
                    let dto: dto::SessionDto = session.into();
                    state.connections.broadcast(&ws::Frame::Session { session: &dto });
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_local_host_accepts_loopback_names() {
        assert!(is_local_host("127.0.0.1:7417"));
        assert!(is_local_host("localhost:7417"));
        assert!(is_local_host(""));
    }

    #[test]
    fn is_local_host_rejects_other_hosts() {
        assert!(!is_local_host("evil.example.com"));
        assert!(!is_local_host("169.254.169.254"));
    }
}
