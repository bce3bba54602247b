//! Route handlers.
//!
//! Follows the `dashboard/handlers.rs` typed-query-param + `Json<T>` style
//! this crate is built from: each handler borrows from `AppState`, converts
//! to a DTO, and returns `Json`. Unknown ids return 404 via
//! `AgentWatchError`, which implements `IntoResponse`.

use super::dto::{HookResultDto, RepoDto, SessionDetailDto, SessionDto, StatsDto, ToolStatsDto};
use super::ws::{self, Frame};
use super::AppState;
use crate::audit::{self, AuditCategory};
use crate::errors::{AgentWatchError, Result};
use crate::models::SessionSource;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use super::dto::SnapshotDto;

pub async fn get_snapshot(State(state): State<AppState>) -> Json<SnapshotDto> {
    Json(SnapshotDto {
        agents: state.live.agents(),
        repos: state.live.repos().into_iter().map(Into::into).collect(),
        ports: state.live.ports(),
    })
}

#[derive(Deserialize, Default)]
pub struct SessionListQuery {
    #[serde(default)]
    pub active_only: bool,
    pub cwd: Option<String>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> Json<Vec<SessionDto>> {
    let sessions = state
        .hooks
        .sessions()
        .into_iter()
        .filter(|s| !query.active_only || s.active())
        .filter(|s| query.cwd.as_deref().map_or(true, |cwd| s.cwd == cwd))
        .map(SessionDto::from)
        .collect();
    Json(sessions)
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<SessionDetailDto>, AgentWatchError> {
    let session = state
        .hooks
        .session(&id)
        .ok_or_else(|| AgentWatchError::NotFound(format!("session {id}")))?;
    let tool_usages = state.hooks.tool_usages_for_session(&id);
    Ok(Json(SessionDetailDto { session: session.into(), tool_usages }))
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsDto> {
    Json(StatsDto {
        tool_stats: state.hooks.tool_stats().into_iter().map(ToolStatsDto::from).collect(),
        daily_stats: state.hooks.daily_stats(),
    })
}

/// The union of fields any hook event might carry. Each event handler below
/// pulls out only what it needs; absent fields are `AgentWatchError::
/// InputInvalid` only where the specific event actually requires them.
#[derive(Deserialize, Default)]
pub struct HookEventBody {
    pub session_id: Option<String>,
    pub transcript_path: Option<String>,
    pub cwd: Option<String>,
    pub permission_mode: Option<String>,
    pub source: Option<String>,
    pub tool_use_id: Option<String>,
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: serde_json::Value,
    pub tool_response: Option<serde_json::Value>,
    pub error: Option<String>,
    pub rule_name: Option<String>,
    pub reason: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub awaiting_user: Option<bool>,
}

fn require<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str> {
    field
        .as_deref()
        .ok_or_else(|| AgentWatchError::InputInvalid(format!("missing field: {name}")))
}

fn parse_source(raw: Option<&str>) -> SessionSource {
    match raw {
        Some("resume") => SessionSource::Resume,
        Some("compact") => SessionSource::Compact,
        _ => SessionSource::Startup,
    }
}

pub async fn post_hook(
    State(state): State<AppState>,
    Path(event): Path<String>,
    Json(body): Json<HookEventBody>,
) -> std::result::Result<Json<HookResultDto>, AgentWatchError> {
    match event.as_str() {
        "SessionStart" => {
            let session_id = require(&body.session_id, "session_id")?;
            let cwd = require(&body.cwd, "cwd")?;
            state.hooks.session_start(
                session_id,
                body.transcript_path.clone(),
                cwd,
                body.permission_mode.clone(),
                parse_source(body.source.as_deref()),
            )?;
            // Fire-and-forget: a slow/unresponsive `git` call shouldn't add
            // its timeout to the hook's response latency.
            let enrichment = state.enrichment.clone();
            let repo_path = std::path::PathBuf::from(cwd);
            let session_id = session_id.to_string();
            tokio::spawn(async move { enrichment.capture_baseline(&session_id, &repo_path).await });
        }
        "SessionEnd" | "Stop" => {
            let session_id = require(&body.session_id, "session_id")?;
            let already_ended = state.hooks.session(session_id).map(|s| !s.active()).unwrap_or(false);
            if let Some(session) = state.hooks.session_end(session_id)? {
                // `Stop` fires once per agent turn and can repeat after the
                // session has already been closed; only run the pipeline
                // the first time, so a later `Stop` doesn't re-consume the
                // diff baseline and overwrite a good record with a
                // degraded one computed with no baseline.
                if !already_ended {
                    let usages = state.hooks.tool_usages_for_session(session_id);
                    if let Some(record) = state.enrichment.run_and_store(&session, &usages).await? {
                        audit::log_event(AuditCategory::Enrichment, "computed", &record.session_ref_key, None)?;
                    }
                }
            }
        }
        "PreToolUse" => {
            let session_id = require(&body.session_id, "session_id")?.to_string();
            let tool_use_id = require(&body.tool_use_id, "tool_use_id")?.to_string();
            let tool_name = require(&body.tool_name, "tool_name")?.to_string();
            let cwd = body.cwd.clone().unwrap_or_default();

            if body.error.as_deref() == Some("security_block") {
                state.hooks.record_security_block(
                    &session_id,
                    &tool_name,
                    body.tool_input.clone(),
                    body.rule_name.as_deref(),
                    body.reason.as_deref(),
                )?;
            } else {
                state
                    .hooks
                    .record_pre_tool_use(&session_id, &tool_use_id, &tool_name, body.tool_input.clone(), &cwd);
            }
        }
        "PostToolUse" => {
            let tool_use_id = require(&body.tool_use_id, "tool_use_id")?;
            let completed = state
                .hooks
                .record_post_tool_use(tool_use_id, body.tool_response.clone(), body.error.clone())?;

            if let Some(usage) = completed {
                if usage.tool_name == "Bash" {
                    if let Some(response) = &usage.tool_response {
                        let output = response
                            .get("stdout")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default();
                        if !output.is_empty() {
                            state
                                .hooks
                                .try_record_commit_from_bash_output(&usage.session_id, &usage.cwd, output)?;
                        }
                    }
                }
            }

            if let (Some(input), Some(output)) = (body.input_tokens, body.output_tokens) {
                if let Some(session_id) = &body.session_id {
                    let cost = body.cost_usd.unwrap_or(0.0);
                    state.hooks.update_session_tokens(session_id, input, output, cost)?;
                }
            }
        }
        other => {
            return Err(AgentWatchError::InputInvalid(format!("unknown hook event: {other}")));
        }
    }

    Ok(Json(HookResultDto::default()))
}

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let agents = state.live.agents();
    let repos: Vec<RepoDto> = state.live.repos().into_iter().map(Into::into).collect();
    let ports = state.live.ports();
    let sessions: Vec<SessionDto> = state.hooks.sessions().into_iter().map(Into::into).collect();

    ws.on_upgrade(move |socket| async move {
        let init = Frame::Init { agents: &agents, repos: &repos, ports: &ports, sessions: &sessions };
        ws::handle_socket(socket, state, init).await;
    })
    .into_response()
}
