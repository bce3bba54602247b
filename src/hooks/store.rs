//! Hook store core.
//!
//! In-memory session/tool-usage/commit state, backed by the persistence
//! layout in `persistence.rs`. Follows the `hook.rs` payload-extraction
//! style (fallback chains, field defaults) this crate is built from,
//! generalized from logging already-completed MCP tool calls to the full
//! Pre/Post/SessionStart/SessionEnd/Stop lifecycle.

use super::{commit, persistence};
use crate::audit::{self, AuditCategory};
use crate::errors::Result;
use crate::hooks::persistence::StatsBlob;
use crate::models::{
    CommitAttribution, DailyStats, PermissionMode, Session, SessionSource, ToolStats, ToolUsage,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const MAX_TOOL_USAGES: usize = 10_000;
const TOOL_USAGE_WINDOW_HOURS: i64 = 24;
const SESSION_RETENTION_DAYS: i64 = 30;
const DEAD_PROCESS_GRACE: chrono::Duration = chrono::Duration::hours(1);
const STALENESS_DEFAULT: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookChange {
    Session,
    ToolUsage,
}

struct State {
    sessions: HashMap<String, Session>,
    pending_usages: HashMap<String, ToolUsage>,
    completed_usages: Vec<ToolUsage>,
    tool_stats: HashMap<String, ToolStats>,
    daily_stats: HashMap<String, DailyStats>,
    commits: Vec<CommitAttribution>,
}

pub struct HookStore {
    state: Mutex<State>,
    changes: broadcast::Sender<HookChange>,
}

impl HookStore {
    /// Load the last 24h of sessions/usages/commits plus stats.json, and
    /// reconstruct in-memory state.
    pub fn load() -> Result<Self> {
        let sessions = persistence::load_recent_sessions()?;
        let usages = persistence::load_recent_tool_usages()?;
        let commits = persistence::load_recent_commits()?;
        let stats = persistence::load_stats()?;

        let (changes, _) = broadcast::channel(256);
        Ok(HookStore {
            state: Mutex::new(State {
                sessions,
                pending_usages: HashMap::new(),
                completed_usages: usages,
                tool_stats: stats.per_tool,
                daily_stats: stats.per_day,
                commits,
            }),
            changes,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HookChange> {
        self.changes.subscribe()
    }

    fn notify(&self, kind: HookChange) {
        let _ = self.changes.send(kind);
    }

    fn persist_stats(&self, state: &State) -> Result<()> {
        persistence::save_stats(&StatsBlob {
            per_tool: state.tool_stats.clone(),
            per_day: state.daily_stats.clone(),
        })
    }

    /// Idempotent: a repeated `sessionStart` for the same id overwrites
    /// metadata without incrementing the daily counter a second time (the
    /// open-question resolution recorded in DESIGN.md).
    pub fn session_start(
        &self,
        id: &str,
        transcript_path: Option<String>,
        cwd: &str,
        permission_mode: Option<String>,
        source: SessionSource,
    ) -> Result<Session> {
        let now = chrono::Utc::now();
        let mut state = self.state.lock().unwrap();
        let already_existed = state.sessions.contains_key(id);

        let session = state
            .sessions
            .entry(id.to_string())
            .and_modify(|s| {
                s.transcript_path = transcript_path.clone();
                s.cwd = cwd.to_string();
                s.permission_mode = permission_mode.clone();
                s.source = source;
                s.last_activity = now;
            })
            .or_insert_with(|| Session::new(id, transcript_path, cwd, permission_mode, source, now))
            .clone();

        if !already_existed {
            let date = now.format("%Y-%m-%d").to_string();
            let daily = state.daily_stats.entry(date.clone()).or_insert_with(|| DailyStats {
                date,
                ..Default::default()
            });
            daily.session_count += 1;
        }

        persistence::append_session(&session)?;
        self.persist_stats(&state)?;
        drop(state);
        audit::log_event(
            AuditCategory::Session,
            if already_existed { "resume" } else { "start" },
            id,
            None,
        )?;
        self.notify(HookChange::Session);
        Ok(session)
    }

    pub fn session_end(&self, id: &str) -> Result<Option<Session>> {
        let mut state = self.state.lock().unwrap();
        let Some(session) = state.sessions.get_mut(id) else { return Ok(None) };
        session.end_time = Some(chrono::Utc::now());
        let session = session.clone();
        persistence::append_session(&session)?;
        drop(state);
        audit::log_event(AuditCategory::Session, "end", id, None)?;
        self.notify(HookChange::Session);
        Ok(Some(session))
    }

    pub fn update_session_awaiting(&self, id: &str, flag: bool) -> Result<Option<Session>> {
        let mut state = self.state.lock().unwrap();
        let Some(session) = state.sessions.get_mut(id) else { return Ok(None) };
        session.awaiting_user = flag;
        session.last_activity = chrono::Utc::now();
        let session = session.clone();
        persistence::append_session(&session)?;
        drop(state);
        self.notify(HookChange::Session);
        Ok(Some(session))
    }

    pub fn update_session_tokens(
        &self,
        id: &str,
        input: u64,
        output: u64,
        cost: f64,
    ) -> Result<Option<Session>> {
        let mut state = self.state.lock().unwrap();
        let Some(session) = state.sessions.get_mut(id) else { return Ok(None) };
        session.total_input_tokens += input;
        session.total_output_tokens += output;
        session.estimated_cost_usd += cost;
        session.last_activity = chrono::Utc::now();
        let session = session.clone();
        persistence::append_session(&session)?;
        drop(state);
        self.notify(HookChange::Session);
        Ok(Some(session))
    }

    /// Explicitly bind a session to a process id, bypassing the cwd-match
    /// heuristic in `match_sessions_to_agents`.
    pub fn set_bound_pid(&self, id: &str, pid: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(session) = state.sessions.get_mut(id) {
            session.bound_pid = Some(pid);
        }
    }

    pub fn increment_auto_continue_attempts(&self, id: &str) -> Option<u32> {
        let mut state = self.state.lock().unwrap();
        let session = state.sessions.get_mut(id)?;
        session.auto_continue_attempts += 1;
        Some(session.auto_continue_attempts)
    }

    pub fn reset_auto_continue_attempts(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(session) = state.sessions.get_mut(id) {
            session.auto_continue_attempts = 0;
        }
    }

    /// Creates a pending tool-usage keyed by `tool_use_id`; clears the
    /// session's awaiting flag.
    pub fn record_pre_tool_use(
        &self,
        session_id: &str,
        tool_use_id: &str,
        tool_name: &str,
        tool_input: serde_json::Value,
        cwd: &str,
    ) -> ToolUsage {
        let now = chrono::Utc::now();
        let input_size_bytes = serde_json::to_vec(&tool_input).ok().map(|v| v.len() as u64);
        let usage = ToolUsage {
            tool_use_id: tool_use_id.to_string(),
            tool_name: tool_name.to_string(),
            tool_input,
            session_id: session_id.to_string(),
            cwd: cwd.to_string(),
            timestamp: now,
            tool_response: None,
            error: None,
            duration_ms: None,
            input_size_bytes,
        };

        let mut state = self.state.lock().unwrap();
        state.pending_usages.insert(tool_use_id.to_string(), usage.clone());
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.awaiting_user = false;
            session.last_activity = now;
        }
        usage
    }

    /// Matches the pending record; completes it. Returns `None` if no
    /// pending record exists for `tool_use_id` — PostToolUse always matches
    /// the most recent Pre for that id and is dropped if none exists.
    pub fn record_post_tool_use(
        &self,
        tool_use_id: &str,
        tool_response: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<Option<ToolUsage>> {
        let now = chrono::Utc::now();
        let mut state = self.state.lock().unwrap();
        let Some(mut usage) = state.pending_usages.remove(tool_use_id) else { return Ok(None) };

        let duration_ms = (now - usage.timestamp).num_milliseconds().max(0) as u64;
        usage.tool_response = tool_response;
        usage.error = error;
        usage.duration_ms = Some(duration_ms);
        let success = usage.success();

        let stats = state.tool_stats.entry(usage.tool_name.clone()).or_insert_with(|| ToolStats {
            tool_name: usage.tool_name.clone(),
            ..Default::default()
        });
        stats.record(duration_ms, success, now);

        let date = now.format("%Y-%m-%d").to_string();
        let daily = state
            .daily_stats
            .entry(date.clone())
            .or_insert_with(|| DailyStats { date, ..Default::default() });
        daily.tool_call_count += 1;
        *daily.per_tool.entry(usage.tool_name.clone()).or_insert(0) += 1;

        if let Some(session) = state.sessions.get_mut(&usage.session_id) {
            session.tools_used.entry(usage.tool_name.clone()).and_modify(|c| *c += 1).or_insert(1);
            session.recompute_tool_call_count();
            session.last_activity = now;
        }

        state.completed_usages.push(usage.clone());
        cleanup_usages(&mut state.completed_usages);

        persistence::append_tool_usage(&usage)?;
        self.persist_stats(&state)?;
        if let Some(session) = state.sessions.get(&usage.session_id).cloned() {
            persistence::append_session(&session)?;
        }
        drop(state);
        self.notify(HookChange::ToolUsage);
        Ok(Some(usage))
    }

    pub fn record_security_block(
        &self,
        session_id: &str,
        tool_name: &str,
        tool_input: serde_json::Value,
        rule_name: Option<&str>,
        reason: Option<&str>,
    ) -> Result<ToolUsage> {
        let now = chrono::Utc::now();
        let reason_text = reason.unwrap_or("blocked by policy");
        let rule_text = rule_name.map(|r| format!(" ({r})")).unwrap_or_default();
        let usage = ToolUsage {
            tool_use_id: format!("blocked-{}-{tool_name}", now.timestamp_millis()),
            tool_name: tool_name.to_string(),
            tool_input,
            session_id: session_id.to_string(),
            cwd: String::new(),
            timestamp: now,
            tool_response: None,
            error: Some(format!("SECURITY_BLOCKED: {reason_text}{rule_text}")),
            duration_ms: Some(0),
            input_size_bytes: None,
        };

        let mut state = self.state.lock().unwrap();
        state.completed_usages.push(usage.clone());
        cleanup_usages(&mut state.completed_usages);
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.last_activity = now;
        }
        persistence::append_tool_usage(&usage)?;
        drop(state);
        self.notify(HookChange::ToolUsage);
        Ok(usage)
    }

    pub fn record_commit(
        &self,
        session_id: &str,
        commit_hash: &str,
        message: &str,
        repo_path: &str,
    ) -> Result<CommitAttribution> {
        let attribution = CommitAttribution {
            hash: commit_hash.to_string(),
            session_id: session_id.to_string(),
            timestamp: chrono::Utc::now(),
            message: message.to_string(),
            repo_path: repo_path.to_string(),
        };

        let mut state = self.state.lock().unwrap();
        state.commits.push(attribution.clone());
        if let Some(session) = state.sessions.get_mut(session_id) {
            if !session.commits.contains(&commit_hash.to_string()) {
                session.commits.push(commit_hash.to_string());
            }
        }
        persistence::append_commit(&attribution)?;
        if let Some(session) = state.sessions.get(session_id).cloned() {
            persistence::append_session(&session)?;
        }
        Ok(attribution)
    }

    /// Parse a Bash tool's post-event response for a commit hash and, if
    /// found, record it.
    pub fn try_record_commit_from_bash_output(
        &self,
        session_id: &str,
        repo_path: &str,
        output: &str,
    ) -> Result<Option<CommitAttribution>> {
        match commit::extract_commit(output) {
            Some(parsed) => Ok(Some(self.record_commit(session_id, &parsed.hash, &parsed.message, repo_path)?)),
            None => Ok(None),
        }
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.state.lock().unwrap().sessions.get(id).cloned()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.state.lock().unwrap().sessions.values().cloned().collect()
    }

    pub fn tool_usages_for_session(&self, session_id: &str) -> Vec<ToolUsage> {
        self.state
            .lock()
            .unwrap()
            .completed_usages
            .iter()
            .filter(|u| u.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn tool_stats(&self) -> Vec<ToolStats> {
        self.state.lock().unwrap().tool_stats.values().cloned().collect()
    }

    pub fn daily_stats(&self) -> Vec<DailyStats> {
        self.state.lock().unwrap().daily_stats.values().cloned().collect()
    }

    /// Dead-session reconciliation, invoked periodically by the process
    /// scanner.
    pub fn reconcile_dead_sessions(&self, live_agents: &HashMap<u32, (String, String)>) -> Result<Vec<String>> {
        let now = chrono::Utc::now();
        let mut closed = Vec::new();
        let mut to_persist = Vec::new();

        {
            let mut state = self.state.lock().unwrap();
            for session in state.sessions.values_mut() {
                if !session.active() {
                    continue;
                }
                let should_close = match session.bound_pid {
                    Some(pid) => !live_agents.contains_key(&pid),
                    None => {
                        let inactive = now - session.last_activity;
                        if inactive > DEAD_PROCESS_GRACE {
                            true
                        } else if inactive > STALENESS_DEFAULT {
                            !live_agents.values().any(|(cwd, _)| *cwd == session.cwd)
                        } else {
                            false
                        }
                    }
                };
                if should_close {
                    session.end_time = Some(now);
                    closed.push(session.id.clone());
                    to_persist.push(session.clone());
                }
            }
        }

        for session in &to_persist {
            persistence::append_session(session)?;
        }
        if !closed.is_empty() {
            self.notify(HookChange::Session);
        }
        Ok(closed)
    }

    /// Bind PIDs to sessions when a unique cwd/label match exists. Once
    /// bound, a session stays bound until it ends.
    pub fn match_sessions_to_agents(&self, live_agents: &HashMap<u32, (String, String)>) {
        let mut state = self.state.lock().unwrap();
        for session in state.sessions.values_mut() {
            if !session.active() || session.bound_pid.is_some() {
                continue;
            }
            let matches: Vec<u32> = live_agents
                .iter()
                .filter(|(_, (cwd, _))| *cwd == session.cwd)
                .map(|(pid, _)| *pid)
                .collect();
            if matches.len() == 1 {
                session.bound_pid = Some(matches[0]);
            }
        }
    }

    /// Evict tool usages older than the rolling window / over the hard cap,
    /// and sessions older than the retention window.
    pub fn run_cleanup(&self) {
        let mut state = self.state.lock().unwrap();
        cleanup_usages(&mut state.completed_usages);
        let cutoff = chrono::Utc::now() - chrono::Duration::days(SESSION_RETENTION_DAYS);
        state.sessions.retain(|_, s| s.last_activity >= cutoff || s.active());
    }
}

fn cleanup_usages(usages: &mut Vec<ToolUsage>) {
    let cutoff = chrono::Utc::now() - chrono::Duration::hours(TOOL_USAGE_WINDOW_HOURS);
    usages.retain(|u| u.timestamp >= cutoff);
    if usages.len() > MAX_TOOL_USAGES {
        usages.sort_by_key(|u| u.timestamp);
        let excess = usages.len() - MAX_TOOL_USAGES;
        usages.drain(0..excess);
    }
}

#[allow(dead_code)]
fn permission_mode_label(mode: &PermissionMode) -> &'static str {
    match mode {
        PermissionMode::Default => "default",
        PermissionMode::AcceptEdits => "accept_edits",
        PermissionMode::BypassPermissions => "bypass_permissions",
        PermissionMode::Plan => "plan",
        PermissionMode::Other(_) => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn with_temp_home<T>(f: impl FnOnce() -> T) -> T {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("AGENTWATCH_HOME", dir.path());
        INIT.call_once(|| {});
        f()
    }

    #[test]
    fn session_start_is_idempotent_on_daily_count() {
        with_temp_home(|| {
            let store = HookStore::load().unwrap();
            store.session_start("s1", None, "/p", None, SessionSource::Startup).unwrap();
            store.session_start("s1", None, "/p2", None, SessionSource::Resume).unwrap();
            let daily: Vec<_> = store.daily_stats();
            let total: u64 = daily.iter().map(|d| d.session_count).sum();
            assert_eq!(total, 1);
            assert_eq!(store.session("s1").unwrap().cwd, "/p2");
        });
    }

    #[test]
    fn post_tool_use_with_no_pending_returns_none() {
        with_temp_home(|| {
            let store = HookStore::load().unwrap();
            let result = store.record_post_tool_use("missing", None, None).unwrap();
            assert!(result.is_none());
        });
    }

    #[test]
    fn pre_then_post_completes_usage_and_updates_stats() {
        with_temp_home(|| {
            let store = HookStore::load().unwrap();
            store.session_start("s1", None, "/p", None, SessionSource::Startup).unwrap();
            store.record_pre_tool_use("s1", "t1", "Read", serde_json::json!({}), "/p");
            let usage = store.record_post_tool_use("t1", Some(serde_json::json!({"ok": true})), None).unwrap();
            assert!(usage.is_some());
            assert!(usage.unwrap().success());
            assert_eq!(store.session("s1").unwrap().tool_call_count, 1);
        });
    }

    #[test]
    fn security_block_produces_failed_usage_with_prefix() {
        with_temp_home(|| {
            let store = HookStore::load().unwrap();
            let usage = store
                .record_security_block("s1", "Bash", serde_json::json!({}), Some("no-rm"), Some("dangerous"))
                .unwrap();
            assert!(usage.is_security_block());
            assert!(!usage.success());
            assert!(usage.error.unwrap().starts_with("SECURITY_BLOCKED:"));
        });
    }

    #[test]
    fn commit_accumulates_on_session_once() {
        with_temp_home(|| {
            let store = HookStore::load().unwrap();
            store.session_start("s1", None, "/p", None, SessionSource::Startup).unwrap();
            store.record_commit("s1", "abc123", "msg", "/p").unwrap();
            store.record_commit("s1", "abc123", "msg", "/p").unwrap();
            assert_eq!(store.session("s1").unwrap().commits.len(), 1);
        });
    }

    #[test]
    fn dead_session_closed_when_bound_pid_not_live() {
        with_temp_home(|| {
            let store = HookStore::load().unwrap();
            store.session_start("s1", None, "/p", None, SessionSource::Startup).unwrap();
            {
                let mut state = store.state.lock().unwrap();
                state.sessions.get_mut("s1").unwrap().bound_pid = Some(999);
            }
            let closed = store.reconcile_dead_sessions(&HashMap::new()).unwrap();
            assert_eq!(closed, vec!["s1".to_string()]);
            assert!(!store.session("s1").unwrap().active());
        });
    }

    #[test]
    fn match_sessions_to_agents_binds_unique_cwd_match() {
        with_temp_home(|| {
            let store = HookStore::load().unwrap();
            store.session_start("s1", None, "/proj", None, SessionSource::Startup).unwrap();
            let mut agents = HashMap::new();
            agents.insert(42u32, ("/proj".to_string(), "claude".to_string()));
            store.match_sessions_to_agents(&agents);
            assert_eq!(store.session("s1").unwrap().bound_pid, Some(42));
        });
    }
}
