use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionSource {
    Startup,
    Resume,
    Compact,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
    Other(String),
}

/// Keyed by session id (a string minted by the external agent host).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub transcript_path: Option<String>,
    pub cwd: String,
    pub permission_mode: Option<String>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub source: SessionSource,
    pub tool_call_count: u64,
    pub awaiting_user: bool,
    pub tools_used: HashMap<String, u64>,
    pub commits: Vec<String>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub auto_continue_attempts: u32,
    pub bound_pid: Option<u32>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        transcript_path: Option<String>,
        cwd: impl Into<String>,
        permission_mode: Option<String>,
        source: SessionSource,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Session {
            id: id.into(),
            transcript_path,
            cwd: cwd.into(),
            permission_mode,
            start_time: now,
            end_time: None,
            source,
            tool_call_count: 0,
            awaiting_user: false,
            tools_used: HashMap::new(),
            commits: Vec::new(),
            total_input_tokens: 0,
            total_output_tokens: 0,
            estimated_cost_usd: 0.0,
            auto_continue_attempts: 0,
            bound_pid: None,
            last_activity: now,
        }
    }

    /// `end_time = ∅ ⇒ active = true`.
    pub fn active(&self) -> bool {
        self.end_time.is_none()
    }

    /// `tool_count = Σ tools_used`.
    pub fn recompute_tool_call_count(&mut self) {
        self.tool_call_count = self.tools_used.values().sum();
    }
}

/// Keyed by a tool-use id minted by the host agent on PreToolUse, or a
/// synthesized `sess-id#timestamp` if absent.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolUsage {
    pub tool_use_id: String,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub session_id: String,
    pub cwd: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub tool_response: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub input_size_bytes: Option<u64>,
}

impl ToolUsage {
    /// `success = (error = ∅)`. Pending (not yet completed by a
    /// PostToolUse) usages are not yet "successful" in any meaningful
    /// sense; callers should check `is_complete()` first.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.duration_ms.is_some()
    }

    /// A synthetic security-block usage (`tool-use id =
    /// "blocked-<ts>-<name>"`, `success = false`).
    pub fn is_security_block(&self) -> bool {
        self.tool_use_id.starts_with("blocked-")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ToolStats {
    pub tool_name: String,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_duration_ms: f64,
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

impl ToolStats {
    /// Running-average update: `avg' = avg + (duration - avg)/n` where `n`
    /// is the total call count after this increment. Don't reorder this
    /// arithmetic — it keeps numerical stability for small integer
    /// durations.
    pub fn record(&mut self, duration_ms: u64, success: bool, at: chrono::DateTime<chrono::Utc>) {
        self.total_calls += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        let n = self.total_calls as f64;
        self.avg_duration_ms += (duration_ms as f64 - self.avg_duration_ms) / n;
        self.last_used = Some(at);
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DailyStats {
    pub date: String,
    pub session_count: u64,
    pub tool_call_count: u64,
    pub per_tool: HashMap<String, u64>,
    pub active_minutes: u64,
}

/// Keyed by commit hash.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CommitAttribution {
    pub hash: String,
    pub session_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message: String,
    pub repo_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_active_iff_end_time_absent() {
        let mut s = Session::new("s1", None, "/p", None, SessionSource::Startup, chrono::Utc::now());
        assert!(s.active());
        s.end_time = Some(chrono::Utc::now());
        assert!(!s.active());
    }

    #[test]
    fn tool_call_count_matches_sum_of_tools_used() {
        let mut s = Session::new("s1", None, "/p", None, SessionSource::Startup, chrono::Utc::now());
        s.tools_used.insert("Read".into(), 3);
        s.tools_used.insert("Bash".into(), 2);
        s.recompute_tool_call_count();
        assert_eq!(s.tool_call_count, 5);
    }

    #[test]
    fn tool_usage_success_iff_no_error() {
        let mut u = ToolUsage {
            tool_use_id: "t1".into(),
            tool_name: "Read".into(),
            tool_input: serde_json::json!({}),
            session_id: "s1".into(),
            cwd: "/p".into(),
            timestamp: chrono::Utc::now(),
            tool_response: None,
            error: None,
            duration_ms: Some(5),
            input_size_bytes: None,
        };
        assert!(u.success());
        u.error = Some("boom".into());
        assert!(!u.success());
    }

    #[test]
    fn security_block_id_prefix_detected() {
        let u = ToolUsage {
            tool_use_id: "blocked-123-Bash".into(),
            tool_name: "Bash".into(),
            tool_input: serde_json::json!({}),
            session_id: "s1".into(),
            cwd: "/p".into(),
            timestamp: chrono::Utc::now(),
            tool_response: None,
            error: Some("SECURITY_BLOCKED: x".into()),
            duration_ms: Some(0),
            input_size_bytes: None,
        };
        assert!(u.is_security_block());
    }

    #[test]
    fn tool_stats_running_average_matches_closed_form() {
        let mut stats = ToolStats::default();
        let now = chrono::Utc::now();
        stats.record(100, true, now);
        stats.record(200, true, now);
        stats.record(300, false, now);
        // mean of 100, 200, 300 = 200
        assert!((stats.avg_duration_ms - 200.0).abs() < 1e-9);
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
    }
}
