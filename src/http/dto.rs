//! snake_case response DTOs.
//!
//! Internal records already serialize snake_case, but several responses add
//! derived fields (`dirty`, `active`, `success_rate`, `commit_count`) that
//! don't live on the stored struct. Kept as an explicit mapping layer rather
//! than sprinkling `#[serde(skip)]` getters onto the model types.

use crate::models::{AgentProcess, DailyStats, ListeningPort, RepoSnapshot, Session, ToolStats, ToolUsage};
use serde::Serialize;

#[derive(Serialize)]
pub struct RepoDto {
    #[serde(flatten)]
    pub repo: RepoSnapshot,
    pub dirty: bool,
}

impl From<RepoSnapshot> for RepoDto {
    fn from(repo: RepoSnapshot) -> Self {
        let dirty = repo.dirty();
        RepoDto { repo, dirty }
    }
}

#[derive(Serialize)]
pub struct SessionDto {
    #[serde(flatten)]
    pub session: Session,
    pub active: bool,
    pub commit_count: usize,
}

impl From<Session> for SessionDto {
    fn from(session: Session) -> Self {
        let active = session.active();
        let commit_count = session.commits.len();
        SessionDto { session, active, commit_count }
    }
}

#[derive(Serialize)]
pub struct ToolStatsDto {
    #[serde(flatten)]
    pub stats: ToolStats,
    pub success_rate: f64,
}

impl From<ToolStats> for ToolStatsDto {
    fn from(stats: ToolStats) -> Self {
        let success_rate = if stats.total_calls == 0 {
            0.0
        } else {
            stats.success_count as f64 / stats.total_calls as f64
        };
        ToolStatsDto { stats, success_rate }
    }
}

#[derive(Serialize)]
pub struct SnapshotDto {
    pub agents: Vec<AgentProcess>,
    pub repos: Vec<RepoDto>,
    pub ports: Vec<ListeningPort>,
}

#[derive(Serialize)]
pub struct SessionDetailDto {
    #[serde(flatten)]
    pub session: SessionDto,
    pub tool_usages: Vec<ToolUsage>,
}

#[derive(Serialize)]
pub struct StatsDto {
    pub tool_stats: Vec<ToolStatsDto>,
    pub daily_stats: Vec<DailyStats>,
}

#[derive(Serialize)]
pub struct ErrorDto {
    pub error: String,
}

#[derive(Serialize)]
pub struct HookResultDto {
    pub result: &'static str,
}

impl Default for HookResultDto {
    fn default() -> Self {
        HookResultDto { result: "continue" }
    }
}
