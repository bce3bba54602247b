//! Persistence layout for the hook store. Date-partitioned JSONL for
//! mutation logs, a single keyed JSON blob for aggregate stats. Built on
//! the record-log engine and keyed JSON store.

use crate::models::{CommitAttribution, DailyStats, Session, ToolStats, ToolUsage};
use crate::recordlog::{self, RangeQuery};
use crate::{errors::Result, paths};
use std::collections::HashMap;
use std::path::PathBuf;

fn hooks_dir() -> PathBuf {
    paths::base_dir().join("hooks")
}

fn sessions_pattern() -> String {
    hooks_dir().join("sessions_*.jsonl").to_string_lossy().to_string()
}

fn tool_usages_pattern() -> String {
    hooks_dir().join("tool_usages_*.jsonl").to_string_lossy().to_string()
}

fn commits_pattern() -> String {
    hooks_dir().join("commits_*.jsonl").to_string_lossy().to_string()
}

fn legacy_sessions_path() -> PathBuf {
    hooks_dir().join("sessions.jsonl")
}

fn legacy_tool_usages_path() -> PathBuf {
    hooks_dir().join("tool_usages.jsonl")
}

fn legacy_commits_path() -> PathBuf {
    hooks_dir().join("commits.jsonl")
}

pub fn append_session(session: &Session) -> Result<()> {
    recordlog::append_to_partition(&sessions_pattern(), session, None)
}

pub fn append_tool_usage(usage: &ToolUsage) -> Result<()> {
    recordlog::append_to_partition(&tool_usages_pattern(), usage, None)
}

pub fn append_commit(commit: &CommitAttribution) -> Result<()> {
    recordlog::append_to_partition(&commits_pattern(), commit, None)
}

/// Load the last 24h of session mutations plus any legacy non-partitioned
/// file, reconstructing final state per id (last write wins).
pub fn load_recent_sessions() -> Result<HashMap<String, Session>> {
    let since = (chrono::Utc::now() - chrono::Duration::hours(24))
        .format("%Y-%m-%d")
        .to_string();
    let mut records: Vec<Session> = recordlog::read_range(
        &sessions_pattern(),
        &RangeQuery { start: Some(&since), end: None, limit: None },
    )?;
    records.extend(recordlog::read_all::<Session>(&legacy_sessions_path())?);

    let mut by_id: HashMap<String, Session> = HashMap::new();
    // records come back newest-partition-first; within a file, oldest line
    // first, so iterate in reverse to apply "last occurrence wins" forward
    for session in records.into_iter().rev() {
        by_id.insert(session.id.clone(), session);
    }
    Ok(by_id)
}

pub fn load_recent_tool_usages() -> Result<Vec<ToolUsage>> {
    let since = (chrono::Utc::now() - chrono::Duration::hours(24))
        .format("%Y-%m-%d")
        .to_string();
    let mut records: Vec<ToolUsage> = recordlog::read_range(
        &tool_usages_pattern(),
        &RangeQuery { start: Some(&since), end: None, limit: None },
    )?;
    records.extend(recordlog::read_all::<ToolUsage>(&legacy_tool_usages_path())?);
    Ok(records)
}

pub fn load_recent_commits() -> Result<Vec<CommitAttribution>> {
    let since = (chrono::Utc::now() - chrono::Duration::hours(24))
        .format("%Y-%m-%d")
        .to_string();
    let mut records: Vec<CommitAttribution> = recordlog::read_range(
        &commits_pattern(),
        &RangeQuery { start: Some(&since), end: None, limit: None },
    )?;
    records.extend(recordlog::read_all::<CommitAttribution>(&legacy_commits_path())?);
    Ok(records)
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
pub struct StatsBlob {
    #[serde(alias = "perTool", alias = "PerTool")]
    pub per_tool: HashMap<String, ToolStats>,
    #[serde(alias = "perDay", alias = "PerDay")]
    pub per_day: HashMap<String, DailyStats>,
}

fn stats_dir() -> PathBuf {
    paths::base_dir().join("hooks")
}

/// Tolerant of both camelCase and PascalCase keys on load.
pub fn load_stats() -> Result<StatsBlob> {
    Ok(crate::jsonstore::load(&stats_dir(), "stats")?.unwrap_or_default())
}

pub fn save_stats(stats: &StatsBlob) -> Result<()> {
    crate::jsonstore::save(&stats_dir(), "stats", stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_blob_defaults_to_empty_maps() {
        let blob = StatsBlob::default();
        assert!(blob.per_tool.is_empty());
        assert!(blob.per_day.is_empty());
    }
}
