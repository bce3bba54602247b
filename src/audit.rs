//! Audit timeline.
//!
//! Two mergeable modes: logged (every non-trivial core event appended to
//! `events.jsonl`) and inferred (synthesised on request by walking the
//! other log sources). Logged mode reuses the record-log engine.

use crate::errors::Result;
use crate::paths;
use crate::recordlog;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Session,
    Annotation,
    Enrichment,
    Export,
    Config,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub category: AuditCategory,
    pub action: String,
    pub entity_id: String,
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub inferred: bool,
}

fn events_path() -> PathBuf {
    paths::base_dir().join("events.jsonl")
}

fn legacy_audit_path() -> PathBuf {
    paths::base_dir().join("audit.jsonl")
}

/// Migrate the legacy `audit.jsonl` name to `events.jsonl` on first access.
fn migrate_legacy_name() -> Result<()> {
    let legacy = legacy_audit_path();
    let current = events_path();
    if legacy.exists() && !current.exists() {
        std::fs::rename(&legacy, &current)
            .map_err(|e| crate::errors::AgentWatchError::io_fatal(&current, e))?;
    }
    Ok(())
}

/// Append a non-trivial core event to the logged timeline.
pub fn log_event(category: AuditCategory, action: &str, entity_id: &str, detail: Option<serde_json::Value>) -> Result<()> {
    migrate_legacy_name()?;
    let event = AuditEvent {
        timestamp: chrono::Utc::now(),
        category,
        action: action.to_string(),
        entity_id: entity_id.to_string(),
        detail,
        inferred: false,
    };
    recordlog::append(&events_path(), &event)
}

pub struct TimelineQuery {
    pub limit: usize,
    pub offset: usize,
    pub category: Option<AuditCategory>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub include_inferred: bool,
}

pub struct TimelineResult {
    pub events: Vec<AuditEvent>,
    pub per_category: std::collections::HashMap<String, usize>,
    pub per_action: std::collections::HashMap<String, usize>,
    pub logged_count: usize,
    pub inferred_count: usize,
}

fn dedup_key(event: &AuditEvent) -> String {
    let ts_prefix: String = event.timestamp.to_rfc3339().chars().take(19).collect();
    format!("{ts_prefix}:{:?}:{}:{}", event.category, event.action, event.entity_id)
}

/// Load logged events, optionally synthesise inferred ones, merge with
/// logged winning on dedup-key tie, sort newest-first, and paginate.
pub fn get_complete_timeline(query: &TimelineQuery, inferred_source: Vec<AuditEvent>) -> Result<TimelineResult> {
    migrate_legacy_name()?;

    let mut logged: Vec<AuditEvent> = recordlog::read_all(&events_path())?;
    if let Some(cat) = &query.category {
        logged.retain(|e| &e.category == cat);
    }
    if let Some(since) = &query.since {
        logged.retain(|e| &e.timestamp.to_rfc3339()[..since.len().min(10)] >= since.as_str());
    }
    if let Some(until) = &query.until {
        logged.retain(|e| &e.timestamp.to_rfc3339()[..until.len().min(10)] <= until.as_str());
    }
    let logged_count = logged.len();

    let mut inferred = if query.include_inferred { inferred_source } else { Vec::new() };
    if let Some(cat) = &query.category {
        inferred.retain(|e| &e.category == cat);
    }
    let inferred_count = inferred.len();

    let mut by_key: std::collections::HashMap<String, AuditEvent> = std::collections::HashMap::new();
    for event in inferred {
        by_key.insert(dedup_key(&event), event);
    }
    for event in logged {
        // logged wins on tie
        by_key.insert(dedup_key(&event), event);
    }

    let mut merged: Vec<AuditEvent> = by_key.into_values().collect();
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut per_category = std::collections::HashMap::new();
    let mut per_action = std::collections::HashMap::new();
    for event in &merged {
        *per_category.entry(format!("{:?}", event.category)).or_insert(0) += 1;
        *per_action.entry(event.action.clone()).or_insert(0) += 1;
    }

    let paged: Vec<AuditEvent> = merged.into_iter().skip(query.offset).take(query.limit).collect();

    Ok(TimelineResult { events: paged, per_category, per_action, logged_count, inferred_count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_collapses_same_second_category_action_entity() {
        let ts = chrono::Utc::now();
        let a = AuditEvent { timestamp: ts, category: AuditCategory::Session, action: "start".into(), entity_id: "s1".into(), detail: None, inferred: false };
        let b = AuditEvent { timestamp: ts, category: AuditCategory::Session, action: "start".into(), entity_id: "s1".into(), detail: None, inferred: true };
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn get_complete_timeline_logged_wins_over_inferred_on_tie() {
        std::env::set_var("AGENTWATCH_HOME", tempfile::tempdir().unwrap().path());
        log_event(AuditCategory::Session, "start", "s1", None).unwrap();
        let logged_event = recordlog::read_all::<AuditEvent>(&events_path()).unwrap().remove(0);

        let mut inferred_clone = logged_event.clone();
        inferred_clone.inferred = true;
        inferred_clone.detail = Some(serde_json::json!({"note": "inferred version"}));

        let result = get_complete_timeline(
            &TimelineQuery { limit: 10, offset: 0, category: None, since: None, until: None, include_inferred: true },
            vec![inferred_clone],
        )
        .unwrap();

        assert_eq!(result.events.len(), 1);
        assert!(!result.events[0].inferred);
    }
}
