//! Keyed enrichment store.
//!
//! One JSON blob (`enrichments/store.json`) holding every session's
//! `EnrichmentRecord`, keyed by `SessionRef::canonical_key`. Mirrors
//! `hooks::persistence`'s stats.json pattern, built on the keyed JSON store.
//! Also owns the per-session diff baselines captured at session start and
//! consumed by the pipeline at session end, since both live for the
//! lifetime of the daemon process rather than being persisted.

use super::pipeline::{self, DiffBaselines};
use crate::errors::Result;
use crate::jsonstore;
use crate::models::{EnrichmentRecord, Session, SessionRef, ToolUsage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

fn enrichments_dir() -> std::path::PathBuf {
    crate::paths::base_dir().join("enrichments")
}

pub struct EnrichmentStore {
    records: Mutex<HashMap<String, EnrichmentRecord>>,
    baselines: Mutex<DiffBaselines>,
}

/// Derive the canonical key a hook-driven session enriches under. Hook
/// events carry no separate correlation id, so the hook session id stands
/// in for it, with the transcript path as a fallback.
fn session_ref_key(session: &Session) -> Option<String> {
    SessionRef {
        correlation_id: None,
        hook_session_id: Some(session.id.clone()),
        transcript_id: session.transcript_path.clone(),
    }
    .canonical_key()
}

impl EnrichmentStore {
    pub fn load() -> Result<Self> {
        let records = jsonstore::load(&enrichments_dir(), "store")?.unwrap_or_default();
        Ok(EnrichmentStore {
            records: Mutex::new(records),
            baselines: Mutex::new(DiffBaselines::new()),
        })
    }

    pub fn get(&self, key: &str) -> Option<EnrichmentRecord> {
        self.records.lock().unwrap().get(key).cloned()
    }

    pub fn all(&self) -> Vec<EnrichmentRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    fn upsert(&self, key: String, record: EnrichmentRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.insert(key, record);
        jsonstore::save(&enrichments_dir(), "store", &*records)
    }

    /// Record the session's starting commit at session start, so the diff
    /// snapshot stage has something to diff against when the session ends.
    /// The `git` call runs against a scratch `DiffBaselines`, with the
    /// shared map locked only for the plain insert that follows — never
    /// across an `.await`, which would otherwise let one session's capture
    /// clobber another's concurrently in-flight one.
    pub async fn capture_baseline(&self, session_id: &str, repo_path: &Path) {
        let mut scratch = DiffBaselines::new();
        scratch.capture(session_id, repo_path).await;
        if let Some(commit) = scratch.take(session_id) {
            self.baselines.lock().unwrap().set(session_id, commit);
        }
    }

    /// Run the pipeline for an ended session and persist the result, keyed
    /// by the session's canonical ref. Returns `None` if no key could be
    /// derived (both the hook id and the transcript path are absent).
    ///
    /// The session's baseline is lifted out of the shared map into a
    /// single-entry scratch `DiffBaselines` before the pipeline runs, so
    /// other sessions' concurrent `capture_baseline`/`run_and_store` calls
    /// never contend on it across the pipeline's `.await` points.
    pub async fn run_and_store(
        &self,
        session: &Session,
        usages: &[ToolUsage],
    ) -> Result<Option<EnrichmentRecord>> {
        let Some(key) = session_ref_key(session) else { return Ok(None) };
        let repo_path = std::path::PathBuf::from(&session.cwd);

        let baseline = self.baselines.lock().unwrap().take(&session.id);
        let mut scratch = DiffBaselines::new();
        if let Some(commit) = baseline {
            scratch.set(&session.id, commit);
        }
        let record = pipeline::enrich_session(session, usages, &repo_path, &mut scratch, key.clone()).await;

        self.upsert(key, record.clone())?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionSource;

    fn base_session() -> Session {
        Session::new("s1", None, "/tmp", None, SessionSource::Startup, chrono::Utc::now())
    }

    #[tokio::test]
    async fn run_and_store_persists_under_canonical_key() {
        std::env::set_var("AGENTWATCH_HOME", tempfile::tempdir().unwrap().path());
        let store = EnrichmentStore::load().unwrap();
        let session = base_session();
        let record = store.run_and_store(&session, &[]).await.unwrap().unwrap();
        assert_eq!(record.session_ref_key, "corr:s1");
        assert_eq!(store.get("corr:s1").unwrap().session_ref_key, "corr:s1");

        let reloaded = EnrichmentStore::load().unwrap();
        assert_eq!(reloaded.all().len(), 1);
    }
}
