use serde::{Deserialize, Serialize};

/// Special git states a working copy can be in. At most a few are ever set
/// simultaneously (e.g. a rebase with conflicts).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepoFlags {
    #[serde(default)]
    pub conflict: bool,
    #[serde(default)]
    pub rebase: bool,
    #[serde(default)]
    pub merge: bool,
    #[serde(default)]
    pub cherry_pick: bool,
    #[serde(default)]
    pub revert: bool,
}

impl RepoFlags {
    pub fn any(&self) -> bool {
        self.conflict || self.rebase || self.merge || self.cherry_pick || self.revert
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamInfo {
    pub tracking: Option<String>,
    pub ahead: u32,
    pub behind: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoHealth {
    pub last_error: Option<String>,
    pub timed_out: bool,
}

/// Keyed by absolute path. A passive projection of on-disk git state,
/// refreshed by the repo scanner and otherwise read-only to every consumer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RepoSnapshot {
    pub id: String,
    pub path: String,
    pub name: String,
    pub branch: Option<String>,
    pub staged: u32,
    pub unstaged: u32,
    pub untracked: u32,
    pub flags: RepoFlags,
    pub upstream: Option<UpstreamInfo>,
    pub health: RepoHealth,
    pub remote_url: Option<String>,
    pub last_scan: chrono::DateTime<chrono::Utc>,
    pub last_change: chrono::DateTime<chrono::Utc>,
}

impl RepoSnapshot {
    /// `dirty ⇔ staged + unstaged + untracked > 0 ∨ any flag`.
    pub fn dirty(&self) -> bool {
        self.staged + self.unstaged + self.untracked > 0 || self.flags.any()
    }

    /// Stable id derived from the canonical path, so metadata joins across
    /// daemon restarts.
    pub fn stable_id(canonical_path: &str) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        canonical_path.hash(&mut hasher);
        format!("repo-{:016x}", hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_repo() -> RepoSnapshot {
        RepoSnapshot {
            id: RepoSnapshot::stable_id("/tmp/repo"),
            path: "/tmp/repo".into(),
            name: "repo".into(),
            branch: Some("main".into()),
            staged: 0,
            unstaged: 0,
            untracked: 0,
            flags: RepoFlags::default(),
            upstream: None,
            health: RepoHealth::default(),
            remote_url: None,
            last_scan: chrono::Utc::now(),
            last_change: chrono::Utc::now(),
        }
    }

    #[test]
    fn dirty_false_when_clean() {
        assert!(!base_repo().dirty());
    }

    #[test]
    fn dirty_true_when_untracked_present() {
        let mut r = base_repo();
        r.untracked = 1;
        assert!(r.dirty());
    }

    #[test]
    fn dirty_true_when_flag_set_with_zero_counts() {
        let mut r = base_repo();
        r.flags.rebase = true;
        assert!(r.dirty());
    }

    #[test]
    fn stable_id_is_deterministic() {
        assert_eq!(
            RepoSnapshot::stable_id("/tmp/repo"),
            RepoSnapshot::stable_id("/tmp/repo")
        );
        assert_ne!(
            RepoSnapshot::stable_id("/tmp/repo"),
            RepoSnapshot::stable_id("/tmp/other")
        );
    }
}
