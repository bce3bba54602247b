//! Repo scanner.
//!
//! Two-rhythm scanning over configured roots: a cheap fast pass refreshes
//! status counts for already-known repos, a slow pass walks the roots for
//! new repos and refreshes upstream ahead/behind. Built directly on
//! `git.rs`'s subprocess helpers.

use crate::git;
use crate::models::{RepoFlags, RepoHealth, RepoSnapshot, UpstreamInfo};
use std::path::{Path, PathBuf};

pub struct RepoScannerConfig {
    pub roots: Vec<PathBuf>,
    pub ignore_dirs: Vec<String>,
    pub fetch_policy: FetchPolicy,
    pub max_walk_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    Off,
    Auto,
}

impl Default for RepoScannerConfig {
    fn default() -> Self {
        RepoScannerConfig {
            roots: Vec::new(),
            ignore_dirs: vec!["node_modules".into(), "target".into(), ".git".into()],
            fetch_policy: FetchPolicy::Off,
            max_walk_depth: 4,
        }
    }
}

/// Discover repo roots under `config.roots` by walking for `.git` entries,
/// bounded to `max_walk_depth`.
pub fn discover_repos(config: &RepoScannerConfig) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for root in &config.roots {
        walk(root, config.max_walk_depth, &config.ignore_dirs, &mut found);
    }
    found
}

fn walk(dir: &Path, depth_left: usize, ignore: &[String], found: &mut Vec<PathBuf>) {
    if dir.join(".git").exists() {
        found.push(dir.to_path_buf());
        return; // don't descend into nested repos
    }
    if depth_left == 0 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if ignore.iter().any(|i| i == name.as_ref()) {
            continue;
        }
        walk(&path, depth_left - 1, ignore, found);
    }
}

/// Fast pass: re-read status counts and special-state flags for one
/// already-known repo. Cheap, runs every tick.
pub async fn fast_scan(path: &Path, existing: Option<&RepoSnapshot>) -> RepoSnapshot {
    let id = RepoSnapshot::stable_id(&path.to_string_lossy());
    let now = chrono::Utc::now();

    let status = git::status_in(path).await;
    let (staged, unstaged, untracked, branch, conflict) = match &status {
        Some(s) => (s.staged, s.unstaged, s.untracked, s.branch.clone(), s.conflict),
        None => (0, 0, 0, None, false),
    };

    let special = git::special_state_flags(&path.join(".git")).await;
    let flags = RepoFlags { conflict, ..special };

    let health = RepoHealth {
        last_error: if status.is_none() { Some("git status failed or timed out".into()) } else { None },
        timed_out: status.is_none(),
    };

    RepoSnapshot {
        id,
        path: path.to_string_lossy().to_string(),
        name: existing.map(|r| r.name.clone()).unwrap_or_else(|| {
            path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
        }),
        branch,
        staged,
        unstaged,
        untracked,
        flags,
        upstream: existing.and_then(|r| r.upstream.clone()),
        health,
        remote_url: existing.and_then(|r| r.remote_url.clone()),
        last_scan: now,
        last_change: existing.map(|r| r.last_change).unwrap_or(now),
    }
}

/// Slow pass: refresh upstream ahead/behind (may fetch under `FetchPolicy::Auto`)
/// and the remote-derived display name. Expensive, runs less often.
pub async fn slow_scan(path: &Path, snapshot: &mut RepoSnapshot, fetch_policy: FetchPolicy) {
    if fetch_policy == FetchPolicy::Auto {
        let _ = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            tokio::process::Command::new("git").arg("fetch").arg("--quiet").current_dir(path).output(),
        )
        .await;
    }

    if let Some(status) = git::status_in(path).await {
        snapshot.upstream = status.upstream.map(|tracking| UpstreamInfo {
            tracking: Some(tracking),
            ahead: status.ahead,
            behind: status.behind,
        });
    }

    if let Some(url) = git::remote_url_in(path).await {
        snapshot.remote_url = Some(url);
    }
    if let Some(name) = git::name_in(path).await {
        snapshot.name = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_repos_finds_git_dir_and_skips_nested() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("proj");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        std::fs::create_dir_all(repo.join("vendor/nested/.git")).unwrap();

        let config = RepoScannerConfig { roots: vec![dir.path().to_path_buf()], ..Default::default() };
        let found = discover_repos(&config);
        assert_eq!(found, vec![repo]);
    }

    #[test]
    fn discover_repos_skips_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg/.git")).unwrap();

        let config = RepoScannerConfig { roots: vec![dir.path().to_path_buf()], ..Default::default() };
        let found = discover_repos(&config);
        assert!(found.is_empty());
    }
}
