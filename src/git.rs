//! Subprocess git helpers used by the repo scanner and the enrichment
//! pipeline's diff snapshot. Shell out, trim stdout, `None` on any non-zero
//! exit, with an explicit timeout so a hung worktree (network mount, huge
//! index) can't stall a scan cycle indefinitely.

use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DIFF_TIMEOUT: Duration = Duration::from_secs(10);

async fn git_with_timeout(args: &[&str], dir: &Path, budget: Duration) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    let output = timeout(budget, cmd.output()).await.ok()?.ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    } else {
        None
    }
}

async fn git_in(args: &[&str], dir: &Path) -> Option<String> {
    git_with_timeout(args, dir, DEFAULT_TIMEOUT).await
}

pub async fn root_in(dir: &Path) -> Option<String> {
    git_in(&["rev-parse", "--show-toplevel"], dir).await
}

pub async fn name_in(dir: &Path) -> Option<String> {
    let remote = git_in(&["remote", "get-url", "origin"], dir).await?;
    remote
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit('/')
        .next()
        .map(str::to_string)
}

pub async fn remote_url_in(dir: &Path) -> Option<String> {
    git_in(&["remote", "get-url", "origin"], dir).await
}

pub async fn commit_in(dir: &Path) -> Option<String> {
    git_in(&["rev-parse", "--short", "HEAD"], dir).await
}

/// Parsed `git status --porcelain=v2 --branch` output: staged/unstaged/
/// untracked counts plus branch and upstream tracking info, in one
/// subprocess call rather than several.
#[derive(Debug, Default, Clone)]
pub struct StatusSummary {
    pub branch: Option<String>,
    pub staged: u32,
    pub unstaged: u32,
    pub untracked: u32,
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub conflict: bool,
}

pub async fn status_in(dir: &Path) -> Option<StatusSummary> {
    let raw = git_in(&["status", "--porcelain=v2", "--branch"], dir).await?;
    let mut summary = StatusSummary::default();
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("# branch.head ") {
            if rest != "(detached)" {
                summary.branch = Some(rest.to_string());
            }
        } else if let Some(rest) = line.strip_prefix("# branch.upstream ") {
            summary.upstream = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("# branch.ab ") {
            // format: "+<ahead> -<behind>"
            let mut parts = rest.split_whitespace();
            if let Some(a) = parts.next().and_then(|s| s.strip_prefix('+')) {
                summary.ahead = a.parse().unwrap_or(0);
            }
            if let Some(b) = parts.next().and_then(|s| s.strip_prefix('-')) {
                summary.behind = b.parse().unwrap_or(0);
            }
        } else if line.starts_with("1 ") || line.starts_with("2 ") {
            // ordinary/renamed change line: "<kind> <xy> ..."
            let xy = line.split_whitespace().nth(1).unwrap_or("..");
            let mut chars = xy.chars();
            let x = chars.next().unwrap_or('.');
            let y = chars.next().unwrap_or('.');
            if x != '.' {
                summary.staged += 1;
            }
            if y != '.' {
                summary.unstaged += 1;
            }
        } else if line.starts_with("? ") {
            summary.untracked += 1;
        } else if line.starts_with("u ") {
            summary.conflict = true;
            summary.unstaged += 1;
        }
    }
    Some(summary)
}

/// True if `.git/<name>` (or `.git/name` for the sequencer dirs) marks an
/// in-progress special state. Checked on the filesystem rather than via
/// git itself, since there's no single porcelain flag for these.
pub async fn special_state_flags(git_dir: &Path) -> crate::models::RepoFlags {
    let exists = |p: &str| git_dir.join(p).exists();
    crate::models::RepoFlags {
        conflict: false,
        rebase: exists("rebase-merge") || exists("rebase-apply"),
        merge: exists("MERGE_HEAD"),
        cherry_pick: exists("CHERRY_PICK_HEAD"),
        revert: exists("REVERT_HEAD"),
    }
}

/// Diff stats between `base` (a commit-ish, e.g. a session's starting
/// commit) and the current worktree, plus the current uncommitted diff.
/// Used by the enrichment pipeline's diff snapshot.
pub async fn diff_numstat(dir: &Path, base: Option<&str>) -> Vec<(String, u64, u64)> {
    let args: Vec<&str> = match base {
        Some(b) => vec!["diff", "--numstat", b],
        None => vec!["diff", "--numstat"],
    };
    let Some(raw) = git_with_timeout(&args, dir, DIFF_TIMEOUT).await else {
        return Vec::new();
    };
    raw.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let ins = parts.next()?.parse().ok()?;
            let del = parts.next()?.parse().ok()?;
            let path = parts.next()?.to_string();
            Some((path, ins, del))
        })
        .collect()
}

pub async fn commit_count_since(dir: &Path, since: &str) -> u64 {
    let args = ["rev-list", "--count", &format!("{since}..HEAD")];
    git_with_timeout(&args, dir, DEFAULT_TIMEOUT)
        .await
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
