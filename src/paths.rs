//! Path & storage primitives.
//!
//! Home-relative path expansion, lazy directory creation, atomic file
//! writes, and date-partitioned filename derivation.

use crate::errors::{AgentWatchError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

/// Expand a leading `~` to the user's home directory. Any other path is
/// returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        let home = home_dir();
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        return home.join(rest);
    }
    PathBuf::from(path)
}

pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// `~/.agentwatch`, overridable via `AGENTWATCH_HOME`.
pub fn base_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AGENTWATCH_HOME") {
        return expand_home(&dir);
    }
    home_dir().join(".agentwatch")
}

/// Create the on-disk directory layout the daemon expects. Idempotent.
pub fn ensure_dirs() -> Result<()> {
    for sub in ["hooks", "processes", "transcripts", "enrichments"] {
        let dir = base_dir().join(sub);
        fs::create_dir_all(&dir).map_err(|e| AgentWatchError::io_fatal(&dir, e))?;
    }
    Ok(())
}

/// Create the parent directory of `path` if it doesn't already exist.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| AgentWatchError::io_fatal(parent, e))?;
        }
    }
    Ok(())
}

/// Write `contents` atomically: write to a sibling temp file carrying the
/// current process id, then rename over the target. Rename is atomic on the
/// same filesystem, so readers never observe a partially-written file.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let pid = process::id();
    let tmp_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => format!(".{name}.{pid}.tmp"),
        None => format!(".agentwatch.{pid}.tmp"),
    };
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents).map_err(|e| AgentWatchError::io_fatal(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| AgentWatchError::io_fatal(path, e))?;
    Ok(())
}

/// Substitute `date` (YYYY-MM-DD) for the single `*` in `pattern`.
///
/// `pattern` must contain exactly one `*`; anything else is a programming
/// error since partition patterns are all compiled into the binary.
pub fn partition_path(pattern: &str, date: &str) -> PathBuf {
    debug_assert_eq!(pattern.matches('*').count(), 1, "pattern must have one '*'");
    PathBuf::from(pattern.replacen('*', date, 1))
}

/// Today's date in the local timezone, formatted YYYY-MM-DD.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_substitutes_tilde() {
        let expanded = expand_home("~/foo/bar");
        assert!(expanded.starts_with(home_dir()));
        assert!(expanded.ends_with("foo/bar"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/foo"), PathBuf::from("/tmp/foo"));
    }

    #[test]
    fn partition_path_substitutes_date() {
        let p = partition_path("/tmp/hooks/sessions_*.jsonl", "2026-07-28");
        assert_eq!(p, PathBuf::from("/tmp/hooks/sessions_2026-07-28.jsonl"));
    }

    #[test]
    fn atomic_write_creates_parent_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.txt");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn atomic_write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }
}
