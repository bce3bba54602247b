//! Record-log engine.
//!
//! Append-only, date-partitioned JSONL. A torn write only ever damages the
//! last line, so crash recovery is "read what parses, skip what doesn't" —
//! no separate recovery pass is needed. Follows the `ledger.rs` pattern
//! this crate is built from (atomic append under an `fs2` advisory lock,
//! rotate-and-cleanup loop), generalized from single-file size rotation to
//! date-partitioned age+count rotation.

use crate::errors::{AgentWatchError, Result};
use crate::paths;
use fs2::FileExt;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap())
}

/// Append one JSON-encoded record and a line terminator to `path`.
///
/// Crash-atomic at line granularity: callers don't flush beyond what the OS
/// buffers, since logs are small and sequential.
pub fn append(path: &Path, record: &impl Serialize) -> Result<()> {
    paths::ensure_parent(path)?;

    let mut line = serde_json::to_string(record)
        .map_err(|e| AgentWatchError::Internal(format!("serializing record: {e}")))?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AgentWatchError::io_fatal(path, e))?;

    file.lock_exclusive()
        .map_err(|e| AgentWatchError::io_fatal(path, e))?;
    let result = file.write_all(line.as_bytes());
    let _ = file.unlock();
    result.map_err(|e| AgentWatchError::io_fatal(path, e))?;

    Ok(())
}

/// Derive the partition file name from `pattern` and `date` (or today if
/// `date` is `None`), then append.
pub fn append_to_partition(
    pattern: &str,
    record: &impl Serialize,
    date: Option<&str>,
) -> Result<()> {
    let date = date.map(str::to_string).unwrap_or_else(paths::today);
    let path = paths::partition_path(pattern, &date);
    append(&path, record)
}

/// Stream records from `path` line by line. Lines that fail to decode are
/// skipped silently — a corrupt line never halts reading.
pub fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AgentWatchError::io_fatal(path, e)),
    };

    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<T>(trimmed) {
            out.push(record);
        }
        // malformed lines are skipped silently
    }
    Ok(out)
}

pub struct RangeQuery<'a> {
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub limit: Option<usize>,
}

/// Enumerate files matching `pattern`'s directory and stem whose embedded
/// `\d{4}-\d{2}-\d{2}` date lies in `[start, end]`, sorted descending by
/// embedded date, reading until `limit` records have been collected.
pub fn read_range<T: DeserializeOwned>(pattern: &str, query: &RangeQuery) -> Result<Vec<T>> {
    let dir = partition_dir(pattern);
    let prefix_re = partition_matcher(pattern);

    let mut dated_files: Vec<(String, PathBuf)> = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                if !prefix_re.is_match(&name) {
                    return None;
                }
                let date = date_regex().find(&name)?.as_str().to_string();
                Some((date, e.path()))
            })
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(AgentWatchError::io_fatal(&dir, e)),
    };

    dated_files.retain(|(date, _)| {
        query.start.is_none_or(|s| date.as_str() >= s) && query.end.is_none_or(|e| date.as_str() <= e)
    });
    dated_files.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = Vec::new();
    for (_, path) in dated_files {
        let records: Vec<T> = read_all(&path)?;
        out.extend(records);
        if let Some(limit) = query.limit {
            if out.len() >= limit {
                out.truncate(limit);
                break;
            }
        }
    }
    Ok(out)
}

pub struct RotatePolicy {
    pub max_age_days: u32,
    pub max_files: usize,
}

/// List all files matching `pattern`, delete those older than
/// `max_age_days`, then enforce a hard cap of `max_files` per partition
/// prefix by deleting oldest-first.
pub fn rotate(pattern: &str, policy: &RotatePolicy) -> Result<usize> {
    let dir = partition_dir(pattern);
    let prefix_re = partition_matcher(pattern);

    let mut entries: Vec<(PathBuf, SystemTime)> = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                if !prefix_re.is_match(&name) {
                    return None;
                }
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((e.path(), modified))
            })
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(AgentWatchError::io_fatal(&dir, e)),
    };

    let mut removed = 0usize;
    let cutoff = SystemTime::now() - Duration::from_secs(policy.max_age_days as u64 * 86_400);

    entries.retain(|(path, modified)| {
        if *modified < cutoff {
            if fs::remove_file(path).is_ok() {
                removed += 1;
            }
            false
        } else {
            true
        }
    });

    entries.sort_by_key(|(_, modified)| *modified);
    if entries.len() > policy.max_files {
        let excess = entries.len() - policy.max_files;
        for (path, _) in entries.into_iter().take(excess) {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
    }

    Ok(removed)
}

fn partition_dir(pattern: &str) -> PathBuf {
    Path::new(pattern)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Build a regex matching file names produced by this pattern, regardless
/// of which date was substituted for `*`.
fn partition_matcher(pattern: &str) -> Regex {
    let base = Path::new(pattern)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let escaped = regex::escape(base).replace(r"\*", r"\d{4}-\d{2}-\d{2}");
    Regex::new(&format!("^{escaped}$")).unwrap_or_else(|_| Regex::new(".^").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Rec {
        id: u32,
        msg: String,
    }

    #[test]
    fn append_then_read_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, &Rec { id: 1, msg: "a".into() }).unwrap();
        append(&path, &Rec { id: 2, msg: "b".into() }).unwrap();
        let records: Vec<Rec> = read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].id, 2);
    }

    #[test]
    fn read_all_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "{{\"id\":1,\"msg\":\"ok\"}}").unwrap();
        writeln!(f, "not json").unwrap();
        writeln!(f, "{{\"id\":2,\"msg\":\"ok2\"}}").unwrap();
        let records: Vec<Rec> = read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn read_all_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.jsonl");
        let records: Vec<Rec> = read_all(&path).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn read_range_filters_by_embedded_date_and_sorts_desc() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("sessions_*.jsonl");
        let pattern_str = pattern.to_str().unwrap();

        append_to_partition(pattern_str, &Rec { id: 1, msg: "d1".into() }, Some("2026-07-01")).unwrap();
        append_to_partition(pattern_str, &Rec { id: 2, msg: "d2".into() }, Some("2026-07-02")).unwrap();
        append_to_partition(pattern_str, &Rec { id: 3, msg: "d3".into() }, Some("2026-07-03")).unwrap();

        let records: Vec<Rec> = read_range(
            pattern_str,
            &RangeQuery {
                start: Some("2026-07-02"),
                end: Some("2026-07-03"),
                limit: None,
            },
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 3); // newest first
        assert_eq!(records[1].id, 2);
    }

    #[test]
    fn read_range_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("sessions_*.jsonl");
        let pattern_str = pattern.to_str().unwrap();
        for i in 0..5 {
            append_to_partition(
                pattern_str,
                &Rec { id: i, msg: "x".into() },
                Some("2026-07-10"),
            )
            .unwrap();
        }
        let records: Vec<Rec> = read_range(
            pattern_str,
            &RangeQuery {
                start: None,
                end: None,
                limit: Some(3),
            },
        )
        .unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn rotate_deletes_files_older_than_max_age() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("sessions_*.jsonl");
        let pattern_str = pattern.to_str().unwrap();
        let old_path = dir.path().join("sessions_2020-01-01.jsonl");
        fs::write(&old_path, "{}\n").unwrap();
        let old_time = SystemTime::now() - Duration::from_secs(400 * 86_400);
        filetime::set_file_mtime(&old_path, filetime::FileTime::from_system_time(old_time)).unwrap();

        let removed = rotate(
            pattern_str,
            &RotatePolicy {
                max_age_days: 30,
                max_files: 100,
            },
        )
        .unwrap();
        assert_eq!(removed, 1);
        assert!(!old_path.exists());
    }

    #[test]
    fn rotate_enforces_max_files_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("sessions_*.jsonl");
        let pattern_str = pattern.to_str().unwrap();
        for day in 1..=5 {
            let p = dir.path().join(format!("sessions_2026-07-{day:02}.jsonl"));
            fs::write(&p, "{}\n").unwrap();
        }
        let removed = rotate(
            pattern_str,
            &RotatePolicy {
                max_age_days: 3650,
                max_files: 2,
            },
        )
        .unwrap();
        assert_eq!(removed, 3);
        assert!(dir.path().join("sessions_2026-07-04.jsonl").exists());
        assert!(dir.path().join("sessions_2026-07-05.jsonl").exists());
    }
}
