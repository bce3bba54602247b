//! Keyed JSON blob store.
//!
//! One file per key, written whole each time via `paths::atomic_write` so a
//! reader never sees a half-written value. Uses the temp-file-then-rename
//! save pattern this crate is built from, generalized from a single fixed
//! config file to an arbitrary keyed collection (sessions, repos, ports —
//! anything addressed by an id string).

use crate::errors::{AgentWatchError, Result};
use crate::paths;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Sanitize a key into a safe file stem: anything outside
/// `[A-Za-z0-9_.-]` becomes `_`, so a key can never escape `dir` via `..`
/// or a path separator.
fn key_to_filename(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '_' })
        .collect();
    format!("{sanitized}.json")
}

fn key_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(key_to_filename(key))
}

/// Load the value stored under `key`, or `None` if no file exists for it.
pub fn load<T: DeserializeOwned>(dir: &Path, key: &str) -> Result<Option<T>> {
    let path = key_path(dir, key);
    let bytes = match fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AgentWatchError::io_fatal(&path, e)),
    };
    let value = serde_json::from_slice(&bytes).map_err(|e| AgentWatchError::Corrupt {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    Ok(Some(value))
}

/// Overwrite the value stored under `key`.
pub fn save(dir: &Path, key: &str, value: &impl Serialize) -> Result<()> {
    let path = key_path(dir, key);
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| AgentWatchError::Internal(format!("serializing {key}: {e}")))?;
    paths::atomic_write(&path, &bytes)
}

/// Load-modify-save under `key`. `default` supplies the starting value when
/// nothing is stored yet. Not concurrency-safe across processes — callers
/// holding the in-process lock around this (as `live_store` does) are
/// expected to serialize writers themselves.
pub fn update<T: DeserializeOwned + Serialize>(
    dir: &Path,
    key: &str,
    default: impl FnOnce() -> T,
    mutate: impl FnOnce(&mut T),
) -> Result<T> {
    let mut value = load::<T>(dir, key)?.unwrap_or_else(default);
    mutate(&mut value);
    save(dir, key, &value)?;
    Ok(value)
}

/// Delete the file backing `key`, if any. Missing files are not an error.
pub fn remove(dir: &Path, key: &str) -> Result<()> {
    let path = key_path(dir, key);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AgentWatchError::io_fatal(&path, e)),
    }
}

/// List all keys currently stored in `dir`, derived from file stems.
pub fn list_keys(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AgentWatchError::io_fatal(dir, e)),
    };
    let mut keys = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
    }
    Ok(keys)
}

/// Load every value in `dir` whose file decodes cleanly, skipping the rest.
pub fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let keys = list_keys(dir)?;
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        if let Ok(Some(value)) = load::<T>(dir, &key) {
            out.push(value);
        }
    }
    Ok(out)
}
