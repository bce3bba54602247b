//! Config loader.
//!
//! A typed `~/.agentwatch/config.toml`, grounded in how `lanegrid-agtrace`
//! and `rehoboam` both use `toml` + `serde` for their config files.
//! `#[serde(default)]` throughout so unknown/missing keys never fail a
//! load — forward-compat, since keys get added over time.

use crate::errors::{AgentWatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RootsConfig {
    pub paths: Vec<PathBuf>,
    pub ignore_dirs: Vec<String>,
}

impl Default for RootsConfig {
    fn default() -> Self {
        RootsConfig {
            paths: vec![crate::paths::home_dir()],
            ignore_dirs: vec!["node_modules".into(), "target".into(), ".git".into()],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RepoIntervalsConfig {
    pub fast_refresh_secs: u64,
    pub slow_refresh_secs: u64,
    pub fetch_policy: String,
    pub show_clean: bool,
}

impl Default for RepoIntervalsConfig {
    fn default() -> Self {
        RepoIntervalsConfig { fast_refresh_secs: 3, slow_refresh_secs: 60, fetch_policy: "off".into(), show_clean: true }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub process_refresh_secs: u64,
    pub port_refresh_secs: u64,
    pub low_port_guard: u16,
    pub cwd_resolution: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig { process_refresh_secs: 5, port_refresh_secs: 5, low_port_guard: 1024, cwd_resolution: "best_effort".into() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HeuristicConfig {
    pub active_cpu_percent: f32,
    pub stalled_quiet_seconds: u64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        HeuristicConfig { active_cpu_percent: 5.0, stalled_quiet_seconds: 300 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MatcherConfigEntry {
    pub label: String,
    pub kind: String,
    pub pattern: String,
}

impl Default for MatcherConfigEntry {
    fn default() -> Self {
        MatcherConfigEntry { label: String::new(), kind: "exe_basename".into(), pattern: String::new() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WatcherConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig { host: "127.0.0.1".into(), port: 7417 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CostLimitsConfig {
    pub daily_budget_usd: Option<f64>,
    pub warn_threshold_usd: Option<f64>,
}

impl Default for CostLimitsConfig {
    fn default() -> Self {
        CostLimitsConfig { daily_budget_usd: None, warn_threshold_usd: None }
    }
}

/// Every default value is spelled out once here, in this one struct.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub roots: RootsConfig,
    pub repo: RepoIntervalsConfig,
    pub monitor: MonitorConfig,
    pub heuristic: HeuristicConfig,
    pub matchers: Vec<MatcherConfigEntry>,
    pub watcher: WatcherConfig,
    pub cost: CostLimitsConfig,
}

fn config_path() -> PathBuf {
    crate::paths::base_dir().join("config.toml")
}

/// Load `~/.agentwatch/config.toml`, merging user overrides into defaults.
/// A missing file yields pure defaults; a present-but-unparseable file is
/// an error (the user asked for something specific and got it wrong).
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).map_err(|e| AgentWatchError::Corrupt {
            path: path.display().to_string(),
            detail: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(AgentWatchError::io_fatal(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_missing_path_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.watcher.port, 7417);
    }

    #[test]
    fn load_from_partial_toml_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[watcher]\nport = 9999\n").unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.watcher.port, 9999);
        assert_eq!(config.watcher.host, "127.0.0.1");
        assert_eq!(config.monitor.process_refresh_secs, 5);
    }

    #[test]
    fn load_from_unknown_keys_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "unknown_top_level = true\n[watcher]\nhost = \"0.0.0.0\"\n").unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.watcher.host, "0.0.0.0");
    }
}
