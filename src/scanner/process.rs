//! Process scanner.
//!
//! Enumerates OS processes via `sysinfo` (the pattern used in
//! `csa-resource/src/monitor.rs`'s `sysinfo::{Pid, ProcessesToUpdate,
//! System}` refresh loop), matches them against a configured matcher list,
//! resolves cwd and git root, and derives an ACTIVE/IDLE/STALLED heuristic
//! from rolling per-PID CPU history.

use crate::models::{AgentProcess, AgentState, HeuristicState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessesToUpdate, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    ExeBasename,
    CmdRegex,
    CmdSubstring,
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pub label: String,
    pub kind: MatcherKind,
    pub pattern: String,
}

impl Matcher {
    pub fn exe_basename(label: &str, pattern: &str) -> Self {
        Matcher { label: label.into(), kind: MatcherKind::ExeBasename, pattern: pattern.into() }
    }
}

/// The three coding-agent CLIs this crate recognizes out of the box.
pub fn default_matchers() -> Vec<Matcher> {
    vec![
        Matcher::exe_basename("claude", "claude"),
        Matcher::exe_basename("codex", "codex"),
        Matcher::exe_basename("gemini", "gemini"),
    ]
}

fn matches(matcher: &Matcher, exe_basename: &str, cmd_line: &str) -> bool {
    match matcher.kind {
        MatcherKind::ExeBasename => exe_basename == matcher.pattern,
        MatcherKind::CmdSubstring => cmd_line.contains(&matcher.pattern),
        MatcherKind::CmdRegex => regex::Regex::new(&matcher.pattern)
            .map(|re| re.is_match(cmd_line))
            .unwrap_or(false),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CwdResolution {
    On,
    Off,
    BestEffort,
}

pub struct HeuristicThresholds {
    pub active_cpu_percent: f32,
    pub stalled_quiet_seconds: u64,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        HeuristicThresholds { active_cpu_percent: 5.0, stalled_quiet_seconds: 300 }
    }
}

/// Rolling per-PID state carried across ticks. Entries absent for two
/// consecutive ticks are dropped.
#[derive(Default)]
struct PidHistory {
    recent_cpu: f32,
    quiet_seconds: u64,
    last_tick_seen: u64,
}

pub struct ProcessScanner {
    matchers: Vec<Matcher>,
    cwd_resolution: CwdResolution,
    thresholds: HeuristicThresholds,
    tick_interval_secs: u64,
    history: HashMap<u32, PidHistory>,
    tick_count: u64,
    system: System,
}

impl ProcessScanner {
    pub fn new(
        matchers: Vec<Matcher>,
        cwd_resolution: CwdResolution,
        thresholds: HeuristicThresholds,
        tick_interval_secs: u64,
    ) -> Self {
        ProcessScanner {
            matchers,
            cwd_resolution,
            thresholds,
            tick_interval_secs,
            history: HashMap::new(),
            tick_count: 0,
            system: System::new(),
        }
    }

    /// Run one scan tick, returning the new agent map and the set of PIDs
    /// that disappeared since the last tick (ended processes).
    pub fn tick(&mut self) -> (Vec<AgentProcess>, Vec<u32>) {
        self.tick_count += 1;
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let previous_pids: Vec<u32> = self.history.keys().copied().collect();
        let mut current = Vec::new();
        let mut seen_pids = Vec::new();

        for (pid, process) in self.system.processes() {
            let exe_path = process.exe().map(|p| p.to_string_lossy().to_string());
            let exe_basename = exe_path
                .as_deref()
                .and_then(|p| Path::new(p).file_name())
                .and_then(|n| n.to_str())
                .unwrap_or_else(|| process.name().to_str().unwrap_or(""));
            let cmd_line = process
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");

            let Some(matcher) = self.matchers.iter().find(|m| matches(m, exe_basename, &cmd_line)) else {
                continue;
            };

            let pid_u32 = pid.as_u32();
            seen_pids.push(pid_u32);

            let cwd = self.resolve_cwd(pid_u32);
            let repo_root = cwd.as_deref().and_then(walk_up_for_git_root);

            let cpu_percent = process.cpu_usage();
            let history = self.history.entry(pid_u32).or_default();
            history.last_tick_seen = self.tick_count;
            history.recent_cpu = cpu_percent;
            if cpu_percent < self.thresholds.active_cpu_percent {
                history.quiet_seconds += self.tick_interval_secs;
            } else {
                history.quiet_seconds = 0;
            }

            let state = if cpu_percent >= self.thresholds.active_cpu_percent {
                AgentState::Active
            } else if history.quiet_seconds > self.thresholds.stalled_quiet_seconds {
                AgentState::Stalled
            } else {
                AgentState::Idle
            };

            current.push(AgentProcess {
                pid: pid_u32,
                parent_pid: process.parent().map(|p| p.as_u32()),
                label: matcher.label.clone(),
                matched_label: matcher.label.clone(),
                command_line: cmd_line,
                exe_path,
                cpu_percent,
                resident_kb: process.memory() / 1024,
                thread_count: 1,
                tty: None,
                cwd,
                repo_root,
                start_time: chrono::DateTime::from_timestamp(process.start_time() as i64, 0)
                    .unwrap_or_else(chrono::Utc::now),
                heuristic: Some(HeuristicState {
                    state,
                    recent_cpu: history.recent_cpu,
                    quiet_seconds: history.quiet_seconds,
                }),
                wrapper: None,
            });
        }

        // drop history for PIDs absent two consecutive ticks
        self.history.retain(|_, h| self.tick_count.saturating_sub(h.last_tick_seen) < 2);

        let ended: Vec<u32> = previous_pids
            .into_iter()
            .filter(|pid| !seen_pids.contains(pid) && !self.history.contains_key(pid))
            .collect();

        (current, ended)
    }

    fn resolve_cwd(&self, pid: u32) -> Option<String> {
        match self.cwd_resolution {
            CwdResolution::Off => None,
            CwdResolution::On | CwdResolution::BestEffort => {
                std::fs::read_link(format!("/proc/{pid}/cwd"))
                    .ok()
                    .map(|p| p.to_string_lossy().to_string())
            }
        }
    }
}

/// Walk upward from `start` looking for a `.git` entry, bounded to 12
/// ancestor levels.
fn walk_up_for_git_root(start: &str) -> Option<String> {
    let mut dir = PathBuf::from(start);
    for _ in 0..12 {
        if dir.join(".git").exists() {
            return Some(dir.to_string_lossy().to_string());
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

/// Liveness check used by dead-session reconciliation and port correlation,
/// via the standard `libc::kill(pid, 0)` probe.
pub fn is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exe_basename_matcher_matches_exact_name() {
        let m = Matcher::exe_basename("claude", "claude");
        assert!(matches(&m, "claude", "claude --foo"));
        assert!(!matches(&m, "claude-wrapper", "claude-wrapper"));
    }

    #[test]
    fn cmd_substring_matcher_matches_anywhere() {
        let m = Matcher { label: "x".into(), kind: MatcherKind::CmdSubstring, pattern: "codex".into() };
        assert!(matches(&m, "node", "/usr/bin/node /opt/codex/cli.js"));
    }

    #[test]
    fn default_matchers_cover_known_clis() {
        let labels: Vec<_> = default_matchers().into_iter().map(|m| m.label).collect();
        assert_eq!(labels, vec!["claude", "codex", "gemini"]);
    }

    #[test]
    fn walk_up_for_git_root_finds_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let found = walk_up_for_git_root(nested.to_str().unwrap());
        assert_eq!(found.as_deref(), Some(dir.path().to_str().unwrap()));
    }

    #[test]
    fn walk_up_for_git_root_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(walk_up_for_git_root(nested.to_str().unwrap()), None);
    }

    #[test]
    fn is_alive_true_for_current_process() {
        assert!(is_alive(std::process::id()));
    }
}
