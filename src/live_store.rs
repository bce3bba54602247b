//! Live in-memory store.
//!
//! Holds agents/repos/ports, each mutated only via whole-map replacement.
//! Follows the `AppState` pattern (a `Mutex`-guarded struct shared via `Arc`
//! across handlers) this crate is built from, reworked from a
//! single-callback notifier to whole-map replacement plus multi-subscriber
//! fan-out over `tokio::sync::broadcast`, so the HTTP/WS layer and a future
//! TUI can each hold an independent receiver.

use crate::models::{AgentProcess, ListeningPort, RepoSnapshot, WrapperOverlay};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// A change notification broadcast whenever a table is replaced. Carries no
/// payload — subscribers re-read the table they care about, since the
/// store's lock can't be held across the channel send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Agents,
    Repos,
    Ports,
}

#[derive(Default)]
struct Tables {
    agents: HashMap<u32, AgentProcess>,
    repos: HashMap<String, RepoSnapshot>,
    ports: HashMap<u16, ListeningPort>,
    wrapper_states: HashMap<u32, WrapperOverlay>,
}

pub struct LiveStore {
    tables: Mutex<Tables>,
    changes: broadcast::Sender<ChangeKind>,
}

impl Default for LiveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        LiveStore {
            tables: Mutex::new(Tables::default()),
            changes,
        }
    }

    /// Subscribe to change notifications. Lagging receivers silently drop
    /// the oldest notification rather than block publishers (per the
    /// `broadcast` channel's standard semantics) — a WS client that falls
    /// behind just re-fetches the snapshot on its next poll.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeKind> {
        self.changes.subscribe()
    }

    fn publish(&self, kind: ChangeKind) {
        let _ = self.changes.send(kind);
    }

    /// Atomically replace the agent map, merging in any surviving wrapper
    /// overlay: a wrapper overlay is attached iff the PID still appears in
    /// `agents`. Overlays for PIDs no longer present are left in
    /// `wrapper_states` for the caller to evict explicitly.
    pub fn replace_agents(&self, agents: Vec<AgentProcess>) {
        let mut tables = self.tables.lock().unwrap();
        let overlays = tables.wrapper_states.clone();
        tables.agents = agents
            .into_iter()
            .map(|mut agent| {
                agent.wrapper = overlays.get(&agent.pid).cloned();
                (agent.pid, agent)
            })
            .collect();
        drop(tables);
        self.publish(ChangeKind::Agents);
    }

    pub fn agents(&self) -> Vec<AgentProcess> {
        self.tables.lock().unwrap().agents.values().cloned().collect()
    }

    pub fn agent(&self, pid: u32) -> Option<AgentProcess> {
        self.tables.lock().unwrap().agents.get(&pid).cloned()
    }

    pub fn set_wrapper_state(&self, overlay: WrapperOverlay) {
        self.tables.lock().unwrap().wrapper_states.insert(overlay.pid, overlay);
    }

    pub fn evict_wrapper_state(&self, pid: u32) {
        self.tables.lock().unwrap().wrapper_states.remove(&pid);
    }

    pub fn wrapper_states(&self) -> Vec<WrapperOverlay> {
        self.tables.lock().unwrap().wrapper_states.values().cloned().collect()
    }

    pub fn replace_repos(&self, repos: Vec<RepoSnapshot>) {
        let mut tables = self.tables.lock().unwrap();
        tables.repos = repos.into_iter().map(|r| (r.id.clone(), r)).collect();
        drop(tables);
        self.publish(ChangeKind::Repos);
    }

    pub fn repos(&self) -> Vec<RepoSnapshot> {
        self.tables.lock().unwrap().repos.values().cloned().collect()
    }

    pub fn repo(&self, id: &str) -> Option<RepoSnapshot> {
        self.tables.lock().unwrap().repos.get(id).cloned()
    }

    pub fn replace_ports(&self, ports: Vec<ListeningPort>) {
        let mut tables = self.tables.lock().unwrap();
        tables.ports = ports.into_iter().map(|p| (p.port, p)).collect();
        drop(tables);
        self.publish(ChangeKind::Ports);
    }

    pub fn ports(&self) -> Vec<ListeningPort> {
        self.tables.lock().unwrap().ports.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PortProtocol, RepoFlags, RepoHealth};

    fn sample_repo(id: &str) -> RepoSnapshot {
        RepoSnapshot {
            id: id.to_string(),
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

    fn sample_agent(pid: u32) -> AgentProcess {
        AgentProcess {
            pid,
            parent_pid: None,
            label: "claude".into(),
            matched_label: "claude".into(),
            command_line: "claude".into(),
            exe_path: None,
            cpu_percent: 0.0,
            resident_kb: 0,
            thread_count: 1,
            tty: None,
            cwd: None,
            repo_root: None,
            start_time: chrono::Utc::now(),
            heuristic: None,
            wrapper: None,
        }
    }

    #[test]
    fn replace_agents_overwrites_whole_table() {
        let store = LiveStore::new();
        store.replace_agents(vec![sample_agent(1)]);
        assert_eq!(store.agents().len(), 1);
        store.replace_agents(vec![]);
        assert_eq!(store.agents().len(), 0);
    }

    #[test]
    fn subscribers_receive_change_notification() {
        let store = LiveStore::new();
        let mut rx = store.subscribe();
        store.replace_repos(vec![sample_repo("r1")]);
        let kind = rx.try_recv().unwrap();
        assert_eq!(kind, ChangeKind::Repos);
    }

    #[test]
    fn wrapper_overlay_attached_only_while_pid_present() {
        let store = LiveStore::new();
        store.set_wrapper_state(WrapperOverlay { pid: 1, label: "wrap".into(), started_at: chrono::Utc::now() });
        store.replace_agents(vec![sample_agent(1)]);
        assert!(store.agent(1).unwrap().wrapper.is_some());

        store.replace_agents(vec![]);
        store.replace_agents(vec![sample_agent(1)]);
        // overlay still present in wrapper_states until explicitly evicted
        assert!(store.agent(1).unwrap().wrapper.is_some());

        store.evict_wrapper_state(1);
        store.replace_agents(vec![sample_agent(1)]);
        assert!(store.agent(1).unwrap().wrapper.is_none());
    }

    #[test]
    fn ports_keyed_by_port_number() {
        let store = LiveStore::new();
        let p = ListeningPort {
            port: 3000,
            pid: 42,
            process_name: "node".into(),
            command_line: "node server.js".into(),
            bind_address: "127.0.0.1".into(),
            protocol: PortProtocol::Tcp4,
            agent_id: None,
            agent_label: None,
            first_seen: chrono::Utc::now(),
            cwd: None,
        };
        store.replace_ports(vec![p]);
        assert_eq!(store.ports().len(), 1);
    }
}
