//! Port scanner.
//!
//! Enumerates listening TCP sockets by reading `/proc/net/tcp` and
//! `/proc/net/tcp6` directly (state `0A` = LISTEN) and resolves the owning
//! PID by matching each socket's inode against `/proc/<pid>/fd/*` symlinks.
//! The standard dependency-free Linux technique, used in place of shelling
//! out to `ss`/`lsof`.

use crate::models::{AgentProcess, ListeningPort, PortProtocol};
use std::collections::HashMap;
use std::fs;

const LISTEN_STATE: &str = "0A";

struct RawListener {
    port: u16,
    inode: u64,
    local_addr: String,
    protocol: PortProtocol,
}

fn parse_proc_net_tcp(contents: &str, protocol: PortProtocol) -> Vec<RawListener> {
    let mut out = Vec::new();
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let state = fields[3];
        if state != LISTEN_STATE {
            continue;
        }
        let Some((addr_hex, port_hex)) = fields[1].split_once(':') else { continue };
        let Ok(port) = u16::from_str_radix(port_hex, 16) else { continue };
        let Ok(inode) = fields[9].parse::<u64>() else { continue };
        out.push(RawListener {
            port,
            inode,
            local_addr: decode_address(addr_hex, protocol),
            protocol,
        });
    }
    out
}

fn decode_address(hex: &str, protocol: PortProtocol) -> String {
    match protocol {
        PortProtocol::Tcp4 => {
            let Ok(bytes) = u32::from_str_radix(hex, 16) else { return "0.0.0.0".into() };
            let octets = bytes.to_le_bytes();
            format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
        }
        PortProtocol::Tcp6 => "::".into(),
    }
}

/// Map socket inode -> owning pid by scanning `/proc/<pid>/fd/*` symlinks
/// for `socket:[<inode>]` targets.
fn build_inode_to_pid_map() -> HashMap<u64, u32> {
    let mut map = HashMap::new();
    let Ok(proc_entries) = fs::read_dir("/proc") else { return map };
    for entry in proc_entries.filter_map(|e| e.ok()) {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else { continue };
        let fd_dir = entry.path().join("fd");
        let Ok(fds) = fs::read_dir(&fd_dir) else { continue };
        for fd in fds.filter_map(|e| e.ok()) {
            let Ok(target) = fs::read_link(fd.path()) else { continue };
            let target = target.to_string_lossy();
            if let Some(inode_str) = target.strip_prefix("socket:[").and_then(|s| s.strip_suffix(']')) {
                if let Ok(inode) = inode_str.parse::<u64>() {
                    map.entry(inode).or_insert(pid);
                }
            }
        }
    }
    map
}

pub struct PortScanner {
    first_seen: HashMap<(u16, u32), chrono::DateTime<chrono::Utc>>,
    low_port_guard: u16,
}

impl PortScanner {
    pub fn new(low_port_guard: u16) -> Self {
        PortScanner { first_seen: HashMap::new(), low_port_guard }
    }

    /// One scan tick. `agents` is the live process map used for port-to-
    /// agent correlation; `process_names`/`parents` come from the same
    /// scan for labeling ports not directly owned by an agent.
    pub fn tick(&mut self, agents: &[AgentProcess]) -> Vec<ListeningPort> {
        let agents_by_pid: HashMap<u32, &AgentProcess> = agents.iter().map(|a| (a.pid, a)).collect();
        let inode_to_pid = build_inode_to_pid_map();

        let mut raw = Vec::new();
        if let Ok(v4) = fs::read_to_string("/proc/net/tcp") {
            raw.extend(parse_proc_net_tcp(&v4, PortProtocol::Tcp4));
        }
        if let Ok(v6) = fs::read_to_string("/proc/net/tcp6") {
            raw.extend(parse_proc_net_tcp(&v6, PortProtocol::Tcp6));
        }

        let now = chrono::Utc::now();
        let mut seen_keys = Vec::new();
        let mut out = Vec::new();

        for listener in raw {
            if listener.port < self.low_port_guard {
                continue;
            }
            let Some(&pid) = inode_to_pid.get(&listener.inode) else { continue };

            let (agent_id, agent_label) = if let Some(agent) = agents_by_pid.get(&pid) {
                (Some(pid), Some(agent.label.clone()))
            } else if let Some(parent_pid) = process_parent_pid(pid) {
                match agents_by_pid.get(&parent_pid) {
                    Some(agent) => (Some(parent_pid), Some(agent.label.clone())),
                    None => (None, None),
                }
            } else {
                (None, None)
            };

            let key = (listener.port, pid);
            seen_keys.push(key);
            let first_seen = *self.first_seen.entry(key).or_insert(now);

            let (process_name, command_line, cwd) = process_info(pid);

            out.push(ListeningPort {
                port: listener.port,
                pid,
                process_name,
                command_line,
                bind_address: listener.local_addr,
                protocol: listener.protocol,
                agent_id,
                agent_label,
                first_seen,
                cwd,
            });
        }

        self.first_seen.retain(|key, _| seen_keys.contains(key));
        out
    }
}

fn process_parent_pid(pid: u32) -> Option<u32> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // fields after the "(comm)" field, which may itself contain spaces/parens
    let after_comm = stat.rsplit_once(')')?.1;
    after_comm.split_whitespace().nth(1)?.parse().ok()
}

fn process_info(pid: u32) -> (String, String, Option<String>) {
    let cmd_line = fs::read_to_string(format!("/proc/{pid}/cmdline"))
        .map(|raw| raw.split('\0').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let process_name = fs::read_to_string(format!("/proc/{pid}/comm"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let cwd = fs::read_link(format!("/proc/{pid}/cwd")).ok().map(|p| p.to_string_lossy().to_string());
    (process_name, cmd_line, cwd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_proc_net_tcp_only_keeps_listen_state() {
        let sample = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 12345 1 0000000000000000 100 0 0 10 0
   1: 0100007F:0050 0A0A0A0A:1234 01 00000000:00000000 00:00000000 00000000  1000        0 99999 1 0000000000000000 100 0 0 10 0";
        let listeners = parse_proc_net_tcp(sample, PortProtocol::Tcp4);
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].port, 0x1F90);
        assert_eq!(listeners[0].inode, 12345);
    }

    #[test]
    fn decode_address_v4_parses_little_endian_hex() {
        // 0100007F = 127.0.0.1 in the kernel's little-endian encoding
        assert_eq!(decode_address("0100007F", PortProtocol::Tcp4), "127.0.0.1");
    }

    #[test]
    fn port_scanner_drops_keys_not_seen_this_tick() {
        let mut scanner = PortScanner::new(1024);
        scanner.first_seen.insert((3000, 42), chrono::Utc::now());
        let out = scanner.tick(&[]);
        assert!(out.is_empty());
        assert!(scanner.first_seen.is_empty());
    }
}
