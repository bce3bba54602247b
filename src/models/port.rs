use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortProtocol {
    Tcp4,
    Tcp6,
}

/// Keyed by port number.
///
/// Invariant: `(agent_id set) ⇔ owning PID is an agent OR parent of owning
/// PID is an agent`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ListeningPort {
    pub port: u16,
    pub pid: u32,
    pub process_name: String,
    pub command_line: String,
    pub bind_address: String,
    pub protocol: PortProtocol,
    pub agent_id: Option<u32>,
    pub agent_label: Option<String>,
    pub first_seen: chrono::DateTime<chrono::Utc>,
    pub cwd: Option<String>,
}
