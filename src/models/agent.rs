use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Active,
    Idle,
    Stalled,
    Working,
    Waiting,
    #[default]
    Unknown,
}

/// The rolling-CPU-history heuristic result for one PID.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct HeuristicState {
    pub state: AgentState,
    pub recent_cpu: f32,
    pub quiet_seconds: u64,
}

/// Present only for processes the daemon itself spawned; the daemon owns
/// this overlay exclusively, never the process scanner.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WrapperOverlay {
    pub pid: u32,
    pub label: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Keyed by OS process id.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AgentProcess {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub label: String,
    pub matched_label: String,
    pub command_line: String,
    pub exe_path: Option<String>,
    pub cpu_percent: f32,
    pub resident_kb: u64,
    pub thread_count: usize,
    pub tty: Option<String>,
    pub cwd: Option<String>,
    pub repo_root: Option<String>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub heuristic: Option<HeuristicState>,
    pub wrapper: Option<WrapperOverlay>,
}
