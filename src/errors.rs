//! Error taxonomy (§7). Scanners and the hot-path append/read code use this
//! typed error; the HTTP layer translates it to a status code and never lets
//! an error escape to the transport.

use std::path::Path;

pub type Result<T> = std::result::Result<T, AgentWatchError>;

#[derive(Debug, thiserror::Error)]
pub enum AgentWatchError {
    /// Missing/malformed request fields. Maps to HTTP 400.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Unknown id. Maps to HTTP 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// Subprocess timeout, permissions error. Never escalated — logged and
    /// the affected entity is tainted with a health field.
    #[error("transient error: {0}")]
    Transient(String),

    /// Malformed JSON line. Skipped at record granularity, never surfaced
    /// to a caller; this variant exists so internal helpers can report it
    /// to a caller that wants to count corrupt lines.
    #[error("corrupt record in {path}: {detail}")]
    Corrupt { path: String, detail: String },

    /// Cannot write the PID file, cannot bind the listener. The daemon
    /// exits with a non-zero code.
    #[error("fatal I/O error on {path}: {source}")]
    IoFatal {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Programming invariant violated. Maps to HTTP 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentWatchError {
    pub fn io_fatal(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        AgentWatchError::IoFatal {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, detail: impl Into<String>) -> Self {
        AgentWatchError::Corrupt {
            path: path.as_ref().display().to_string(),
            detail: detail.into(),
        }
    }

    /// HTTP status code this error maps to, per §7's propagation policy.
    pub fn status_code(&self) -> u16 {
        match self {
            AgentWatchError::InputInvalid(_) => 400,
            AgentWatchError::NotFound(_) => 404,
            AgentWatchError::Transient(_) => 503,
            AgentWatchError::Corrupt { .. } => 500,
            AgentWatchError::IoFatal { .. } => 500,
            AgentWatchError::Internal(_) => 500,
        }
    }
}
