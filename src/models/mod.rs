//! The data model.
//!
//! Every record shape is a concrete struct with serde derives; optional
//! fields stay `Option<T>` rather than being elided, so the in-memory shape
//! matches the serialized one field-for-field.

mod agent;
mod enrichment;
mod port;
mod repo;
mod session;

pub use agent::{AgentProcess, AgentState, HeuristicState, WrapperOverlay};
pub use enrichment::{
    Annotation, DiffSnapshot, EnrichmentRecord, Feedback, FileChurn, LoopDetection, LoopSeverity,
    OutcomeSignals, PipelineSource, QualityClass, QualityScore, SessionRef, TaskType, WorkflowStatus,
};
pub use port::{ListeningPort, PortProtocol};
pub use repo::{RepoFlags, RepoHealth, RepoSnapshot, UpstreamInfo};
pub use session::{
    CommitAttribution, DailyStats, PermissionMode, Session, SessionSource, ToolStats, ToolUsage,
};
