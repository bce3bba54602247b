//! Enrichment pipeline: auto-tagging, outcome extraction, loop detection,
//! diff snapshots, and a composite quality score, run at session end.

pub mod pipeline;
pub mod store;
