use serde::{Deserialize, Serialize};

/// The canonical triple used to key enrichments to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionRef {
    pub correlation_id: Option<String>,
    pub hook_session_id: Option<String>,
    pub transcript_id: Option<String>,
}

impl SessionRef {
    /// Canonicalisation rule: correlation id when present, else
    /// `corr:<hook id>`, else `corr:<transcript id>`.
    pub fn canonical_key(&self) -> Option<String> {
        if let Some(c) = &self.correlation_id {
            return Some(c.clone());
        }
        if let Some(h) = &self.hook_session_id {
            return Some(format!("corr:{h}"));
        }
        self.transcript_id.as_ref().map(|t| format!("corr:{t}"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Feature,
    Bugfix,
    Refactor,
    Docs,
    Test,
    Chore,
    Other,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct OutcomeSignals {
    pub success_count: u64,
    pub failure_count: u64,
    pub tests_passed: Option<u64>,
    pub tests_failed: Option<u64>,
    pub exit_codes: Vec<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LoopSeverity {
    None,
    Low,
    Medium,
    High,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoopDetection {
    pub severity: LoopSeverity,
    pub offending_windows: Vec<(usize, usize)>,
}

impl Default for LoopDetection {
    fn default() -> Self {
        LoopDetection {
            severity: LoopSeverity::None,
            offending_windows: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FileChurn {
    pub path: String,
    pub insertions: u64,
    pub deletions: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DiffSnapshot {
    pub commit_count: u64,
    pub files: Vec<FileChurn>,
    pub uncommitted_insertions: u64,
    pub uncommitted_deletions: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QualityClass {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QualityScore {
    pub score: u8,
    pub class: QualityClass,
}

impl QualityScore {
    pub fn classify(score: u8) -> QualityClass {
        match score {
            80..=100 => QualityClass::Excellent,
            60..=79 => QualityClass::Good,
            40..=59 => QualityClass::Fair,
            _ => QualityClass::Poor,
        }
    }

    pub fn new(score: u8) -> Self {
        QualityScore {
            score,
            class: Self::classify(score),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Positive,
    Negative,
    Neutral,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Open,
    InReview,
    Done,
    Archived,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Annotation {
    pub feedback: Option<Feedback>,
    pub notes: Option<String>,
    pub user_tags: Vec<String>,
    pub rating: Option<u8>,
    pub workflow_status: Option<WorkflowStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineSource {
    Hook,
    Transcript,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrichmentRecord {
    pub session_ref_key: String,
    pub auto_tags: Vec<String>,
    pub task_type: Option<TaskType>,
    pub language_tags: Vec<String>,
    pub outcome: OutcomeSignals,
    pub loop_detection: LoopDetection,
    pub diff_snapshot: DiffSnapshot,
    pub quality: QualityScore,
    pub annotation: Annotation,
    pub source: PipelineSource,
    pub computed_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_prefers_correlation_id() {
        let r = SessionRef {
            correlation_id: Some("corr-1".into()),
            hook_session_id: Some("hook-1".into()),
            transcript_id: Some("t-1".into()),
        };
        assert_eq!(r.canonical_key().as_deref(), Some("corr-1"));
    }

    #[test]
    fn canonical_key_falls_back_to_hook_id() {
        let r = SessionRef {
            correlation_id: None,
            hook_session_id: Some("hook-1".into()),
            transcript_id: Some("t-1".into()),
        };
        assert_eq!(r.canonical_key().as_deref(), Some("corr:hook-1"));
    }

    #[test]
    fn canonical_key_falls_back_to_transcript_id() {
        let r = SessionRef {
            correlation_id: None,
            hook_session_id: None,
            transcript_id: Some("t-1".into()),
        };
        assert_eq!(r.canonical_key().as_deref(), Some("corr:t-1"));
    }

    #[test]
    fn canonical_key_none_when_all_absent() {
        let r = SessionRef {
            correlation_id: None,
            hook_session_id: None,
            transcript_id: None,
        };
        assert_eq!(r.canonical_key(), None);
    }

    #[test]
    fn quality_classification_thresholds() {
        assert_eq!(QualityScore::classify(85), QualityClass::Excellent);
        assert_eq!(QualityScore::classify(60), QualityClass::Good);
        assert_eq!(QualityScore::classify(40), QualityClass::Fair);
        assert_eq!(QualityScore::classify(10), QualityClass::Poor);
    }
}
