//! Enrichment pipeline stages. Auto-tags and outcome-signal extraction are
//! new code with no teacher equivalent; the diff snapshot stage reuses
//! `git.rs`'s invocation style, parsing `git diff --numstat` output for
//! insertion/deletion counts. Loop detection and the quality score are
//! implemented directly from the stage descriptions below.

use crate::git;
use crate::models::{
    Annotation, DiffSnapshot, EnrichmentRecord, FileChurn, LoopDetection, LoopSeverity,
    OutcomeSignals, PipelineSource, QualityScore, TaskType,
};
use crate::models::{Session, ToolUsage};
use std::collections::HashMap;
use std::path::Path;

/// A session's starting commit, cached by session id until the diff
/// snapshot stage consumes it — cleared from the cache on use.
#[derive(Default)]
pub struct DiffBaselines {
    baselines: HashMap<String, String>,
}

impl DiffBaselines {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn capture(&mut self, session_id: &str, repo_path: &Path) {
        if let Some(commit) = git::commit_in(repo_path).await {
            self.baselines.insert(session_id.to_string(), commit);
        }
    }

    /// Set a single session's baseline without shelling out, so a caller
    /// holding a store-wide lock only for the duration of this call can
    /// stash an already-fetched commit hash without an `.await` in scope.
    pub(crate) fn set(&mut self, session_id: &str, commit: String) {
        self.baselines.insert(session_id.to_string(), commit);
    }

    pub(crate) fn take(&mut self, session_id: &str) -> Option<String> {
        self.baselines.remove(session_id)
    }
}

/// Stage 1: infer a task type from the tool-name/edited-path distribution,
/// plus language tags from file extensions.
pub fn auto_tags(usages: &[ToolUsage]) -> (Option<TaskType>, Vec<String>) {
    let mut edited_paths = Vec::new();
    for usage in usages {
        if matches!(usage.tool_name.as_str(), "Edit" | "Write" | "MultiEdit") {
            if let Some(path) = usage.tool_input.get("file_path").and_then(|v| v.as_str()) {
                edited_paths.push(path.to_string());
            }
        }
    }

    let task_type = infer_task_type(usages, &edited_paths);

    let mut languages: Vec<String> = edited_paths
        .iter()
        .filter_map(|p| Path::new(p).extension())
        .filter_map(|ext| ext.to_str())
        .map(language_for_extension)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    languages.sort();
    languages.dedup();

    (task_type, languages)
}

fn infer_task_type(usages: &[ToolUsage], edited_paths: &[String]) -> Option<TaskType> {
    if usages.is_empty() {
        return None;
    }
    let has_test_paths = edited_paths.iter().any(|p| p.contains("test") || p.contains("spec"));
    let has_doc_paths = edited_paths.iter().any(|p| p.ends_with(".md") || p.contains("docs/"));
    let bash_grep_count = usages.iter().filter(|u| matches!(u.tool_name.as_str(), "Bash" | "Grep")).count();
    let edit_count = usages.iter().filter(|u| matches!(u.tool_name.as_str(), "Edit" | "Write" | "MultiEdit")).count();

    if has_test_paths {
        Some(TaskType::Test)
    } else if has_doc_paths {
        Some(TaskType::Docs)
    } else if edit_count == 0 && bash_grep_count > 0 {
        Some(TaskType::Chore)
    } else if edit_count > 0 {
        Some(TaskType::Feature)
    } else {
        Some(TaskType::Other)
    }
}

fn task_type_tag(t: TaskType) -> &'static str {
    match t {
        TaskType::Feature => "feature",
        TaskType::Bugfix => "bugfix",
        TaskType::Refactor => "refactor",
        TaskType::Docs => "docs",
        TaskType::Test => "test",
        TaskType::Chore => "chore",
        TaskType::Other => "other",
    }
}

fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        "rs" => "rust",
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "go" => "go",
        "rb" => "ruby",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" => "cpp",
        _ => "",
    }
}

/// Stage 2: count successes/failures, parse test/lint-like outputs, and
/// extract exit codes where recognisable.
pub fn outcome_signals(usages: &[ToolUsage]) -> OutcomeSignals {
    let mut signals = OutcomeSignals::default();
    for usage in usages {
        if usage.success() {
            signals.success_count += 1;
        } else {
            signals.failure_count += 1;
        }

        if usage.tool_name == "Bash" {
            if let Some(output) = usage.tool_response.as_ref().and_then(|r| r.get("stdout")).and_then(|v| v.as_str()) {
                if let Some((passed, failed)) = parse_test_counts(output) {
                    signals.tests_passed = Some(signals.tests_passed.unwrap_or(0) + passed);
                    signals.tests_failed = Some(signals.tests_failed.unwrap_or(0) + failed);
                }
                if let Some(code) = parse_exit_code(output) {
                    signals.exit_codes.push(code);
                }
            }
        }
    }
    signals
}

fn parse_test_counts(output: &str) -> Option<(u64, u64)> {
    let re = regex::Regex::new(r"(\d+) passed(?:.*?(\d+) failed)?").ok()?;
    let caps = re.captures(output)?;
    let passed = caps.get(1)?.as_str().parse().ok()?;
    let failed = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    Some((passed, failed))
}

fn parse_exit_code(output: &str) -> Option<i32> {
    let re = regex::Regex::new(r"exit code[: ]+(-?\d+)").ok()?;
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

const LOOP_REPETITION_THRESHOLD: usize = 3;
const LOOP_OSCILLATION_THRESHOLD: usize = 4;

/// Stage 3: scan for identical-input repetitions, tool oscillation, and
/// permission-dialog loops. Returns the worst severity found plus the
/// offending index windows.
pub fn detect_loops(usages: &[ToolUsage]) -> LoopDetection {
    let mut windows = Vec::new();
    let mut severity = LoopSeverity::None;

    let mut run_start = 0;
    for i in 1..=usages.len() {
        let same_as_prev = i < usages.len()
            && usages[i].tool_name == usages[run_start].tool_name
            && usages[i].tool_input == usages[run_start].tool_input;
        if !same_as_prev {
            let run_len = i - run_start;
            if run_len >= LOOP_REPETITION_THRESHOLD {
                windows.push((run_start, i - 1));
                severity = severity.max(if run_len >= LOOP_REPETITION_THRESHOLD * 2 {
                    LoopSeverity::High
                } else {
                    LoopSeverity::Medium
                });
            }
            run_start = i;
        }
    }

    if let Some(oscillation_window) = detect_oscillation(usages) {
        windows.push(oscillation_window);
        severity = severity.max(LoopSeverity::Low);
    }

    let permission_blocks = usages.iter().filter(|u| u.is_security_block()).count();
    if permission_blocks >= LOOP_REPETITION_THRESHOLD {
        severity = severity.max(LoopSeverity::Medium);
    }

    LoopDetection { severity, offending_windows: windows }
}

fn detect_oscillation(usages: &[ToolUsage]) -> Option<(usize, usize)> {
    if usages.len() < LOOP_OSCILLATION_THRESHOLD {
        return None;
    }
    for start in 0..=usages.len() - LOOP_OSCILLATION_THRESHOLD {
        let window = &usages[start..start + LOOP_OSCILLATION_THRESHOLD];
        let names: Vec<&str> = window.iter().map(|u| u.tool_name.as_str()).collect();
        let distinct: std::collections::HashSet<&str> = names.iter().copied().collect();
        if distinct.len() == 2 && names.iter().step_by(2).all(|n| *n == names[0]) {
            return Some((start, start + LOOP_OSCILLATION_THRESHOLD - 1));
        }
    }
    None
}

/// Stage 4: numstat-derived insertions/deletions since `baselines`' cached
/// start commit, commit count between HEADs, plus uncommitted changes.
/// Truncates the file-change list to the top 50 by total churn.
pub async fn diff_snapshot(repo_path: &Path, session_id: &str, baselines: &mut DiffBaselines) -> DiffSnapshot {
    let base = baselines.take(session_id);
    let commit_count = match &base {
        Some(b) => git::commit_count_since(repo_path, b).await,
        None => 0,
    };

    let committed = git::diff_numstat(repo_path, base.as_deref()).await;
    let uncommitted = git::diff_numstat(repo_path, None).await;

    let mut churn: HashMap<String, (u64, u64)> = HashMap::new();
    for (path, ins, del) in committed.iter().chain(uncommitted.iter()) {
        let entry = churn.entry(path.clone()).or_insert((0, 0));
        entry.0 += ins;
        entry.1 += del;
    }

    let mut files: Vec<FileChurn> = churn
        .into_iter()
        .map(|(path, (insertions, deletions))| FileChurn { path, insertions, deletions })
        .collect();
    files.sort_by_key(|f| std::cmp::Reverse(f.insertions + f.deletions));
    files.truncate(50);

    let uncommitted_insertions = uncommitted.iter().map(|(_, i, _)| i).sum();
    let uncommitted_deletions = uncommitted.iter().map(|(_, _, d)| d).sum();

    DiffSnapshot { commit_count, files, uncommitted_insertions, uncommitted_deletions }
}

/// Stage 5: composite of no-failures/has-commits/no-loops/has-tests
/// weights, normalised to 0-100.
pub fn quality_score(session: &Session, outcome: &OutcomeSignals, loops: &LoopDetection, diff: &DiffSnapshot) -> QualityScore {
    let mut score: i32 = 50;

    if outcome.failure_count == 0 {
        score += 20;
    } else {
        score -= (outcome.failure_count.min(4) * 5) as i32;
    }

    if !session.commits.is_empty() {
        score += 15;
    }

    score += match loops.severity {
        LoopSeverity::None => 15,
        LoopSeverity::Low => 5,
        LoopSeverity::Medium => -10,
        LoopSeverity::High => -25,
    };

    if outcome.tests_passed.unwrap_or(0) > 0 && outcome.tests_failed.unwrap_or(0) == 0 {
        score += 10;
    }

    if diff.commit_count == 0 && diff.uncommitted_insertions + diff.uncommitted_deletions == 0 {
        score -= 10;
    }

    let score = score.clamp(0, 100) as u8;
    QualityScore::new(score)
}

/// Run the full pipeline for `session` at session end and produce the
/// composite enrichment record.
pub async fn enrich_session(
    session: &Session,
    usages: &[ToolUsage],
    repo_path: &Path,
    baselines: &mut DiffBaselines,
    session_ref_key: String,
) -> EnrichmentRecord {
    let (task_type, language_tags) = auto_tags(usages);
    let outcome = outcome_signals(usages);
    let loop_detection = detect_loops(usages);
    let diff = diff_snapshot(repo_path, &session.id, baselines).await;
    let quality = quality_score(session, &outcome, &loop_detection, &diff);

    let mut auto_tags_combined = language_tags.clone();
    if let Some(t) = task_type {
        auto_tags_combined.insert(0, task_type_tag(t).to_string());
    }

    EnrichmentRecord {
        session_ref_key,
        auto_tags: auto_tags_combined,
        task_type,
        language_tags,
        outcome,
        loop_detection,
        diff_snapshot: diff,
        quality,
        annotation: Annotation::default(),
        source: PipelineSource::Hook,
        computed_at: chrono::Utc::now(),
    }
}
