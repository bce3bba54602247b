//! Commit-hash extraction from a Bash tool's post-event response. Three
//! regexes in priority order, first match wins.

use regex::Regex;
use std::sync::OnceLock;

/// A commit reference parsed out of tool output, plus the best-effort
/// commit message found on the same line.
pub struct ParsedCommit {
    pub hash: String,
    pub message: String,
}

fn branch_path_hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[\w./-]+ ([0-9a-f]{7,40})\]").unwrap())
}

fn leading_hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^([0-9a-f]{7,40}) ").unwrap())
}

fn full_commit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"commit ([0-9a-f]{40})\b").unwrap())
}

/// Extract a commit hash + message from `output` (a Bash tool's stdout),
/// trying the three priority regexes in order. The message is truncated to
/// 200 chars.
pub fn extract_commit(output: &str) -> Option<ParsedCommit> {
    if let Some(caps) = branch_path_hash_re().captures(output) {
        let hash = caps.get(1)?.as_str().to_string();
        let line = output.lines().find(|l| l.contains(&hash)).unwrap_or("");
        let message = extract_message_after_bracket(line);
        return Some(ParsedCommit { hash, message: truncate(&message) });
    }
    if let Some(caps) = leading_hash_re().captures(output) {
        let hash = caps.get(1)?.as_str().to_string();
        let line = caps.get(0)?.as_str();
        let message = line.trim_start_matches(&hash).trim().to_string();
        return Some(ParsedCommit { hash, message: truncate(&message) });
    }
    if let Some(caps) = full_commit_re().captures(output) {
        let hash = caps.get(1)?.as_str().to_string();
        return Some(ParsedCommit { hash, message: String::new() });
    }
    None
}

fn extract_message_after_bracket(line: &str) -> String {
    line.split_once(']').map(|(_, rest)| rest.trim().to_string()).unwrap_or_default()
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 200 {
        s.chars().take(200).collect()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_branch_path_hash_form() {
        let out = "[main a1b2c3d] Fix the thing\n 1 file changed, 2 insertions(+)";
        let parsed = extract_commit(out).unwrap();
        assert_eq!(parsed.hash, "a1b2c3d");
        assert_eq!(parsed.message, "Fix the thing");
    }

    #[test]
    fn extracts_leading_hash_form() {
        let out = "a1b2c3d4 Fix the thing\nmore output";
        let parsed = extract_commit(out).unwrap();
        assert_eq!(parsed.hash, "a1b2c3d4");
        assert_eq!(parsed.message, "Fix the thing");
    }

    #[test]
    fn extracts_full_hex_commit_form() {
        let out = "commit 0123456789abcdef0123456789abcdef01234567\nAuthor: ...";
        let parsed = extract_commit(out).unwrap();
        assert_eq!(parsed.hash, "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn priority_prefers_branch_path_form_over_leading_hash() {
        let out = "a1b2c3d should not match first\n[main a1b2c3d] real message";
        let parsed = extract_commit(out).unwrap();
        assert_eq!(parsed.message, "real message");
    }

    #[test]
    fn returns_none_when_nothing_matches() {
        assert!(extract_commit("no commit here").is_none());
    }

    #[test]
    fn message_truncated_to_200_chars() {
        let long_msg = "x".repeat(300);
        let out = format!("[main a1b2c3d] {long_msg}");
        let parsed = extract_commit(&out).unwrap();
        assert_eq!(parsed.message.chars().count(), 200);
    }
}
