//! End-to-end scenarios over the hook store, run against a real
//! temp-dir-backed store rather than the inline unit tests' smaller
//! fixtures. Each test is a literal walk-through of one lifecycle scenario.

use agentwatch::hooks::HookStore;
use agentwatch::models::SessionSource;
use std::collections::HashMap;
use std::sync::Mutex;

// `AGENTWATCH_HOME` is process-global, so these tests can't run concurrently
// against distinct temp dirs. Serialize them with a lock rather than fight
// the test harness over `--test-threads=1`.
static HOME_LOCK: Mutex<()> = Mutex::new(());

fn with_temp_home<T>(f: impl FnOnce() -> T) -> T {
    let _guard = HOME_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("AGENTWATCH_HOME", dir.path());
    f()
}

#[test]
fn happy_session_completes_one_tool_call() {
    with_temp_home(|| {
        let store = HookStore::load().unwrap();
        store.session_start("s1", Some("/t".into()), "/p", Some("default".into()), SessionSource::Startup).unwrap();
        store.record_pre_tool_use("s1", "t1", "Read", serde_json::json!({"file_path": "/p/a.ts"}), "/p");
        let usage = store
            .record_post_tool_use("t1", Some(serde_json::json!({"content": "..."})), None)
            .unwrap()
            .expect("pending usage should complete");
        assert!(usage.success());
        store.session_end("s1").unwrap();

        let session = store.session("s1").unwrap();
        assert_eq!(session.tool_call_count, 1);
        assert_eq!(session.tools_used.get("Read"), Some(&1));
        assert!(!session.active());

        let stats = store.tool_stats().into_iter().find(|s| s.tool_name == "Read").unwrap();
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 0);
    });
}

#[test]
fn orphan_post_tool_use_is_dropped() {
    with_temp_home(|| {
        let store = HookStore::load().unwrap();
        let result = store.record_post_tool_use("never", None, None).unwrap();
        assert!(result.is_none());
    });
}

#[test]
fn security_block_records_failed_usage_with_rule_and_reason() {
    with_temp_home(|| {
        let store = HookStore::load().unwrap();
        store.session_start("s2", None, "/p", None, SessionSource::Startup).unwrap();
        let usage = store
            .record_security_block("s2", "Bash", serde_json::json!({"command": "rm -rf /"}), Some("rule1"), Some("danger"))
            .unwrap();

        assert!(!usage.success());
        let error = usage.error.unwrap();
        assert!(error.starts_with("SECURITY_BLOCKED:"));
        assert!(error.contains("rule1"));
        assert!(error.contains("danger"));
    });
}

#[test]
fn commit_attribution_extracts_hash_and_message() {
    with_temp_home(|| {
        let store = HookStore::load().unwrap();
        store.session_start("s3", None, "/repo", None, SessionSource::Startup).unwrap();
        store.record_pre_tool_use("s3", "t2", "Bash", serde_json::json!({"command": "git commit"}), "/repo");
        store
            .record_post_tool_use("t2", Some(serde_json::json!({"stdout": "[main abc1234] feat: x"})), None)
            .unwrap();

        let session = store.session("s3").unwrap();
        assert_eq!(session.commits.len(), 1);
        assert_eq!(session.commits[0], "abc1234");
    });
}

#[test]
fn cost_accumulates_across_calls() {
    with_temp_home(|| {
        let store = HookStore::load().unwrap();
        store.session_start("s1", None, "/p", None, SessionSource::Startup).unwrap();
        store.update_session_tokens("s1", 1000, 500, 0.05).unwrap();
        store.update_session_tokens("s1", 2000, 800, 0.08).unwrap();

        let session = store.session("s1").unwrap();
        assert_eq!(session.total_input_tokens, 3000);
        assert_eq!(session.total_output_tokens, 1300);
        assert!((session.estimated_cost_usd - 0.13).abs() < 1e-9);
    });
}

#[test]
fn dead_process_reclamation_closes_bound_session() {
    with_temp_home(|| {
        let store = HookStore::load().unwrap();
        store.session_start("s4", None, "/p", None, SessionSource::Startup).unwrap();
        store.set_bound_pid("s4", 12345);

        let live_agents: HashMap<u32, (String, String)> = HashMap::new();
        let closed = store.reconcile_dead_sessions(&live_agents).unwrap();

        assert!(closed.contains(&"s4".to_string()));
        let session = store.session("s4").unwrap();
        assert!(session.end_time.is_some());
        assert!(!store.sessions().iter().any(|s| s.id == "s4" && s.active()));
    });
}
