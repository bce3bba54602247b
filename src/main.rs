use agentwatch::enrichment::store::EnrichmentStore;
use agentwatch::hooks::HookStore;
use agentwatch::live_store::LiveStore;
use agentwatch::scanner::port::PortScanner;
use agentwatch::scanner::process::{CwdResolution, HeuristicThresholds, Matcher, MatcherKind, ProcessScanner};
use agentwatch::scanner::repo::{FetchPolicy, RepoScannerConfig};
use agentwatch::{config, http, models, paths, scanner};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("agentwatch {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|a| a == "--help" || a == "-h") || args.first().map(String::as_str) == Some("help") {
        print_help();
        return Ok(());
    }

    match args.first().map(String::as_str) {
        Some("daemon") => run_daemon(&args[1..]).await,
        Some("doctor") => run_doctor(),
        Some(cmd @ ("tui" | "web" | "run")) => {
            println!("agentwatch: '{cmd}' is not implemented by the core daemon.");
            Ok(())
        }
        Some(other) => {
            eprintln!("agentwatch: unknown command '{other}'\n");
            print_help();
            std::process::exit(1);
        }
        None => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        "agentwatch {}\n\n\
         USAGE:\n    agentwatch <command> [options]\n\n\
         COMMANDS:\n    \
         daemon [--config <path>]   run the scanners, hook store, and HTTP/WS surface\n    \
         doctor                     check environment and print resolved config\n    \
         tui, web, run              recognized, not implemented by this daemon\n    \
         --version, -V              print the version\n    \
         --help, -h                 print this message\n",
        env!("CARGO_PKG_VERSION")
    );
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn get_flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).map(String::as_str)
}

async fn run_daemon(args: &[String]) -> Result<()> {
    init_tracing();

    let config = match get_flag(args, "--config") {
        Some(path) => config::load_from(std::path::Path::new(path)).context("loading --config file")?,
        None => config::load().context("loading config")?,
    };

    paths::ensure_dirs().context("creating ~/.agentwatch layout")?;
    tracing::info!(host = %config.watcher.host, port = config.watcher.port, "starting agentwatch daemon");

    let live = Arc::new(LiveStore::new());
    let hooks = Arc::new(HookStore::load().context("loading hook store")?);
    let connections = Arc::new(http::ws::ConnectionManager::new());
    let enrichment = Arc::new(EnrichmentStore::load().context("loading enrichment store")?);

    let listener = http::bind_with_fallback(&config.watcher.host, config.watcher.port)
        .await
        .context("binding HTTP listener")?;

    tokio::spawn(run_process_scanner(live.clone(), hooks.clone(), config.clone()));
    tokio::spawn(run_repo_scanner(live.clone(), config.clone()));
    tokio::spawn(run_port_scanner(live.clone(), config.clone()));
    tokio::spawn(run_cleanup_loop(hooks.clone()));

    let state = http::AppState { live, hooks, connections, enrichment };
    http::serve(state, listener).await.context("running HTTP server")?;
    Ok(())
}

fn matchers_from_config(matchers: &[config::MatcherConfigEntry]) -> Vec<Matcher> {
    if matchers.is_empty() {
        return scanner::process::default_matchers();
    }
    matchers
        .iter()
        .map(|m| {
            let kind = match m.kind.as_str() {
                "cmd_regex" => MatcherKind::CmdRegex,
                "cmd_substring" => MatcherKind::CmdSubstring,
                _ => MatcherKind::ExeBasename,
            };
            Matcher { label: m.label.clone(), kind, pattern: m.pattern.clone() }
        })
        .collect()
}

/// Ticks the process scanner on its own interval, replaces the live
/// store's agent table, and feeds the resulting live-agent set into the
/// hook store's dead-session reconciliation and session↔process binding.
async fn run_process_scanner(live: Arc<LiveStore>, hooks: Arc<HookStore>, config: config::Config) {
    let cwd_resolution = match config.monitor.cwd_resolution.as_str() {
        "on" => CwdResolution::On,
        "off" => CwdResolution::Off,
        _ => CwdResolution::BestEffort,
    };
    let thresholds = HeuristicThresholds {
        active_cpu_percent: config.heuristic.active_cpu_percent,
        stalled_quiet_seconds: config.heuristic.stalled_quiet_seconds,
    };
    let mut scanner = ProcessScanner::new(
        matchers_from_config(&config.matchers),
        cwd_resolution,
        thresholds,
        config.monitor.process_refresh_secs,
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.monitor.process_refresh_secs.max(1)));
    loop {
        ticker.tick().await;
        let (agents, ended) = scanner.tick();
        tracing::debug!(discovered = agents.len(), ended = ended.len(), "process scan tick");

        for pid in ended {
            live.evict_wrapper_state(pid);
        }

        let live_agents: HashMap<u32, (String, String)> = agents
            .iter()
            .map(|a| (a.pid, (a.cwd.clone().unwrap_or_default(), a.label.clone())))
            .collect();

        live.replace_agents(agents);

        hooks.match_sessions_to_agents(&live_agents);
        if let Err(err) = hooks.reconcile_dead_sessions(&live_agents) {
            tracing::warn!(%err, "dead-session reconciliation failed");
        }
    }
}

/// Two-rhythm repo scan: a fast pass on every tick, a slow pass (discovery
/// + upstream refresh) once every few ticks.
async fn run_repo_scanner(live: Arc<LiveStore>, config: config::Config) {
    let fetch_policy = match config.repo.fetch_policy.as_str() {
        "auto" => FetchPolicy::Auto,
        _ => FetchPolicy::Off,
    };
    let scanner_config = RepoScannerConfig {
        roots: config.roots.paths,
        ignore_dirs: config.roots.ignore_dirs,
        fetch_policy,
        max_walk_depth: 4,
    };

    let slow_every = (config.repo.slow_refresh_secs / config.repo.fast_refresh_secs.max(1)).max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.repo.fast_refresh_secs.max(1)));
    let mut tick_count: u64 = 0;

    loop {
        ticker.tick().await;
        tick_count += 1;

        let mut paths = scanner::repo::discover_repos(&scanner_config);
        for existing in live.repos() {
            let path = std::path::PathBuf::from(&existing.path);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }

        let mut snapshots = Vec::with_capacity(paths.len());
        for path in &paths {
            let existing = live.repo(&models::RepoSnapshot::stable_id(&path.to_string_lossy()));
            let mut snapshot = scanner::repo::fast_scan(path, existing.as_ref()).await;
            if tick_count % slow_every == 0 {
                scanner::repo::slow_scan(path, &mut snapshot, scanner_config.fetch_policy).await;
            }
            snapshots.push(snapshot);
        }

        tracing::debug!(repos = snapshots.len(), "repo scan tick");
        live.replace_repos(snapshots);
    }
}

async fn run_port_scanner(live: Arc<LiveStore>, config: config::Config) {
    let mut scanner = PortScanner::new(config.monitor.low_port_guard);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.monitor.port_refresh_secs.max(1)));
    loop {
        ticker.tick().await;
        let agents = live.agents();
        let ports = scanner.tick(&agents);
        tracing::debug!(listening = ports.len(), "port scan tick");
        live.replace_ports(ports);
    }
}

/// Periodic eviction of stale tool usages and retired sessions,
/// independent of the scanner timers.
async fn run_cleanup_loop(hooks: Arc<HookStore>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(3600));
    loop {
        ticker.tick().await;
        hooks.run_cleanup();
    }
}

fn run_doctor() -> Result<()> {
    println!("agentwatch doctor");
    println!();

    let mut pass = 0u32;
    let mut fail = 0u32;

    let base = paths::base_dir();
    if base.exists() || std::fs::create_dir_all(&base).is_ok() {
        println!("  ok   ~/.agentwatch is writable ({})", base.display());
        pass += 1;
    } else {
        println!("  FAIL ~/.agentwatch is not writable ({})", base.display());
        fail += 1;
    }

    match config::load() {
        Ok(config) => {
            println!("  ok   config resolved: watcher {}:{}", config.watcher.host, config.watcher.port);
            println!("       roots: {:?}", config.roots.paths);
            pass += 1;
        }
        Err(err) => {
            println!("  FAIL config failed to load: {err}");
            fail += 1;
        }
    }

    match std::process::Command::new("git").arg("--version").output() {
        Ok(output) if output.status.success() => {
            println!("  ok   git available");
            pass += 1;
        }
        _ => {
            println!("  FAIL git not found on PATH");
            fail += 1;
        }
    }

    println!();
    println!("  {pass} passed, {fail} failed");
    Ok(())
}
