//! Reflexive - live regime cycle
//!
//! Loads `config.toml`, restores each symbol's memory snapshot, then runs one
//! cycle per symbol every interval until Ctrl-C. On shutdown the audit log is
//! flushed and memories are written back.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use reflexive::config::Config;
use reflexive::core::{
    CycleOrchestrator, FractalCache, LinearOracle, MetricPipeline, ReflexiveAgent, SemanticMemory,
};
use reflexive::data::{CsvMarketData, SqliteAuditLog};
use reflexive::status::SystemStatus;

const SEP: &str = "===========================================================";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let cfg = Config::load("config.toml").unwrap_or_else(|e| {
        eprintln!("Failed to load config.toml: {}. Exiting.", e);
        std::process::exit(1);
    });

    // Setup logging; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.system.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", SEP);
    info!("  {} - Reflexive Regime Engine", cfg.system.name);
    info!("  Symbols: {}", cfg.symbols.join(", "));
    info!("  Cycle interval: {}s", cfg.system.cycle_interval_secs);
    info!("{}", SEP);

    let oracle = match &cfg.oracle.weights {
        Some(path) => match LinearOracle::load(path) {
            Ok(oracle) => {
                info!("[ORACLE] Loaded weights from {}", path.display());
                oracle
            }
            Err(e) => {
                warn!("[ORACLE] Failed to load {}: {}. Using priors.", path.display(), e);
                LinearOracle::new()
            }
        },
        None => LinearOracle::new(),
    };
    info!("[ORACLE] {}", oracle.format_weights());

    let audit = SqliteAuditLog::open(&cfg.audit.path, cfg.audit.batch_size)?;
    if let Ok(count) = audit.count() {
        info!("[AUDIT] {} entries in {}", count, cfg.audit.path.display());
    }

    let mut orchestrator = CycleOrchestrator::new(
        Arc::new(CsvMarketData::new(&cfg.data.csv_dir, cfg.data.lookback)),
        Arc::new(oracle),
        Arc::new(audit),
        Arc::new(MetricPipeline::new(cfg.metrics.clone())),
        Arc::new(FractalCache::new(cfg.fractal.clone())),
        cfg.regime.clone(),
        cfg.orchestrator(),
    );

    for symbol in &cfg.symbols {
        let snapshot = cfg.memory.snapshot_dir.join(format!("{}.json", symbol));
        let memory = SemanticMemory::load_or_new(&snapshot, cfg.memory.capacity);
        info!("[MEMORY] {}: {} records restored", symbol, memory.len());
        let agent = ReflexiveAgent::new(cfg.agent.clone(), memory, cfg.performance.clone());
        orchestrator.add_symbol(symbol, agent);
    }

    let mut status = SystemStatus::load(&cfg.system.status_file);
    status.running = true;
    status.start_time = Utc::now().timestamp();

    let mut ticker = tokio::time::interval(cfg.cycle_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for outcome in orchestrator.run_round().await {
                    status.record(&outcome);
                }
                let purged = orchestrator.purge_cache();
                if purged > 0 {
                    info!("[CACHE] Purged {} expired decompositions", purged);
                }
                if let Err(e) = status.save(&cfg.system.status_file) {
                    warn!("Failed to write status file: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    if let Err(e) = orchestrator.flush().await {
        error!("[AUDIT] Flush failed: {}", e);
    }
    match orchestrator.save_memories(&cfg.memory.snapshot_dir).await {
        Ok(n) => info!("[MEMORY] Saved {} snapshots to {}", n, cfg.memory.snapshot_dir.display()),
        Err(e) => error!("[MEMORY] Snapshot failed: {}", e),
    }
    status.running = false;
    if let Err(e) = status.save(&cfg.system.status_file) {
        warn!("Failed to write status file: {}", e);
    }

    info!(
        "Stopped after {} cycles ({} emergency holds, {} commits, {} rollbacks)",
        status.cycles, status.emergency_holds, status.commits, status.rollbacks
    );
    Ok(())
}
