//! Replay Runner
//!
//! Steps a historical CSV through the full cycle, one sample per cycle, and
//! prints what the agent and oracle did.
//!
//! Usage:
//!   cargo run --bin replay data/EURUSD.csv
//!   cargo run --bin replay data/EURUSD.csv EURUSD 256

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use reflexive::core::{
    AgentConfig, CycleKind, CycleOrchestrator, DecisionKind, FractalCache, FractalConfig, LinearOracle, MetricPipeline,
    MetricsConfig, OrchestratorConfig, PerformanceConfig, ReflexiveAgent, RegimeConfig, SemanticMemory,
};
use reflexive::data::{parse_csv, ReplaySource, SqliteAuditLog};

const SEP: &str = "================================================================";

fn usage() {
    println!("{}", SEP);
    println!("                    REFLEXIVE REPLAY                           ");
    println!("{}", SEP);
    println!();
    println!("Usage: replay <csv_file> [symbol] [lookback]");
    println!();
    println!("Arguments:");
    println!("  csv_file  Path to historical data (required)");
    println!("  symbol    Symbol name (default: derived from filename)");
    println!("  lookback  Samples per window (default: 256)");
    println!();
    println!("CSV Format: timestamp,price,volume[,bid_volume,ask_volume]");
    println!("  - timestamp: Unix epoch seconds or RFC 3339");
    println!("  - First row is header (skipped)");
    println!("{}", SEP);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage();
        return Ok(());
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let csv_path = &args[1];
    let symbol = match args.get(2) {
        Some(s) => s.clone(),
        None => std::path::Path::new(csv_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("UNKNOWN")
            .split('_')
            .next()
            .unwrap_or("UNKNOWN")
            .to_string(),
    };
    let lookback: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(256);

    println!("{}", SEP);
    println!("Loading: {}", csv_path);
    println!("Symbol:  {}", symbol);

    let series = parse_csv(&symbol, &std::fs::read_to_string(csv_path)?)?;
    let prices = series.prices();
    if series.len() <= lookback {
        println!("Need more than {} samples, got {}.", lookback, series.len());
        return Ok(());
    }
    if let (Some(first), Some(last)) = (series.samples().first(), series.last()) {
        println!("Period:  {} to {}", first.time.format("%Y-%m-%d %H:%M"), last.time.format("%Y-%m-%d %H:%M"));
        println!("Price:   {:.4} to {:.4}", first.price, last.price);
    }

    let source = Arc::new(ReplaySource::new(lookback));
    source.add(series);

    let audit_path = format!("replay_{}.db", symbol);
    let _ = std::fs::remove_file(&audit_path);
    let audit = SqliteAuditLog::open(&audit_path, 256)?;

    let mut orchestrator = CycleOrchestrator::new(
        source.clone(),
        Arc::new(LinearOracle::new()),
        Arc::new(audit),
        Arc::new(MetricPipeline::new(MetricsConfig::default())),
        Arc::new(FractalCache::new(FractalConfig::default())),
        RegimeConfig::default(),
        OrchestratorConfig::default(),
    );
    let agent = ReflexiveAgent::new(
        AgentConfig {
            seed: Some(7),
            ..AgentConfig::default()
        },
        SemanticMemory::new(512),
        PerformanceConfig::default(),
    );
    orchestrator.add_symbol(&symbol, agent);

    println!();
    println!("Replaying {} cycles...", source.remaining(&symbol));
    println!();

    let mut actions: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut regimes: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut decisions: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut pnl = 0.0;
    let mut agreement = 0u64;
    let mut cycles = 0u64;

    // Window end index of the current cycle
    let mut end = lookback - 1;
    while source.remaining(&symbol) > 0 {
        let outcome = orchestrator.run_cycle(&symbol).await;
        cycles += 1;
        *actions.entry(outcome.action.as_str()).or_default() += 1;
        *decisions.entry(outcome.kind.as_str()).or_default() += 1;
        if let Some(regime) = outcome.regime {
            *regimes.entry(regime.as_str()).or_default() += 1;
        }
        if outcome.action == outcome.rule_action {
            agreement += 1;
        }
        if let CycleKind::Decided(DecisionKind::Committed) = outcome.kind {
            if let Some(record) = &outcome.commit {
                println!(
                    "COMMIT  #{:<4} gen={:<3} score={:+.3}  {}",
                    record.rule_id,
                    record.generation,
                    record.score,
                    record.fingerprint.summary()
                );
            }
        }
        if end + 1 < prices.len() && prices[end] > 0.0 && prices[end + 1] > 0.0 {
            pnl += outcome.action.direction() * (prices[end + 1] / prices[end]).ln();
        }
        end += 1;
    }
    orchestrator.flush().await?;

    println!();
    println!("{}", SEP);
    println!("  SUMMARY: {}", symbol);
    println!("{}", SEP);
    println!("Cycles:           {}", cycles);
    for (action, n) in &actions {
        println!("  {:<16}{}", action, n);
    }
    println!("Decisions:");
    for (kind, n) in &decisions {
        println!("  {:<16}{}", kind, n);
    }
    println!("Regimes:");
    for (regime, n) in &regimes {
        println!("  {:<16}{}", regime, n);
    }
    println!(
        "Oracle/rule agreement: {:.1}%",
        if cycles == 0 { 0.0 } else { agreement as f64 / cycles as f64 * 100.0 }
    );
    println!("Cumulative log P&L:    {:+.4}", pnl);
    println!(
        "Fractal cache:         {} hits / {} misses",
        orchestrator.cache().hits(),
        orchestrator.cache().misses()
    );
    println!("Audit log:             {}", audit_path);
    println!("{}", SEP);
    Ok(())
}
