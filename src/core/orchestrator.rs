//! Cycle Orchestrator
//!
//! One cycle per symbol: fetch -> fingerprint + fractal decomposition ->
//! agent evaluation -> oracle prediction -> performance/physiology update ->
//! audit. A symbol's session is locked for the whole cycle, so at most one
//! cycle per symbol runs at a time; distinct symbols run concurrently and
//! join once per round.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::fingerprint::Fingerprint;
use super::fractal::{FractalCache, FractalNode, FractalSummary};
use super::health::{CycleHealth, HealthStatus};
use super::metrics::{volatility, MetricPipeline};
use super::oracle::{DecisionOracle, Prediction};
use super::physiology::{PhysiologicalState, Stimulus};
use super::reflexive::{AuditRecord, DecisionKind, ReflexiveAgent, Recall};
use super::regime::{Regime, RegimeConfig};
use super::types::{Action, Series};
use crate::data::{AuditEntry, AuditLog, MarketDataSource};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Minimum cosine similarity for a memory recall
    pub similarity_threshold: f64,
    pub oracle_timeout: Duration,
    pub audit_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            oracle_timeout: Duration::from_millis(500),
            audit_timeout: Duration::from_millis(1_000),
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleKind {
    /// Data fetch failed; nothing was evaluated
    EmergencyHold,
    Decided(DecisionKind),
}

impl CycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleKind::EmergencyHold => "EMERGENCY_HOLD",
            CycleKind::Decided(kind) => kind.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub kind: CycleKind,
    pub action: Action,
    pub confidence: f64,
    /// Why the cycle was cut short, if it was
    pub reason: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub regime: Option<Regime>,
    pub physiology: PhysiologicalState,
    pub rule_id: Option<u64>,
    /// Sync-order context tag held next to the rule
    pub context_tag: Option<f64>,
    /// What the current rule alone would do
    pub rule_action: Action,
    pub score: Option<f64>,
    pub recall: Option<Recall>,
    pub fractal: Option<FractalSummary>,
    pub commit: Option<AuditRecord>,
    /// True when the oracle failed or timed out
    pub oracle_fallback: bool,
}

impl CycleOutcome {
    fn emergency_hold(symbol: &str, reason: String, physiology: PhysiologicalState) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            kind: CycleKind::EmergencyHold,
            action: Action::Hold,
            confidence: 0.0,
            reason: Some(reason),
            fingerprint: None,
            regime: None,
            physiology,
            rule_id: None,
            context_tag: None,
            rule_action: Action::Hold,
            score: None,
            recall: None,
            fractal: None,
            commit: None,
            oracle_fallback: false,
        }
    }

    pub fn is_emergency_hold(&self) -> bool {
        self.kind == CycleKind::EmergencyHold
    }

    fn audit_entry(&self, rule_json: String) -> AuditEntry {
        AuditEntry {
            timestamp: self.timestamp,
            symbol: self.symbol.clone(),
            fingerprint: self
                .fingerprint
                .as_ref()
                .and_then(|fp| serde_json::to_string(fp).ok())
                .unwrap_or_else(|| "null".to_string()),
            action: self.action.as_str().to_string(),
            confidence: self.confidence,
            rule: rule_json,
            decision: self.kind.as_str().to_string(),
        }
    }
}

/// Per-symbol state; one cycle holds the lock at a time
pub struct SymbolSession {
    agent: ReflexiveAgent,
    physiology: PhysiologicalState,
    health: CycleHealth,
    last_fingerprint: Option<Fingerprint>,
    last_action: Action,
    last_sample_time: Option<DateTime<Utc>>,
}

impl SymbolSession {
    pub fn new(agent: ReflexiveAgent) -> Self {
        Self {
            agent,
            physiology: PhysiologicalState::default(),
            health: CycleHealth::new(),
            last_fingerprint: None,
            last_action: Action::Hold,
            last_sample_time: None,
        }
    }

    pub fn agent(&self) -> &ReflexiveAgent {
        &self.agent
    }

    pub fn health(&self) -> &CycleHealth {
        &self.health
    }

    pub fn physiology(&self) -> &PhysiologicalState {
        &self.physiology
    }

    /// Log return from the previous cycle's last sample to the newest one.
    /// None when nothing new arrived or the previous sample left the window.
    fn realized_return(&self, series: &Series) -> Option<f64> {
        let last = series.last()?;
        let since = self.last_sample_time.filter(|t| last.time > *t)?;
        let anchor = series.samples().iter().rev().find(|s| s.time == since)?;
        if anchor.price > 0.0 && last.price > 0.0 {
            Some((last.price / anchor.price).ln())
        } else {
            None
        }
    }
}

pub struct CycleOrchestrator {
    source: Arc<dyn MarketDataSource>,
    oracle: Arc<dyn DecisionOracle>,
    audit: Arc<dyn AuditLog>,
    pipeline: Arc<MetricPipeline>,
    cache: Arc<FractalCache>,
    regime: RegimeConfig,
    config: OrchestratorConfig,
    sessions: HashMap<String, Arc<Mutex<SymbolSession>>>,
}

impl CycleOrchestrator {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        oracle: Arc<dyn DecisionOracle>,
        audit: Arc<dyn AuditLog>,
        pipeline: Arc<MetricPipeline>,
        cache: Arc<FractalCache>,
        regime: RegimeConfig,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            source,
            oracle,
            audit,
            pipeline,
            cache,
            regime,
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn add_symbol(&mut self, symbol: &str, agent: ReflexiveAgent) {
        self.sessions
            .insert(symbol.to_string(), Arc::new(Mutex::new(SymbolSession::new(agent))));
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.sessions.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn session(&self, symbol: &str) -> Option<Arc<Mutex<SymbolSession>>> {
        self.sessions.get(symbol).cloned()
    }

    pub fn cache(&self) -> &Arc<FractalCache> {
        &self.cache
    }

    /// One cycle for every symbol, concurrently; outcomes in symbol order
    pub async fn run_round(&self) -> Vec<CycleOutcome> {
        let symbols = self.symbols();
        join_all(symbols.iter().map(|s| self.run_cycle(s))).await
    }

    pub async fn run_cycle(&self, symbol: &str) -> CycleOutcome {
        let Some(session) = self.sessions.get(symbol) else {
            warn!("[CYCLE] Unknown symbol {}", symbol);
            return CycleOutcome::emergency_hold(symbol, "unknown symbol".to_string(), PhysiologicalState::default());
        };
        let mut session = session.lock().await;

        let series = match self.source.fetch(symbol).await {
            Ok(series) => series,
            Err(e) => {
                let status = session.health.record_emergency_hold();
                match status {
                    HealthStatus::Alert { consecutive } => {
                        warn!("[CYCLE] {} ALERT: {} consecutive emergency holds ({})", symbol, consecutive, e)
                    }
                    HealthStatus::Degraded { consecutive } => {
                        warn!("[CYCLE] {} degraded: {} consecutive emergency holds ({})", symbol, consecutive, e)
                    }
                    HealthStatus::Healthy => warn!("[CYCLE] {} emergency hold: {}", symbol, e),
                }
                let outcome = CycleOutcome::emergency_hold(symbol, e.to_string(), session.physiology);
                session.last_action = Action::Hold;
                self.append_audit(&outcome, "null".to_string()).await;
                return outcome;
            }
        };

        // Close out the previous decision with the return that followed it
        let realized = session.realized_return(&series);
        let pnl = realized.map(|r| session.last_action.direction() * r).unwrap_or(0.0);
        if let (Some(r), Some(prev)) = (realized, session.last_fingerprint.take()) {
            session.agent.record_outcome(prev, r);
        }

        let (fingerprint, nodes) = self.analyse(series.clone()).await;
        let regime = self
            .regime
            .classify(fingerprint.realized_vol, volatility::momentum(&series.prices()));
        session.physiology = session.physiology.update(&Stimulus {
            volatility: fingerprint.realized_vol,
            pnl,
            regime,
        });

        let recall = session.agent.recall(&fingerprint, self.config.similarity_threshold);
        let decision = session.agent.evaluate(&fingerprint);
        let physiology = session.physiology;

        let (prediction, oracle_fallback) =
            match tokio::time::timeout(self.config.oracle_timeout, self.oracle.predict(&fingerprint, &physiology)).await {
                Ok(Ok(prediction)) => (prediction, false),
                Ok(Err(e)) => {
                    warn!("[CYCLE] {} oracle failed: {}", symbol, e);
                    (Prediction::fallback(), true)
                }
                Err(_) => {
                    warn!("[CYCLE] {} oracle timed out after {:?}", symbol, self.config.oracle_timeout);
                    (Prediction::fallback(), true)
                }
            };

        session.last_fingerprint = Some(fingerprint.clone());
        session.last_action = prediction.action;
        session.last_sample_time = series.last().map(|s| s.time);
        session.health.record_success();

        let outcome = CycleOutcome {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            kind: CycleKind::Decided(decision.kind),
            action: prediction.action,
            confidence: prediction.confidence,
            reason: None,
            regime: Some(regime),
            physiology,
            rule_id: Some(decision.rule.id),
            context_tag: decision.context_tag,
            rule_action: decision.action,
            score: decision.score,
            recall,
            fractal: Some(FractalSummary::from_nodes(&nodes)),
            commit: decision.audit,
            oracle_fallback,
            fingerprint: Some(fingerprint),
        };
        info!(
            "[CYCLE] {} {} {} conf={:.2} regime={} rule=#{} {}",
            symbol,
            outcome.kind.as_str(),
            outcome.action,
            outcome.confidence,
            regime,
            decision.rule.id,
            outcome.fingerprint.as_ref().map(|fp| fp.summary()).unwrap_or_default()
        );

        let rule_json = serde_json::to_string(decision.rule.as_ref()).unwrap_or_else(|_| "null".to_string());
        self.append_audit(&outcome, rule_json).await;
        outcome
    }

    /// Fingerprint and fractal decomposition off the async executor
    async fn analyse(&self, series: Series) -> (Fingerprint, Arc<Vec<FractalNode>>) {
        let pipeline = Arc::clone(&self.pipeline);
        let cache = Arc::clone(&self.cache);
        let fallback_len = series.len();
        let fallback_time = series.last().map(|s| s.time).unwrap_or_default();
        let task = tokio::task::spawn_blocking(move || {
            let fingerprint = pipeline.fingerprint(&series);
            let nodes = cache.get_or_compute(&series);
            (fingerprint, nodes)
        });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("[CYCLE] metric task failed: {}", e);
                (Fingerprint::neutral(fallback_len, fallback_time), Arc::new(Vec::new()))
            }
        }
    }

    /// Blocking-pool append under a bounded timeout; failures are logged only
    async fn append_audit(&self, outcome: &CycleOutcome, rule_json: String) {
        let entry = outcome.audit_entry(rule_json);
        let audit = Arc::clone(&self.audit);
        let task = tokio::task::spawn_blocking(move || audit.append(&entry));
        match tokio::time::timeout(self.config.audit_timeout, task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("[AUDIT] append failed for {}: {}", outcome.symbol, e),
            Ok(Err(e)) => warn!("[AUDIT] append task failed for {}: {}", outcome.symbol, e),
            Err(_) => warn!("[AUDIT] append timed out for {}", outcome.symbol),
        }
    }

    /// Flush the audit log (called at shutdown)
    pub async fn flush(&self) -> anyhow::Result<()> {
        let audit = Arc::clone(&self.audit);
        tokio::task::spawn_blocking(move || audit.flush()).await??;
        Ok(())
    }

    /// Write every symbol's memory to `<dir>/<SYMBOL>.json`
    pub async fn save_memories(&self, dir: &Path) -> anyhow::Result<usize> {
        std::fs::create_dir_all(dir)?;
        let mut saved = 0;
        for (symbol, session) in &self.sessions {
            let session = session.lock().await;
            session.agent.memory().save(dir.join(format!("{}.json", symbol)))?;
            debug!("[MEMORY] Saved {} records for {}", session.agent.memory().len(), symbol);
            saved += 1;
        }
        Ok(saved)
    }

    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }
}
