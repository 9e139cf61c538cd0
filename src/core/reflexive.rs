//! Reflexive Agent - holds, mutates, commits or rolls back its strategy rule
//!
//! Every fingerprint goes through the instability predicate. A quiet regime
//! only updates the agent's context. An emergent shift triggers a proposal:
//! the current rule is mutated, scored on recent realized returns, and either
//! committed (and remembered) or discarded in favour of the exact prior rule.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::fingerprint::{Fingerprint, Metric};
use super::memory::{InsertOutcome, MemoryRecord, SemanticMemory};
use super::metrics::stats;
use super::performance::{PerformanceConfig, PerformanceTracker};
use super::rule::{StrategyRule, ACTION_KEY};
use super::types::Action;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Sync threshold used until enough history exists
    pub sync_base_threshold: f64,
    /// Sync orders kept for the adaptive threshold
    pub sync_window: usize,
    /// Adaptive threshold = mean + k * std
    pub sync_k: f64,
    pub sync_min_history: usize,
    pub entropy_threshold: f64,
    pub curvature_threshold: f64,
    pub ism_low: f64,
    pub ism_high: f64,
    pub mutation_sigma: f64,
    /// Score a candidate must beat to be committed
    pub commit_threshold: f64,
    /// Fingerprints kept in the learning trace
    pub trace_len: usize,
    /// Mutation RNG seed; random when unset
    pub seed: Option<u64>,
    pub initial_thresholds: BTreeMap<String, f64>,
    pub initial_action: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sync_base_threshold: 0.75,
            sync_window: 50,
            sync_k: 1.0,
            sync_min_history: 10,
            entropy_threshold: -0.05,
            curvature_threshold: -0.1,
            ism_low: 0.2,
            ism_high: 1.2,
            mutation_sigma: 0.05,
            commit_threshold: 0.5,
            trace_len: 256,
            seed: None,
            initial_thresholds: BTreeMap::from([
                ("sync_order".to_string(), 0.6),
                ("hurst_exponent".to_string(), 0.5),
            ]),
            initial_action: "BUY".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn initial_rule(&self) -> StrategyRule {
        let template = BTreeMap::from([(ACTION_KEY.to_string(), self.initial_action.to_ascii_uppercase())]);
        StrategyRule::new(1, self.initial_thresholds.clone(), template)
    }
}

/// Emergent-regime predicate. All four conditions must hold and none of the
/// inputs may be degraded.
pub fn instability_predicate(fp: &Fingerprint, sync_threshold: f64, config: &AgentConfig) -> bool {
    let inputs = [Metric::SyncOrder, Metric::Entropy, Metric::Curvature, Metric::Instability];
    if inputs.iter().any(|m| fp.is_degraded(*m)) {
        return false;
    }
    fp.sync_order > sync_threshold
        && fp.entropy_delta < config.entropy_threshold
        && fp.curvature < config.curvature_threshold
        && fp.instability >= config.ism_low
        && fp.instability <= config.ism_high
}

#[derive(Debug, Clone)]
pub enum AgentState {
    Stable {
        rule: Arc<StrategyRule>,
    },
    Proposing {
        candidate: Arc<StrategyRule>,
        prior: Arc<StrategyRule>,
    },
}

impl AgentState {
    /// Rule in force (the prior while a proposal is pending)
    pub fn rule(&self) -> &Arc<StrategyRule> {
        match self {
            AgentState::Stable { rule } => rule,
            AgentState::Proposing { prior, .. } => prior,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    /// No emergent shift; rule unchanged
    Held,
    /// Candidate beat the commit threshold
    Committed,
    /// Candidate discarded; prior rule restored
    RolledBack,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Held => "HELD",
            DecisionKind::Committed => "COMMITTED",
            DecisionKind::RolledBack => "ROLLED_BACK",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of a committed mutation, handed to the orchestrator for the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub rule_id: u64,
    pub parent_id: Option<u64>,
    pub generation: u32,
    pub score: f64,
    pub fingerprint: Fingerprint,
    pub rule: StrategyRule,
}

#[derive(Debug, Clone)]
pub struct AgentDecision {
    pub kind: DecisionKind,
    /// Rule in force after the decision
    pub rule: Arc<StrategyRule>,
    /// Action the rule takes on this fingerprint
    pub action: Action,
    /// Candidate score when a proposal was made
    pub score: Option<f64>,
    pub audit: Option<AuditRecord>,
    /// Memory record dropped by the commit, if capacity was reached
    pub evicted: Option<MemoryRecord>,
    /// Sync order tagged on the rule by the last quiet cycle
    pub context_tag: Option<f64>,
}

/// Best memory match for a fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct Recall {
    pub similarity: f64,
    pub efficiency: f64,
    pub rule_id: u64,
}

pub struct ReflexiveAgent {
    config: AgentConfig,
    state: AgentState,
    memory: SemanticMemory,
    performance: PerformanceTracker,
    sync_history: VecDeque<f64>,
    trace: VecDeque<Fingerprint>,
    context_tag: Option<f64>,
    rng: StdRng,
    next_rule_id: u64,
    commits: u64,
    rollbacks: u64,
}

impl ReflexiveAgent {
    pub fn new(config: AgentConfig, memory: SemanticMemory, performance: PerformanceConfig) -> Self {
        let rule = config.initial_rule();
        Self::with_rule(config, memory, performance, rule)
    }

    pub fn with_rule(config: AgentConfig, memory: SemanticMemory, performance: PerformanceConfig, rule: StrategyRule) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        // Continue numbering past anything already remembered
        let max_known = memory.records().iter().map(|r| r.rule.id).max().unwrap_or(0);
        Self {
            next_rule_id: rule.id.max(max_known) + 1,
            state: AgentState::Stable { rule: Arc::new(rule) },
            memory,
            performance: PerformanceTracker::new(performance),
            sync_history: VecDeque::with_capacity(config.sync_window.max(1)),
            trace: VecDeque::with_capacity(config.trace_len.max(1)),
            context_tag: None,
            rng,
            commits: 0,
            rollbacks: 0,
            config,
        }
    }

    /// Adaptive sync threshold: mean + k * std of recent sync orders, or the
    /// base threshold until enough history exists
    pub fn sync_threshold(&self) -> f64 {
        if self.sync_history.len() < self.config.sync_min_history.max(2) {
            return self.config.sync_base_threshold;
        }
        let history: Vec<f64> = self.sync_history.iter().copied().collect();
        stats::mean(&history) + self.config.sync_k * stats::std_dev(&history)
    }

    pub fn detect_instability(&self, fp: &Fingerprint) -> bool {
        instability_predicate(fp, self.sync_threshold(), &self.config)
    }

    /// Run one fingerprint through the agent
    pub fn evaluate(&mut self, fp: &Fingerprint) -> AgentDecision {
        let unstable = self.detect_instability(fp);
        if !fp.is_degraded(Metric::SyncOrder) {
            if self.sync_history.len() >= self.config.sync_window.max(1) {
                self.sync_history.pop_front();
            }
            self.sync_history.push_back(fp.sync_order);
        }

        if !unstable {
            self.learn(fp);
            let rule = Arc::clone(self.state.rule());
            return AgentDecision {
                kind: DecisionKind::Held,
                action: rule.action(fp),
                rule,
                score: None,
                audit: None,
                evicted: None,
                context_tag: self.context_tag,
            };
        }

        let prior = Arc::clone(self.state.rule());
        let candidate = Arc::new(prior.mutate(self.next_rule_id, self.config.mutation_sigma, &mut self.rng));
        self.next_rule_id += 1;
        self.state = AgentState::Proposing {
            candidate: Arc::clone(&candidate),
            prior: Arc::clone(&prior),
        };

        let score = self.performance.score(&candidate);
        if score > self.config.commit_threshold {
            self.commit(fp, candidate, score)
        } else {
            self.rollback(fp, score)
        }
    }

    fn learn(&mut self, fp: &Fingerprint) {
        if self.trace.len() >= self.config.trace_len.max(1) {
            self.trace.pop_front();
        }
        self.trace.push_back(fp.clone());
        self.context_tag = Some(fp.sync_order);
    }

    fn commit(&mut self, fp: &Fingerprint, candidate: Arc<StrategyRule>, score: f64) -> AgentDecision {
        info!(
            "[AGENT] Committed rule #{} (gen {}, parent {:?}) score {:.3}",
            candidate.id, candidate.generation, candidate.parent_id, score
        );
        let evicted = match self.memory.insert(fp.clone(), (*candidate).clone(), score) {
            InsertOutcome::Stored => None,
            InsertOutcome::Evicted(record) => {
                debug!("[AGENT] Memory full, evicted rule #{} ({:.3})", record.rule.id, record.efficiency);
                Some(record)
            }
        };
        let audit = AuditRecord {
            timestamp: Utc::now(),
            rule_id: candidate.id,
            parent_id: candidate.parent_id,
            generation: candidate.generation,
            score,
            fingerprint: fp.clone(),
            rule: (*candidate).clone(),
        };
        self.state = AgentState::Stable { rule: Arc::clone(&candidate) };
        self.commits += 1;
        AgentDecision {
            kind: DecisionKind::Committed,
            action: candidate.action(fp),
            rule: candidate,
            score: Some(score),
            audit: Some(audit),
            evicted,
            context_tag: self.context_tag,
        }
    }

    fn rollback(&mut self, fp: &Fingerprint, score: f64) -> AgentDecision {
        let placeholder = AgentState::Stable { rule: Arc::clone(self.state.rule()) };
        let prior = match std::mem::replace(&mut self.state, placeholder) {
            AgentState::Proposing { candidate, prior } => {
                debug!("[AGENT] Rolled back candidate #{} (score {:.3})", candidate.id, score);
                prior
            }
            AgentState::Stable { rule } => rule,
        };
        self.state = AgentState::Stable { rule: Arc::clone(&prior) };
        self.rollbacks += 1;
        AgentDecision {
            kind: DecisionKind::RolledBack,
            action: prior.action(fp),
            rule: prior,
            score: Some(score),
            audit: None,
            evicted: None,
            context_tag: self.context_tag,
        }
    }

    /// Feed the realized return that followed a fingerprint
    pub fn record_outcome(&mut self, fp: Fingerprint, next_return: f64) {
        self.performance.record(fp, next_return);
    }

    /// Most similar remembered regime above `threshold`
    pub fn recall(&self, fp: &Fingerprint, threshold: f64) -> Option<Recall> {
        self.memory.retrieve(fp, threshold).first().map(|(similarity, record)| Recall {
            similarity: *similarity,
            efficiency: record.efficiency,
            rule_id: record.rule.id,
        })
    }

    pub fn current_rule(&self) -> &Arc<StrategyRule> {
        self.state.rule()
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn memory(&self) -> &SemanticMemory {
        &self.memory
    }

    pub fn context_tag(&self) -> Option<f64> {
        self.context_tag
    }

    pub fn trace_len(&self) -> usize {
        self.trace.len()
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig {
            seed: Some(7),
            mutation_sigma: 0.01,
            ..AgentConfig::default()
        }
    }

    fn shift() -> Fingerprint {
        let mut fp = Fingerprint::neutral(200, Utc::now());
        fp.degraded.clear();
        fp.sync_order = 0.9;
        fp.entropy_delta = -0.1;
        fp.curvature = -0.2;
        fp.instability = 0.5;
        fp.hurst_exponent = 0.6;
        fp
    }

    fn agent() -> ReflexiveAgent {
        ReflexiveAgent::new(config(), SemanticMemory::new(8), PerformanceConfig { window: 100, min_samples: 5 })
    }

    #[test]
    fn test_predicate_scenario() {
        let cfg = config();
        assert!(instability_predicate(&shift(), 0.75, &cfg));

        let mut calm = shift();
        calm.entropy_delta = 0.1;
        assert!(!instability_predicate(&calm, 0.75, &cfg));

        let mut out_of_band = shift();
        out_of_band.instability = 1.5;
        assert!(!instability_predicate(&out_of_band, 0.75, &cfg));
    }

    #[test]
    fn test_degraded_input_never_triggers() {
        let mut fp = shift();
        fp.mark_degraded(Metric::Curvature);
        assert!(!instability_predicate(&fp, 0.75, &config()));
    }

    #[test]
    fn test_quiet_regime_holds_same_rule() {
        let mut agent = agent();
        let before = Arc::clone(agent.current_rule());
        let mut fp = shift();
        fp.entropy_delta = 0.2;
        let decision = agent.evaluate(&fp);
        assert_eq!(decision.kind, DecisionKind::Held);
        assert!(Arc::ptr_eq(&before, agent.current_rule()));
        assert_eq!(agent.context_tag(), Some(0.9));
        assert_eq!(decision.context_tag, Some(0.9));
        assert_eq!(agent.trace_len(), 1);
    }

    #[test]
    fn test_rollback_restores_exact_prior() {
        let mut agent = agent();
        let before = Arc::clone(agent.current_rule());
        // no realized returns yet -> candidate scores 0
        let decision = agent.evaluate(&shift());
        assert_eq!(decision.kind, DecisionKind::RolledBack);
        assert!(Arc::ptr_eq(&before, agent.current_rule()));
        assert!(Arc::ptr_eq(&before, &decision.rule));
        assert!(matches!(agent.state(), AgentState::Stable { .. }));
        assert!(agent.memory().is_empty());
        assert_eq!(agent.rollbacks(), 1);
    }

    #[test]
    fn test_profitable_candidate_commits() {
        let mut agent = agent();
        for i in 0..30 {
            let r = if i % 5 == 0 { -0.001 } else { 0.003 };
            agent.record_outcome(shift(), r);
        }
        let before = Arc::clone(agent.current_rule());
        let decision = agent.evaluate(&shift());
        assert_eq!(decision.kind, DecisionKind::Committed);
        assert!(!Arc::ptr_eq(&before, agent.current_rule()));
        assert_eq!(agent.current_rule().generation, 1);
        assert_eq!(agent.current_rule().parent_id, Some(before.id));
        assert_eq!(agent.memory().len(), 1);

        let audit = decision.audit.unwrap();
        assert_eq!(audit.rule_id, agent.current_rule().id);
        // the remembered rule is a snapshot of the committed one
        assert_eq!(agent.memory().records()[0].rule, **agent.current_rule());
        assert!(agent.recall(&shift(), 0.9).is_some());
    }

    #[test]
    fn test_adaptive_threshold_kicks_in() {
        let mut agent = agent();
        assert_eq!(agent.sync_threshold(), 0.75);
        let mut fp = shift();
        fp.entropy_delta = 0.2;
        for i in 0..12 {
            fp.sync_order = 0.4 + 0.01 * i as f64;
            agent.evaluate(&fp);
        }
        let threshold = agent.sync_threshold();
        assert!(threshold > 0.4 && threshold < 0.6, "threshold {threshold}");
    }
}
