//! Performance tracking for rule scoring
//!
//! Holds (fingerprint, realized next-period log return) pairs. A rule is
//! scored by replaying its direction over the stored fingerprints.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;
use super::metrics::stats;
use super::rule::StrategyRule;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Pairs retained
    pub window: usize,
    /// Active pairs needed before a score is non-zero
    pub min_samples: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            window: 250,
            min_samples: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    config: PerformanceConfig,
    outcomes: VecDeque<(Fingerprint, f64)>,
}

impl PerformanceTracker {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(config.window.max(1)),
            config,
        }
    }

    /// Record the return realized after `fingerprint` was observed
    pub fn record(&mut self, fingerprint: Fingerprint, next_return: f64) {
        if !next_return.is_finite() {
            return;
        }
        if self.outcomes.len() >= self.config.window.max(1) {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back((fingerprint, next_return));
    }

    /// Sharpe-like score: mean / std * sqrt(m) of direction * return over
    /// the m pairs where the rule is active. 0 when too few or no dispersion.
    pub fn score(&self, rule: &StrategyRule) -> f64 {
        let pnl: Vec<f64> = self
            .outcomes
            .iter()
            .filter_map(|(fp, r)| {
                let direction = rule.direction(fp);
                (direction != 0.0).then_some(direction * r)
            })
            .collect();
        if pnl.len() < self.config.min_samples.max(2) {
            return 0.0;
        }
        let sd = stats::std_dev(&pnl);
        if sd <= 1e-12 {
            return 0.0;
        }
        let score = stats::mean(&pnl) / sd * (pnl.len() as f64).sqrt();
        if score.is_finite() {
            score
        } else {
            0.0
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(PerformanceConfig::default())
    }
}
