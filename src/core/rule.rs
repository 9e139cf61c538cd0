//! Strategy rules
//!
//! A rule is a set of metric thresholds plus an action template. Rules are
//! values: mutation produces a new rule and never touches the parent, so a
//! rule committed to memory stays exactly as it was stored.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;
use super::types::Action;

/// Template key holding the action taken when every threshold holds
pub const ACTION_KEY: &str = "action";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRule {
    pub id: u64,
    /// Fingerprint field name -> minimum value
    pub thresholds: BTreeMap<String, f64>,
    /// Action template, e.g. {"action": "BUY"}
    pub template: BTreeMap<String, String>,
    pub generation: u32,
    pub parent_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl StrategyRule {
    pub fn new(id: u64, thresholds: BTreeMap<String, f64>, template: BTreeMap<String, String>) -> Self {
        Self {
            id,
            thresholds,
            template,
            generation: 0,
            parent_id: None,
            created_at: Utc::now(),
        }
    }

    /// Templated action, if it parses as BUY/SELL/HOLD
    pub fn template_action(&self) -> Action {
        self.template
            .get(ACTION_KEY)
            .and_then(|a| Action::from_str(a))
            .unwrap_or(Action::Hold)
    }

    /// True when every known threshold holds (metric >= threshold).
    /// Names that are not fingerprint fields are ignored.
    pub fn matches(&self, fp: &Fingerprint) -> bool {
        self.thresholds
            .iter()
            .all(|(name, threshold)| fp.get(name).map_or(true, |value| value >= *threshold))
    }

    /// Action the rule takes on this fingerprint
    pub fn action(&self, fp: &Fingerprint) -> Action {
        if self.matches(fp) {
            self.template_action()
        } else {
            Action::Hold
        }
    }

    /// +1 long, -1 short, 0 inactive
    pub fn direction(&self, fp: &Fingerprint) -> f64 {
        self.action(fp).direction()
    }

    /// Child rule: every threshold perturbed by independent N(0, sigma^2)
    /// noise, same template, next generation
    pub fn mutate<R: Rng + ?Sized>(&self, id: u64, sigma: f64, rng: &mut R) -> StrategyRule {
        let thresholds = self
            .thresholds
            .iter()
            .map(|(name, value)| (name.clone(), value + sigma * gaussian(rng)))
            .collect();
        StrategyRule {
            id,
            thresholds,
            template: self.template.clone(),
            generation: self.generation + 1,
            parent_id: Some(self.id),
            created_at: Utc::now(),
        }
    }
}

/// Standard normal draw (Box-Muller)
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rule() -> StrategyRule {
        let thresholds = BTreeMap::from([("sync_order".to_string(), 0.6), ("hurst_exponent".to_string(), 0.55)]);
        let template = BTreeMap::from([(ACTION_KEY.to_string(), "BUY".to_string())]);
        StrategyRule::new(1, thresholds, template)
    }

    #[test]
    fn test_rule_action() {
        let mut fp = Fingerprint::neutral(100, Utc::now());
        fp.sync_order = 0.7;
        fp.hurst_exponent = 0.6;
        assert_eq!(rule().action(&fp), Action::Buy);
        fp.hurst_exponent = 0.5;
        assert_eq!(rule().action(&fp), Action::Hold);
        assert_eq!(rule().direction(&fp), 0.0);
    }

    #[test]
    fn test_unknown_threshold_ignored() {
        let mut r = rule();
        r.thresholds.insert("moon_phase".to_string(), 99.0);
        let mut fp = Fingerprint::neutral(100, Utc::now());
        fp.sync_order = 0.9;
        fp.hurst_exponent = 0.9;
        assert!(r.matches(&fp));
    }

    #[test]
    fn test_mutate_leaves_parent_untouched() {
        let parent = rule();
        let snapshot = parent.clone();
        let mut rng = StdRng::seed_from_u64(42);
        let child = parent.mutate(2, 0.05, &mut rng);
        assert_eq!(parent, snapshot);
        assert_eq!(child.generation, 1);
        assert_eq!(child.parent_id, Some(1));
        assert_eq!(child.template, parent.template);
        assert_ne!(child.thresholds, parent.thresholds);
        assert_eq!(child.thresholds.len(), 2);
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<f64> = (0..20_000).map(|_| gaussian(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.05);
    }
}
