//! Decision Oracle
//!
//! Maps (fingerprint, physiological state) to (action, confidence). The
//! orchestrator treats the oracle as an external collaborator and bounds
//! every call with a timeout; [`LinearOracle`] is the built-in
//! implementation, a logistic score over fingerprint and state features.

use std::fs;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::OracleFailure;
use super::fingerprint::Fingerprint;
use super::physiology::PhysiologicalState;
use super::types::Action;

/// Number of features in the linear model
pub const NUM_FEATURES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub action: Action,
    /// In [0, 1]
    pub confidence: f64,
}

impl Prediction {
    /// What the orchestrator emits when the oracle times out or fails
    pub fn fallback() -> Self {
        Self {
            action: Action::Hold,
            confidence: 0.0,
        }
    }
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn predict(&self, fingerprint: &Fingerprint, state: &PhysiologicalState) -> Result<Prediction, OracleFailure>;
}

/// Sigmoid activation function
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Logistic model: p(up) = sigmoid(w . x + b).
/// BUY above 0.5 + hold_band, SELL below 0.5 - hold_band, HOLD in between;
/// confidence = |p - 0.5| * 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearOracle {
    weights: [f64; NUM_FEATURES],
    bias: f64,
    hold_band: f64,
}

impl Default for LinearOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearOracle {
    /// Priors: persistence and bullish curvature asymmetry lean long,
    /// stress and volatility lean short
    pub fn new() -> Self {
        Self {
            weights: [0.5, -1.0, 0.5, 2.0, -0.5, -0.2, 2.0, 0.4, -0.6, 0.2, -0.2, 0.1],
            bias: 0.0,
            hold_band: 0.05,
        }
    }

    pub fn with_weights(weights: [f64; NUM_FEATURES], bias: f64, hold_band: f64) -> Self {
        Self { weights, bias, hold_band }
    }

    /// Encode raw inputs into features
    pub fn encode_features(fp: &Fingerprint, state: &PhysiologicalState) -> [f64; NUM_FEATURES] {
        let [drive, stress, calm, arousal, affiliation] = state.as_array();
        [
            fp.sync_order,
            fp.entropy_delta,
            fp.curvature,
            fp.hurst_exponent - 0.5,
            fp.realized_vol.min(5.0),
            fp.instability.min(5.0),
            fp.curvature_asymmetry,
            drive,
            stress,
            calm,
            arousal,
            affiliation,
        ]
    }

    /// Probability that the next move is up
    pub fn score(&self, fp: &Fingerprint, state: &PhysiologicalState) -> f64 {
        let features = Self::encode_features(fp, state);
        let z = self.bias + self.weights.iter().zip(features.iter()).map(|(w, x)| w * x).sum::<f64>();
        sigmoid(z)
    }

    pub fn decide(&self, p_up: f64) -> Prediction {
        let action = if p_up > 0.5 + self.hold_band {
            Action::Buy
        } else if p_up < 0.5 - self.hold_band {
            Action::Sell
        } else {
            Action::Hold
        };
        Prediction {
            action,
            confidence: ((p_up - 0.5).abs() * 2.0).clamp(0.0, 1.0),
        }
    }

    /// Save weights to JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load weights from JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Get feature names for logging/debugging
    pub fn feature_names() -> [&'static str; NUM_FEATURES] {
        [
            "sync",
            "entropy_delta",
            "curvature",
            "hurst",
            "vol",
            "instability",
            "asymmetry",
            "drive",
            "stress",
            "calm",
            "arousal",
            "affiliation",
        ]
    }

    /// Format weights for logging
    pub fn format_weights(&self) -> String {
        let parts: Vec<String> = Self::feature_names()
            .iter()
            .zip(self.weights.iter())
            .map(|(name, weight)| format!("{}={:.3}", name, weight))
            .collect();
        format!("bias={:.3} {}", self.bias, parts.join(" "))
    }
}

#[async_trait]
impl DecisionOracle for LinearOracle {
    async fn predict(&self, fingerprint: &Fingerprint, state: &PhysiologicalState) -> Result<Prediction, OracleFailure> {
        let p_up = self.score(fingerprint, state);
        if !p_up.is_finite() {
            return Err(OracleFailure::Internal("non-finite score".to_string()));
        }
        Ok(self.decide(p_up))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 0.001);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_decide_bands() {
        let oracle = LinearOracle::new();
        assert_eq!(oracle.decide(0.9).action, Action::Buy);
        assert_eq!(oracle.decide(0.1).action, Action::Sell);
        assert_eq!(oracle.decide(0.52).action, Action::Hold);
        assert!((oracle.decide(0.75).confidence - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_zero_weights_hold() {
        let oracle = LinearOracle::with_weights([0.0; NUM_FEATURES], 0.0, 0.05);
        let fp = Fingerprint::neutral(100, Utc::now());
        let prediction = oracle.predict(&fp, &PhysiologicalState::default()).await.unwrap();
        assert_eq!(prediction.action, Action::Hold);
        assert_eq!(prediction.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_bullish_asymmetry_buys() {
        let mut weights = [0.0; NUM_FEATURES];
        weights[6] = 10.0;
        let oracle = LinearOracle::with_weights(weights, 0.0, 0.05);
        let mut fp = Fingerprint::neutral(100, Utc::now());
        fp.curvature_asymmetry = 0.5;
        let prediction = oracle.predict(&fp, &PhysiologicalState::default()).await.unwrap();
        assert_eq!(prediction.action, Action::Buy);
        assert!(prediction.confidence > 0.9);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oracle.json");
        let oracle = LinearOracle::with_weights([0.25; NUM_FEATURES], -0.1, 0.1);
        oracle.save(&path).unwrap();
        let loaded = LinearOracle::load(&path).unwrap();
        assert_eq!(loaded.weights, oracle.weights);
        assert_eq!(loaded.bias, -0.1);
    }
}
