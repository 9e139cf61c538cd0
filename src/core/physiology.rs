//! Physiological state
//!
//! Five bounded levels, each an exponential moving average of its own
//! stimulus: level = decay * level + (1 - decay) * stimulus, clamped to [0, 1].

use serde::{Deserialize, Serialize};

use super::regime::Regime;

const DRIVE_DECAY: f64 = 0.90;
const STRESS_DECAY: f64 = 0.85;
const CALM_DECAY: f64 = 0.95;
const AROUSAL_DECAY: f64 = 0.80;
const AFFILIATION_DECAY: f64 = 0.97;

/// Inputs for one update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stimulus {
    /// Annualized realized volatility
    pub volatility: f64,
    /// Realized log return of the last period under the held position
    pub pnl: f64,
    pub regime: Regime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysiologicalState {
    pub drive: f64,
    pub stress: f64,
    pub calm: f64,
    pub arousal: f64,
    pub affiliation: f64,
}

impl Default for PhysiologicalState {
    fn default() -> Self {
        Self {
            drive: 0.5,
            stress: 0.0,
            calm: 0.5,
            arousal: 0.0,
            affiliation: 0.5,
        }
    }
}

fn blend(level: f64, decay: f64, stimulus: f64) -> f64 {
    let stimulus = if stimulus.is_finite() { stimulus.clamp(0.0, 1.0) } else { 0.0 };
    (decay * level + (1.0 - decay) * stimulus).clamp(0.0, 1.0)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn update_drive(level: f64, s: &Stimulus) -> f64 {
    blend(level, DRIVE_DECAY, sigmoid(s.pnl * 50.0))
}

pub fn update_stress(level: f64, s: &Stimulus) -> f64 {
    let vol_load = 1.0 - (-s.volatility.max(0.0) / 0.4).exp();
    let loss = (-s.pnl).max(0.0) * 20.0;
    blend(level, STRESS_DECAY, (vol_load + loss).min(1.0))
}

pub fn update_calm(level: f64, s: &Stimulus) -> f64 {
    let base = match s.regime {
        Regime::Stable => 0.9,
        Regime::Trending => 0.6,
        Regime::Volatile => 0.15,
    };
    blend(level, CALM_DECAY, base - s.volatility.max(0.0))
}

pub fn update_arousal(level: f64, s: &Stimulus) -> f64 {
    let mut stimulus = (s.pnl.abs() * 20.0 + s.volatility.max(0.0)).min(1.0);
    if s.regime == Regime::Volatile {
        stimulus += 0.3;
    }
    blend(level, AROUSAL_DECAY, stimulus)
}

pub fn update_affiliation(level: f64, s: &Stimulus) -> f64 {
    let stimulus = match s.regime {
        Regime::Stable => 0.7,
        Regime::Trending => 0.5,
        Regime::Volatile => 0.3,
    };
    blend(level, AFFILIATION_DECAY, stimulus)
}

impl PhysiologicalState {
    /// Next state; the current value is left untouched
    pub fn update(&self, stimulus: &Stimulus) -> Self {
        Self {
            drive: update_drive(self.drive, stimulus),
            stress: update_stress(self.stress, stimulus),
            calm: update_calm(self.calm, stimulus),
            arousal: update_arousal(self.arousal, stimulus),
            affiliation: update_affiliation(self.affiliation, stimulus),
        }
    }

    /// Fixed-order feature vector for the oracle
    pub fn as_array(&self) -> [f64; 5] {
        [self.drive, self.stress, self.calm, self.arousal, self.affiliation]
    }
}
