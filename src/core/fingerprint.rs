//! Regime fingerprint
//!
//! The per-cycle vector of regime metrics. Recomputed fresh every cycle and
//! never carries NaN/inf: a metric that could not be computed is set to its
//! documented default and listed in `degraded`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Individually degradable metric groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    SyncOrder,
    Entropy,
    Curvature,
    Hurst,
    Instability,
    Moments,
    Volatility,
    Asymmetry,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::SyncOrder => "sync_order",
            Metric::Entropy => "entropy_delta",
            Metric::Curvature => "curvature",
            Metric::Hurst => "hurst_exponent",
            Metric::Instability => "instability",
            Metric::Moments => "moments",
            Metric::Volatility => "realized_vol",
            Metric::Asymmetry => "curvature_asymmetry",
        }
    }

    pub fn all() -> [Metric; 8] {
        [
            Metric::SyncOrder,
            Metric::Entropy,
            Metric::Curvature,
            Metric::Hurst,
            Metric::Instability,
            Metric::Moments,
            Metric::Volatility,
            Metric::Asymmetry,
        ]
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Safe defaults used when a metric degrades
pub const DEFAULT_SYNC_ORDER: f64 = 0.0;
pub const DEFAULT_ENTROPY_DELTA: f64 = 0.0;
pub const DEFAULT_CURVATURE: f64 = 0.0;
pub const DEFAULT_HURST: f64 = 0.5;
pub const DEFAULT_INSTABILITY: f64 = 0.0;
pub const DEFAULT_SKEW: f64 = 0.0;
pub const DEFAULT_KURTOSIS: f64 = 3.0;
pub const DEFAULT_VOLATILITY: f64 = 0.0;
pub const DEFAULT_ASYMMETRY: f64 = 0.0;

/// Number of components in the retrieval vector
pub const METRIC_VECTOR_LEN: usize = 5;

/// Where the fingerprint came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Number of samples in the source window
    pub window_len: usize,
    /// Timestamp of the last sample in the window
    pub timestamp: DateTime<Utc>,
}

/// Entropy readings of the current sub-window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntropyProfile {
    pub shannon: f64,
    pub previous_shannon: f64,
    pub tsallis: f64,
    pub renyi: f64,
}

impl Default for EntropyProfile {
    fn default() -> Self {
        Self {
            shannon: 0.0,
            previous_shannon: 0.0,
            tsallis: 0.0,
            renyi: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Phase synchronization order parameter in [0, 1]
    pub sync_order: f64,
    /// Shannon entropy of current minus previous sub-window
    pub entropy_delta: f64,
    /// Blended relation-graph curvature (mean over edges)
    pub curvature: f64,
    /// DFA long-range dependence exponent
    pub hurst_exponent: f64,
    /// Entropy rate over curvature energy
    pub instability: f64,
    pub skew: f64,
    pub kurtosis: f64,
    pub realized_vol: f64,
    /// Mean curvature on bullish edges minus bearish edges
    pub curvature_asymmetry: f64,
    /// Rescaled-range Hurst estimate (kept for diagnostics)
    pub hurst_rs: f64,
    pub entropy: EntropyProfile,
    pub provenance: Provenance,
    /// Metrics that fell back to their defaults
    pub degraded: Vec<Metric>,
}

impl Fingerprint {
    /// Fingerprint with every metric at its default and marked degraded
    pub fn neutral(window_len: usize, timestamp: DateTime<Utc>) -> Self {
        Self {
            sync_order: DEFAULT_SYNC_ORDER,
            entropy_delta: DEFAULT_ENTROPY_DELTA,
            curvature: DEFAULT_CURVATURE,
            hurst_exponent: DEFAULT_HURST,
            instability: DEFAULT_INSTABILITY,
            skew: DEFAULT_SKEW,
            kurtosis: DEFAULT_KURTOSIS,
            realized_vol: DEFAULT_VOLATILITY,
            curvature_asymmetry: DEFAULT_ASYMMETRY,
            hurst_rs: DEFAULT_HURST,
            entropy: EntropyProfile::default(),
            provenance: Provenance { window_len, timestamp },
            degraded: Metric::all().to_vec(),
        }
    }

    /// Ordered retrieval vector:
    /// [sync_order, entropy_delta, curvature, hurst_exponent, realized_vol]
    pub fn metric_vector(&self) -> [f64; METRIC_VECTOR_LEN] {
        [
            self.sync_order,
            self.entropy_delta,
            self.curvature,
            self.hurst_exponent,
            self.realized_vol,
        ]
    }

    /// Look up a metric value by field name (used by rule thresholds)
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "sync_order" => Some(self.sync_order),
            "entropy_delta" => Some(self.entropy_delta),
            "curvature" => Some(self.curvature),
            "hurst_exponent" => Some(self.hurst_exponent),
            "instability" => Some(self.instability),
            "skew" => Some(self.skew),
            "kurtosis" => Some(self.kurtosis),
            "realized_vol" => Some(self.realized_vol),
            "curvature_asymmetry" => Some(self.curvature_asymmetry),
            _ => None,
        }
    }

    pub fn is_degraded(&self, metric: Metric) -> bool {
        self.degraded.contains(&metric)
    }

    pub fn mark_degraded(&mut self, metric: Metric) {
        if !self.degraded.contains(&metric) {
            self.degraded.push(metric);
        }
    }

    /// Replace any non-finite value with its default and mark it degraded
    pub fn sanitize(&mut self) {
        let checks: [(Metric, &mut f64, f64); 9] = [
            (Metric::SyncOrder, &mut self.sync_order, DEFAULT_SYNC_ORDER),
            (Metric::Entropy, &mut self.entropy_delta, DEFAULT_ENTROPY_DELTA),
            (Metric::Curvature, &mut self.curvature, DEFAULT_CURVATURE),
            (Metric::Hurst, &mut self.hurst_exponent, DEFAULT_HURST),
            (Metric::Instability, &mut self.instability, DEFAULT_INSTABILITY),
            (Metric::Moments, &mut self.skew, DEFAULT_SKEW),
            (Metric::Moments, &mut self.kurtosis, DEFAULT_KURTOSIS),
            (Metric::Volatility, &mut self.realized_vol, DEFAULT_VOLATILITY),
            (Metric::Asymmetry, &mut self.curvature_asymmetry, DEFAULT_ASYMMETRY),
        ];
        let mut newly_degraded = Vec::new();
        for (metric, value, default) in checks {
            if !value.is_finite() {
                *value = default;
                newly_degraded.push(metric);
            }
        }
        if !self.hurst_rs.is_finite() {
            self.hurst_rs = DEFAULT_HURST;
        }
        for v in [
            &mut self.entropy.shannon,
            &mut self.entropy.previous_shannon,
            &mut self.entropy.tsallis,
            &mut self.entropy.renyi,
        ] {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        self.sync_order = self.sync_order.clamp(0.0, 1.0);
        for metric in newly_degraded {
            self.mark_degraded(metric);
        }
    }

    /// All scalar fields are finite
    pub fn is_finite(&self) -> bool {
        self.metric_vector().iter().all(|v| v.is_finite())
            && [self.instability, self.skew, self.kurtosis, self.curvature_asymmetry, self.hurst_rs]
                .iter()
                .all(|v| v.is_finite())
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "R={:.3} dS={:+.4} k={:+.4} H={:.3} ISM={:.3} vol={:.4}",
            self.sync_order,
            self.entropy_delta,
            self.curvature,
            self.hurst_exponent,
            self.instability,
            self.realized_vol
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_defaults() {
        let fp = Fingerprint::neutral(0, Utc::now());
        assert_eq!(fp.hurst_exponent, 0.5);
        assert_eq!(fp.sync_order, 0.0);
        assert_eq!(fp.kurtosis, 3.0);
        for metric in Metric::all() {
            assert!(fp.is_degraded(metric));
        }
    }

    #[test]
    fn test_sanitize_replaces_non_finite() {
        let mut fp = Fingerprint::neutral(100, Utc::now());
        fp.degraded.clear();
        fp.curvature = f64::NAN;
        fp.realized_vol = f64::INFINITY;
        fp.sync_order = 1.2;
        fp.sanitize();
        assert!(fp.is_finite());
        assert_eq!(fp.curvature, DEFAULT_CURVATURE);
        assert_eq!(fp.sync_order, 1.0);
        assert!(fp.is_degraded(Metric::Curvature));
        assert!(fp.is_degraded(Metric::Volatility));
        assert!(!fp.is_degraded(Metric::Hurst));
    }

    #[test]
    fn test_get_by_name() {
        let mut fp = Fingerprint::neutral(100, Utc::now());
        fp.sync_order = 0.8;
        assert_eq!(fp.get("sync_order"), Some(0.8));
        assert_eq!(fp.get("unknown"), None);
        assert_eq!(fp.metric_vector()[0], 0.8);
    }
}
