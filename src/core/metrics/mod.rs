//! Metric pipeline
//!
//! Compresses a sample window into a [`Fingerprint`]. Each sub-metric is a
//! pure function of the window; a failing sub-metric degrades only its own
//! field to the documented default.

pub mod curvature;
pub mod entropy;
pub mod hurst;
pub mod stats;
pub mod sync;
pub mod volatility;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ComputationError, MetricResult};
use super::fingerprint::{Fingerprint, Metric};
use super::graph::{CoMovementGraphBuilder, RelationGraphBuilder};
use super::types::Series;

pub use curvature::{CurvatureReport, CurvatureSettings};
pub use entropy::{BinStrategy, EntropySettings};
pub use hurst::LagRange;

const MIN_CURVATURE_ENERGY: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub min_window: usize,
    pub entropy_window: usize,
    pub entropy_bins: BinStrategy,
    pub max_bins: usize,
    pub tsallis_q: f64,
    pub renyi_alpha: f64,
    pub wavelet_levels: usize,
    pub curvature_lambda: f64,
    pub curvature_idleness: f64,
    pub graph_lookback: usize,
    pub graph_neighbors: usize,
    pub hurst_min_lag: usize,
    /// Defaults to a quarter of the return count when unset
    pub hurst_max_lag: Option<usize>,
    pub ism_window: usize,
    pub vol_window: usize,
    pub annualization: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            min_window: 100,
            entropy_window: 50,
            entropy_bins: BinStrategy::FreedmanDiaconis,
            max_bins: 64,
            tsallis_q: 2.0,
            renyi_alpha: 2.0,
            wavelet_levels: 2,
            curvature_lambda: 0.5,
            curvature_idleness: 0.5,
            graph_lookback: 64,
            graph_neighbors: 4,
            hurst_min_lag: 8,
            hurst_max_lag: None,
            ism_window: 100,
            vol_window: 20,
            annualization: 252.0,
        }
    }
}

impl MetricsConfig {
    fn entropy_settings(&self) -> EntropySettings {
        EntropySettings {
            window: self.entropy_window,
            strategy: self.entropy_bins,
            max_bins: self.max_bins,
            tsallis_q: self.tsallis_q,
            renyi_alpha: self.renyi_alpha,
        }
    }

    fn curvature_settings(&self) -> CurvatureSettings {
        CurvatureSettings {
            lambda: self.curvature_lambda,
            idleness: self.curvature_idleness,
        }
    }

    fn lag_range(&self) -> LagRange {
        LagRange {
            min_lag: self.hurst_min_lag,
            max_lag: self.hurst_max_lag,
        }
    }
}

/// |entropy rate| / mean(kappa^2); 0 when the curvature energy vanishes
pub fn instability_score(entropy_rate: f64, curvature_energy: f64) -> f64 {
    if curvature_energy < MIN_CURVATURE_ENERGY {
        return 0.0;
    }
    entropy_rate.abs() / curvature_energy
}

pub struct MetricPipeline {
    config: MetricsConfig,
    graph_builder: Arc<dyn RelationGraphBuilder>,
}

impl MetricPipeline {
    pub fn new(config: MetricsConfig) -> Self {
        let builder = CoMovementGraphBuilder::new(config.graph_lookback, config.graph_neighbors);
        Self::with_graph_builder(config, Arc::new(builder))
    }

    pub fn with_graph_builder(config: MetricsConfig, graph_builder: Arc<dyn RelationGraphBuilder>) -> Self {
        Self { config, graph_builder }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Validate the window and compute every metric. Only an invalid window
    /// is an error; sub-metric failures are recorded in `degraded`.
    pub fn compute(&self, series: &Series) -> MetricResult<Fingerprint> {
        let min_window = self.config.min_window.max(2);
        if series.len() < min_window {
            return Err(ComputationError::InsufficientSamples { needed: min_window, got: series.len() });
        }
        if series.samples().iter().any(|s| !(s.price.is_finite() && s.price > 0.0)) {
            return Err(ComputationError::NonPositivePrice);
        }
        let Some(last) = series.last() else {
            return Err(ComputationError::InsufficientSamples { needed: min_window, got: 0 });
        };

        let returns = series.log_returns();
        let mut fp = Fingerprint::neutral(series.len(), last.time);
        fp.degraded.clear();

        let degrade = |fp: &mut Fingerprint, metric: Metric, err: &ComputationError| {
            debug!("[METRICS] {} degraded on {}: {}", metric, series.symbol, err);
            fp.mark_degraded(metric);
        };

        match sync::sync_order(&returns, self.config.wavelet_levels) {
            Ok(r) => fp.sync_order = r,
            Err(e) => degrade(&mut fp, Metric::SyncOrder, &e),
        }

        let entropy_settings = self.config.entropy_settings();
        match entropy::entropy_profile(&returns, &entropy_settings) {
            Ok((delta, profile)) => {
                fp.entropy_delta = delta;
                fp.entropy = profile;
            }
            Err(e) => degrade(&mut fp, Metric::Entropy, &e),
        }

        let graph = self.graph_builder.build(series);
        let report = match curvature::curvature(&graph, &self.config.curvature_settings()) {
            Ok(report) => {
                fp.curvature = report.mean;
                fp.curvature_asymmetry = report.asymmetry;
                Some(report)
            }
            Err(e) => {
                degrade(&mut fp, Metric::Curvature, &e);
                degrade(&mut fp, Metric::Asymmetry, &e);
                None
            }
        };

        let lags = self.config.lag_range();
        match hurst::dfa(&returns, lags) {
            Ok(h) => fp.hurst_exponent = h,
            Err(e) => degrade(&mut fp, Metric::Hurst, &e),
        }
        if let Ok(h) = hurst::rescaled_range(&returns, lags) {
            fp.hurst_rs = h;
        }

        match (report, entropy::entropy_rate(&returns, self.config.ism_window, &entropy_settings)) {
            (Some(report), Ok(rate)) => fp.instability = instability_score(rate, report.energy),
            (None, _) => degrade(&mut fp, Metric::Instability, &ComputationError::EmptyGraph),
            (_, Err(e)) => degrade(&mut fp, Metric::Instability, &e),
        }

        match stats::standardized_moments(&returns) {
            Some((skew, kurtosis)) => {
                fp.skew = skew;
                fp.kurtosis = kurtosis;
            }
            None => degrade(&mut fp, Metric::Moments, &ComputationError::ZeroVariance(Metric::Moments)),
        }

        fp.realized_vol = volatility::realized_vol(&returns, self.config.vol_window, self.config.annualization);

        fp.sanitize();
        Ok(fp)
    }

    /// Like [`compute`](Self::compute), but an invalid window yields the
    /// neutral fingerprint instead of an error
    pub fn fingerprint(&self, series: &Series) -> Fingerprint {
        self.compute(series).unwrap_or_else(|e| {
            debug!("[METRICS] {} window rejected: {}", series.symbol, e);
            let timestamp = series.last().map(|s| s.time).unwrap_or_default();
            Fingerprint::neutral(series.len(), timestamp)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Sample;
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn series(prices: &[f64]) -> Series {
        let samples = prices
            .iter()
            .enumerate()
            .map(|(i, p)| Sample::new(Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(), *p, 1_000.0))
            .collect();
        Series::new("TEST", samples)
    }

    #[test]
    fn test_monotonic_window() {
        let pipeline = MetricPipeline::new(MetricsConfig::default());
        let prices: Vec<f64> = (0..200).map(|t| 100.0 + t as f64).collect();
        let fp = pipeline.compute(&series(&prices)).unwrap();
        assert!(fp.sync_order > 0.9, "sync {}", fp.sync_order);
        assert!(fp.entropy_delta.abs() < 0.1, "entropy delta {}", fp.entropy_delta);
        assert!(fp.is_finite());
        assert_eq!(fp.provenance.window_len, 200);
    }

    #[test]
    fn test_noise_window_is_finite_and_bounded() {
        let mut rng = StdRng::seed_from_u64(11);
        let prices: Vec<f64> = (0..200).map(|_| 100.0 + rng.gen_range(-2.0..2.0)).collect();
        let fp = MetricPipeline::new(MetricsConfig::default()).compute(&series(&prices)).unwrap();
        assert!(fp.is_finite());
        assert!((0.0..=1.0).contains(&fp.sync_order));
        assert!(fp.realized_vol > 0.0);
        assert!(fp.kurtosis > 0.0);
    }

    #[test]
    fn test_short_window_is_rejected() {
        let pipeline = MetricPipeline::new(MetricsConfig::default());
        let prices: Vec<f64> = (0..20).map(|t| 100.0 + t as f64).collect();
        let err = pipeline.compute(&series(&prices)).unwrap_err();
        assert_eq!(err, ComputationError::InsufficientSamples { needed: 100, got: 20 });

        let neutral = pipeline.fingerprint(&series(&prices));
        assert_eq!(neutral.hurst_exponent, 0.5);
        assert!(neutral.is_degraded(Metric::SyncOrder));
    }

    #[test]
    fn test_non_positive_price_is_rejected() {
        let mut prices: Vec<f64> = (0..150).map(|t| 100.0 + t as f64).collect();
        prices[40] = 0.0;
        let err = MetricPipeline::new(MetricsConfig::default()).compute(&series(&prices)).unwrap_err();
        assert_eq!(err, ComputationError::NonPositivePrice);
    }

    #[test]
    fn test_flat_window_degrades_fields_only() {
        let fp = MetricPipeline::new(MetricsConfig::default()).compute(&series(&[50.0; 120])).unwrap();
        assert!(fp.is_degraded(Metric::SyncOrder));
        assert!(fp.is_degraded(Metric::Entropy));
        assert!(fp.is_degraded(Metric::Moments));
        assert_eq!(fp.entropy_delta, 0.0);
        assert_eq!(fp.hurst_exponent, 0.5);
        assert_eq!(fp.kurtosis, 3.0);
        assert_eq!(fp.realized_vol, 0.0);
        assert_eq!(fp.curvature, 0.0);
        assert_eq!(fp.curvature_asymmetry, 0.0);
        assert_eq!(fp.instability, 0.0);
        assert!(fp.is_degraded(Metric::Curvature));
        assert!(fp.is_degraded(Metric::Instability));
    }

    #[test]
    fn test_instability_score() {
        assert_eq!(instability_score(0.5, 0.0), 0.0);
        assert!((instability_score(-0.2, 0.4) - 0.5).abs() < 1e-12);
    }
}
