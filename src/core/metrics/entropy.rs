//! Histogram entropies of the return distribution

use serde::{Deserialize, Serialize};

use super::stats;
use crate::core::error::{ComputationError, MetricResult};
use crate::core::fingerprint::{EntropyProfile, Metric};

/// Histogram bin-count rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BinStrategy {
    /// width = 2 * IQR * n^(-1/3)
    #[default]
    FreedmanDiaconis,
    /// ceil(log2 n) + 1 bins
    Sturges,
}

impl BinStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinStrategy::FreedmanDiaconis => "freedman_diaconis",
            BinStrategy::Sturges => "sturges",
        }
    }
}

const MIN_HISTOGRAM_SAMPLES: usize = 8;

/// Bin probabilities of `xs`
pub fn histogram(xs: &[f64], strategy: BinStrategy, max_bins: usize) -> MetricResult<Vec<f64>> {
    let n = xs.len();
    if n < MIN_HISTOGRAM_SAMPLES {
        return Err(ComputationError::InsufficientSamples { needed: MIN_HISTOGRAM_SAMPLES, got: n });
    }
    let sorted = stats::sorted(xs);
    let (lo, hi) = (sorted[0], sorted[n - 1]);
    let range = hi - lo;
    if !range.is_finite() {
        return Err(ComputationError::NonFinite(Metric::Entropy));
    }
    if range <= 1e-15 {
        return Err(ComputationError::ZeroVariance(Metric::Entropy));
    }

    let bins = match strategy {
        BinStrategy::FreedmanDiaconis => {
            let iqr = stats::percentile_sorted(&sorted, 75.0) - stats::percentile_sorted(&sorted, 25.0);
            let width = 2.0 * iqr * (n as f64).powf(-1.0 / 3.0);
            if width <= 1e-15 {
                return Err(ComputationError::ZeroVariance(Metric::Entropy));
            }
            (range / width).ceil() as usize
        }
        BinStrategy::Sturges => (n as f64).log2().ceil() as usize + 1,
    }
    .clamp(1, max_bins.max(1));

    let mut counts = vec![0usize; bins];
    for x in xs {
        let idx = (((x - lo) / range) * bins as f64).floor() as usize;
        counts[idx.min(bins - 1)] += 1;
    }
    Ok(counts.into_iter().map(|c| c as f64 / n as f64).collect())
}

/// Shannon entropy (natural log)
pub fn shannon(probs: &[f64]) -> f64 {
    -probs.iter().filter(|p| **p > 0.0).map(|p| p * p.ln()).sum::<f64>()
}

/// Tsallis entropy of order q (Shannon at q = 1)
pub fn tsallis(probs: &[f64], q: f64) -> f64 {
    if (q - 1.0).abs() < 1e-9 {
        return shannon(probs);
    }
    let sum: f64 = probs.iter().filter(|p| **p > 0.0).map(|p| p.powf(q)).sum();
    (1.0 - sum) / (q - 1.0)
}

/// Renyi entropy of order alpha (Shannon at alpha = 1)
pub fn renyi(probs: &[f64], alpha: f64) -> f64 {
    if (alpha - 1.0).abs() < 1e-9 {
        return shannon(probs);
    }
    let sum: f64 = probs.iter().filter(|p| **p > 0.0).map(|p| p.powf(alpha)).sum();
    if sum <= 0.0 {
        return 0.0;
    }
    sum.ln() / (1.0 - alpha)
}

pub fn shannon_of(xs: &[f64], strategy: BinStrategy, max_bins: usize) -> MetricResult<f64> {
    Ok(shannon(&histogram(xs, strategy, max_bins)?))
}

#[derive(Debug, Clone, Copy)]
pub struct EntropySettings {
    pub window: usize,
    pub strategy: BinStrategy,
    pub max_bins: usize,
    pub tsallis_q: f64,
    pub renyi_alpha: f64,
}

/// Entropy of the last `window` returns against the preceding window of the
/// same length. Short series split the available returns in half.
pub fn entropy_profile(returns: &[f64], settings: &EntropySettings) -> MetricResult<(f64, EntropyProfile)> {
    let window = settings.window.min(returns.len() / 2);
    if window < MIN_HISTOGRAM_SAMPLES {
        return Err(ComputationError::InsufficientSamples {
            needed: 2 * MIN_HISTOGRAM_SAMPLES,
            got: returns.len(),
        });
    }
    let n = returns.len();
    let current = &returns[n - window..];
    let previous = &returns[n - 2 * window..n - window];

    let probs = histogram(current, settings.strategy, settings.max_bins)?;
    let previous_shannon = shannon_of(previous, settings.strategy, settings.max_bins)?;
    let profile = EntropyProfile {
        shannon: shannon(&probs),
        previous_shannon,
        tsallis: tsallis(&probs, settings.tsallis_q),
        renyi: renyi(&probs, settings.renyi_alpha),
    };
    let delta = profile.shannon - profile.previous_shannon;
    if !delta.is_finite() {
        return Err(ComputationError::NonFinite(Metric::Entropy));
    }
    Ok((delta, profile))
}

/// Rate of change of Shannon entropy over the trailing `span` returns:
/// sub-windows of `window` returns at stride window/2, last difference / stride.
pub fn entropy_rate(returns: &[f64], span: usize, settings: &EntropySettings) -> MetricResult<f64> {
    let trailing = &returns[returns.len().saturating_sub(span)..];
    let window = settings.window.min(trailing.len() / 2).max(MIN_HISTOGRAM_SAMPLES);
    let stride = (window / 2).max(1);
    if trailing.len() < window + stride {
        return Err(ComputationError::InsufficientSamples { needed: window + stride, got: trailing.len() });
    }
    let end = trailing.len();
    let last = shannon_of(&trailing[end - window..], settings.strategy, settings.max_bins)?;
    let prev = shannon_of(&trailing[end - window - stride..end - stride], settings.strategy, settings.max_bins)?;
    Ok((last - prev) / stride as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EntropySettings {
        EntropySettings {
            window: 50,
            strategy: BinStrategy::FreedmanDiaconis,
            max_bins: 64,
            tsallis_q: 2.0,
            renyi_alpha: 2.0,
        }
    }

    #[test]
    fn test_uniform_histogram_entropy() {
        let probs = vec![0.25; 4];
        assert!((shannon(&probs) - 4f64.ln()).abs() < 1e-12);
        assert!((tsallis(&probs, 2.0) - 0.75).abs() < 1e-12);
        assert!((renyi(&probs, 2.0) - 4f64.ln()).abs() < 1e-12);
        assert!((tsallis(&probs, 1.0) - shannon(&probs)).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_series_entropy_delta_is_small() {
        let prices: Vec<f64> = (0..200).map(|t| 100.0 + t as f64).collect();
        let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
        let (delta, profile) = entropy_profile(&returns, &settings()).unwrap();
        assert!(delta.abs() < 0.1, "delta {delta}");
        assert!(profile.shannon > 0.0);
    }

    #[test]
    fn test_constant_window_is_degenerate() {
        let err = histogram(&[0.01; 20], BinStrategy::FreedmanDiaconis, 64).unwrap_err();
        assert_eq!(err, ComputationError::ZeroVariance(Metric::Entropy));
    }

    #[test]
    fn test_sturges_bins() {
        let xs: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let probs = histogram(&xs, BinStrategy::Sturges, 64).unwrap();
        assert_eq!(probs.len(), 5);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_series_errors() {
        assert!(entropy_profile(&[0.1, 0.2, 0.3], &settings()).is_err());
    }
}
