//! Long-range dependence: rescaled range and detrended fluctuation analysis

use super::stats;
use crate::core::error::{ComputationError, MetricResult};
use crate::core::fingerprint::Metric;

const LAG_POINTS: usize = 10;
const MIN_FIT_POINTS: usize = 3;

/// Lag bounds; `max_lag = None` means n/4
#[derive(Debug, Clone, Copy)]
pub struct LagRange {
    pub min_lag: usize,
    pub max_lag: Option<usize>,
}

impl LagRange {
    fn lags(&self, n: usize) -> Vec<usize> {
        let max = self.max_lag.unwrap_or(n / 4).min(n / 2);
        stats::geometric_lags(self.min_lag.max(2), max, LAG_POINTS)
    }
}

fn fit(log_lags: &[f64], log_stats: &[f64]) -> MetricResult<f64> {
    if log_lags.len() < MIN_FIT_POINTS {
        return Err(ComputationError::InsufficientSamples { needed: MIN_FIT_POINTS, got: log_lags.len() });
    }
    let (slope, _) = stats::theil_sen(log_lags, log_stats).ok_or(ComputationError::ZeroVariance(Metric::Hurst))?;
    if !slope.is_finite() {
        return Err(ComputationError::NonFinite(Metric::Hurst));
    }
    Ok(slope)
}

/// Rescaled-range exponent: slope of log(mean R/S) against log(lag)
pub fn rescaled_range(xs: &[f64], range: LagRange) -> MetricResult<f64> {
    let mut log_lags = Vec::new();
    let mut log_rs = Vec::new();

    for lag in range.lags(xs.len()) {
        let ratios: Vec<f64> = xs
            .chunks_exact(lag)
            .filter_map(|chunk| {
                let m = stats::mean(chunk);
                let sd = stats::std_dev(chunk);
                if sd <= 1e-12 {
                    return None;
                }
                let (mut cum, mut lo, mut hi) = (0.0f64, 0.0f64, 0.0f64);
                for v in chunk {
                    cum += v - m;
                    lo = lo.min(cum);
                    hi = hi.max(cum);
                }
                Some((hi - lo) / sd)
            })
            .collect();
        let avg = stats::mean(&ratios);
        if avg > 0.0 {
            log_lags.push((lag as f64).ln());
            log_rs.push(avg.ln());
        }
    }
    fit(&log_lags, &log_rs)
}

/// DFA-1 exponent: profile, per-segment linear detrend, slope of log F(lag)
pub fn dfa(xs: &[f64], range: LagRange) -> MetricResult<f64> {
    let m = stats::mean(xs);
    let profile: Vec<f64> = xs
        .iter()
        .scan(0.0, |acc, x| {
            *acc += x - m;
            Some(*acc)
        })
        .collect();

    let mut log_lags = Vec::new();
    let mut log_f = Vec::new();

    for lag in range.lags(xs.len()) {
        let t_mean = (lag as f64 - 1.0) / 2.0;
        let t_var: f64 = (0..lag).map(|t| (t as f64 - t_mean).powi(2)).sum();
        if t_var <= 0.0 {
            continue;
        }
        let mut sq = 0.0;
        let mut count = 0usize;
        for seg in profile.chunks_exact(lag) {
            let seg_mean = stats::mean(seg);
            let slope = seg
                .iter()
                .enumerate()
                .map(|(t, y)| (t as f64 - t_mean) * (y - seg_mean))
                .sum::<f64>()
                / t_var;
            let intercept = seg_mean - slope * t_mean;
            for (t, y) in seg.iter().enumerate() {
                sq += (y - intercept - slope * t as f64).powi(2);
            }
            count += lag;
        }
        if count == 0 {
            continue;
        }
        let fluctuation = (sq / count as f64).sqrt();
        if fluctuation > 1e-12 {
            log_lags.push((lag as f64).ln());
            log_f.push(fluctuation.ln());
        }
    }
    fit(&log_lags, &log_f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    const RANGE: LagRange = LagRange { min_lag: 8, max_lag: None };

    fn noise(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let u1: f64 = rng.gen_range(1e-12..1.0);
                let u2: f64 = rng.gen();
                (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
            })
            .collect()
    }

    #[test]
    fn test_dfa_white_noise_near_half() {
        let estimates: Vec<f64> = (0..8).map(|s| dfa(&noise(s, 199), RANGE).unwrap()).collect();
        let avg = stats::mean(&estimates);
        assert!(avg > 0.3 && avg < 0.7, "mean DFA {avg}");
        assert!(estimates.iter().all(|h| *h > 0.1 && *h < 0.9));
    }

    #[test]
    fn test_dfa_integrated_noise_is_persistent() {
        let walk: Vec<f64> = noise(7, 199)
            .into_iter()
            .scan(0.0, |acc, x| {
                *acc += x;
                Some(*acc)
            })
            .collect();
        assert!(dfa(&walk, RANGE).unwrap() > 1.0);
    }

    #[test]
    fn test_rescaled_range_white_noise() {
        let h = rescaled_range(&noise(3, 199), RANGE).unwrap();
        assert!(h > 0.3 && h < 0.85, "R/S {h}");
    }

    #[test]
    fn test_short_or_flat_input_degenerates() {
        assert!(dfa(&[0.0; 200], RANGE).is_err());
        assert!(rescaled_range(&[0.1, 0.2, 0.3], RANGE).is_err());
    }
}
