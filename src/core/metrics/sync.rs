//! Phase synchronization order parameter
//!
//! returns / RMS -> Haar wavelet denoise -> analytic signal -> R = |mean e^{i theta}|

use std::f64::consts::{PI, SQRT_2};

use super::stats;
use crate::core::error::{ComputationError, MetricResult};
use crate::core::fingerprint::Metric;

/// Kuramoto-style order parameter of the return series in [0, 1]
pub fn sync_order(returns: &[f64], wavelet_levels: usize) -> MetricResult<f64> {
    if returns.len() < 4 {
        return Err(ComputationError::InsufficientSamples { needed: 4, got: returns.len() });
    }
    let scale = stats::rms(returns);
    if scale <= 1e-12 {
        return Err(ComputationError::ZeroVariance(Metric::SyncOrder));
    }
    let normalized: Vec<f64> = returns.iter().map(|r| r / scale).collect();
    let denoised = haar_denoise(&normalized, wavelet_levels);
    let phases = analytic_phases(&denoised);

    let n = phases.len() as f64;
    let (re, im) = phases
        .iter()
        .fold((0.0, 0.0), |(re, im), theta| (re + theta.cos(), im + theta.sin()));
    let r = ((re / n).powi(2) + (im / n).powi(2)).sqrt();
    if !r.is_finite() {
        return Err(ComputationError::NonFinite(Metric::SyncOrder));
    }
    Ok(r.clamp(0.0, 1.0))
}

/// Multi-level Haar decomposition with soft universal thresholding of the
/// detail coefficients. Odd-length tails pass through unchanged.
pub fn haar_denoise(signal: &[f64], levels: usize) -> Vec<f64> {
    let n = signal.len();
    let mut approx = signal.to_vec();
    let mut details: Vec<(Vec<f64>, Vec<f64>)> = Vec::with_capacity(levels);

    for _ in 0..levels {
        if approx.len() < 4 {
            break;
        }
        let half = approx.len() / 2;
        let mut a = Vec::with_capacity(half);
        let mut d = Vec::with_capacity(half);
        for i in 0..half {
            a.push((approx[2 * i] + approx[2 * i + 1]) / SQRT_2);
            d.push((approx[2 * i] - approx[2 * i + 1]) / SQRT_2);
        }
        let tail = approx[2 * half..].to_vec();
        details.push((d, tail));
        approx = a;
    }

    let Some((finest, _)) = details.first() else {
        return approx;
    };
    let abs_finest: Vec<f64> = finest.iter().map(|v| v.abs()).collect();
    let sigma = stats::median(&abs_finest) / 0.6745;
    let threshold = sigma * (2.0 * (n as f64).ln()).sqrt();

    for (d, tail) in details.into_iter().rev() {
        let mut out = Vec::with_capacity(d.len() * 2 + tail.len());
        for (a, d) in approx.iter().zip(d.iter()) {
            let shrunk = d.signum() * (d.abs() - threshold).max(0.0);
            out.push((a + shrunk) / SQRT_2);
            out.push((a - shrunk) / SQRT_2);
        }
        out.extend(tail);
        approx = out;
    }
    approx
}

/// Instantaneous phases of the analytic signal (discrete Hilbert transform)
pub fn analytic_phases(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let twiddle: Vec<(f64, f64)> = (0..n)
        .map(|k| {
            let angle = 2.0 * PI * k as f64 / n as f64;
            (angle.cos(), angle.sin())
        })
        .collect();

    // Forward DFT
    let mut spectrum = vec![(0.0, 0.0); n];
    for (k, bin) in spectrum.iter_mut().enumerate() {
        let (mut re, mut im) = (0.0, 0.0);
        for (t, x) in signal.iter().enumerate() {
            let (c, s) = twiddle[(k * t) % n];
            re += x * c;
            im -= x * s;
        }
        *bin = (re, im);
    }

    // One-sided spectrum: keep DC (and Nyquist), double positive frequencies
    for (k, bin) in spectrum.iter_mut().enumerate() {
        let gain = if k == 0 || (n % 2 == 0 && k == n / 2) {
            1.0
        } else if k < n.div_ceil(2) {
            2.0
        } else {
            0.0
        };
        bin.0 *= gain;
        bin.1 *= gain;
    }

    // Inverse DFT -> phase
    (0..n)
        .map(|t| {
            let (mut re, mut im) = (0.0, 0.0);
            for (k, (xr, xi)) in spectrum.iter().enumerate() {
                let (c, s) = twiddle[(k * t) % n];
                re += xr * c - xi * s;
                im += xr * s + xi * c;
            }
            im.atan2(re)
        })
        .collect()
}
