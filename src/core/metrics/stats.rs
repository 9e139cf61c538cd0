//! Small statistics helpers shared by the metric modules

/// Arithmetic mean (0 for empty input)
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population variance
pub fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
}

pub fn std_dev(xs: &[f64]) -> f64 {
    variance(xs).sqrt()
}

/// Root mean square (no centering)
pub fn rms(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    (xs.iter().map(|x| x * x).sum::<f64>() / xs.len() as f64).sqrt()
}

pub fn sorted(xs: &[f64]) -> Vec<f64> {
    let mut v = xs.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Linear-interpolated percentile of already sorted data, `p` in [0, 100]
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub fn median(xs: &[f64]) -> f64 {
    percentile_sorted(&sorted(xs), 50.0)
}

/// Interquartile range
pub fn iqr(xs: &[f64]) -> f64 {
    let s = sorted(xs);
    percentile_sorted(&s, 75.0) - percentile_sorted(&s, 25.0)
}

/// Theil-Sen estimator: median of pairwise slopes, intercept = median(y - slope*x).
/// Returns None when fewer than two distinct x values exist.
pub fn theil_sen(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len().min(ys.len());
    let mut slopes = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = xs[j] - xs[i];
            if dx.abs() > 1e-12 {
                let slope = (ys[j] - ys[i]) / dx;
                if slope.is_finite() {
                    slopes.push(slope);
                }
            }
        }
    }
    if slopes.is_empty() {
        return None;
    }
    let slope = median(&slopes);
    let residuals: Vec<f64> = (0..n).map(|i| ys[i] - slope * xs[i]).collect();
    Some((slope, median(&residuals)))
}

/// Third and fourth standardized moments (kurtosis is non-excess).
/// None when the variance is zero.
pub fn standardized_moments(xs: &[f64]) -> Option<(f64, f64)> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs);
    let var = variance(xs);
    if var <= 1e-20 {
        return None;
    }
    let n = xs.len() as f64;
    let m3 = xs.iter().map(|x| (x - m).powi(3)).sum::<f64>() / n;
    let m4 = xs.iter().map(|x| (x - m).powi(4)).sum::<f64>() / n;
    Some((m3 / var.powf(1.5), m4 / (var * var)))
}

/// Z-score a slice; a constant slice maps to zeros
pub fn zscore(xs: &[f64]) -> Vec<f64> {
    let m = mean(xs);
    let s = std_dev(xs);
    if s <= 1e-12 {
        return vec![0.0; xs.len()];
    }
    xs.iter().map(|x| (x - m) / s).collect()
}

/// Geometrically spaced integer lags in [min, max], deduplicated
pub fn geometric_lags(min: usize, max: usize, count: usize) -> Vec<usize> {
    if min == 0 || max < min || count == 0 {
        return Vec::new();
    }
    if count == 1 || max == min {
        return vec![min];
    }
    let ratio = (max as f64 / min as f64).powf(1.0 / (count - 1) as f64);
    let mut lags: Vec<usize> = (0..count)
        .map(|i| (min as f64 * ratio.powi(i as i32)).round() as usize)
        .collect();
    lags.dedup();
    lags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let s = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile_sorted(&s, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile_sorted(&s, 25.0) - 1.75).abs() < 1e-12);
        assert_eq!(percentile_sorted(&s, 100.0), 4.0);
    }

    #[test]
    fn test_theil_sen_ignores_outlier() {
        let xs: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mut ys: Vec<f64> = xs.iter().map(|x| 2.0 * x + 1.0).collect();
        ys[7] = 100.0;
        let (slope, intercept) = theil_sen(&xs, &ys).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
        assert!(theil_sen(&[1.0, 1.0], &[0.0, 5.0]).is_none());
    }

    #[test]
    fn test_moments() {
        assert!(standardized_moments(&[1.0, 1.0, 1.0]).is_none());
        let (skew, kurt) = standardized_moments(&[-1.0, 1.0, -1.0, 1.0]).unwrap();
        assert!(skew.abs() < 1e-12);
        assert!((kurt - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_geometric_lags() {
        let lags = geometric_lags(8, 50, 10);
        assert_eq!(lags.first(), Some(&8));
        assert_eq!(lags.last(), Some(&50));
        assert!(lags.windows(2).all(|w| w[0] < w[1]));
    }
}
