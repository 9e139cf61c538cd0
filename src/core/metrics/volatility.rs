//! Realized volatility and window momentum

/// sqrt(mean r^2) over the trailing `window` returns, annualized
pub fn realized_vol(returns: &[f64], window: usize, annualization: f64) -> f64 {
    let tail = &returns[returns.len().saturating_sub(window.max(1))..];
    if tail.is_empty() {
        return 0.0;
    }
    let mean_sq = tail.iter().map(|r| r * r).sum::<f64>() / tail.len() as f64;
    (mean_sq * annualization.max(0.0)).sqrt()
}

/// log(p_last / p_first); 0 for degenerate windows
pub fn momentum(prices: &[f64]) -> f64 {
    match (prices.first(), prices.last()) {
        (Some(first), Some(last)) if *first > 0.0 && *last > 0.0 => (last / first).ln(),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realized_vol() {
        let returns = vec![0.01, -0.01, 0.01, -0.01];
        assert!((realized_vol(&returns, 20, 1.0) - 0.01).abs() < 1e-12);
        assert!((realized_vol(&returns, 20, 252.0) - 0.01 * 252f64.sqrt()).abs() < 1e-12);
        assert_eq!(realized_vol(&[], 20, 252.0), 0.0);
    }

    #[test]
    fn test_momentum() {
        assert!((momentum(&[100.0, 105.0, 110.0]) - 1.1f64.ln()).abs() < 1e-12);
        assert_eq!(momentum(&[]), 0.0);
        assert_eq!(momentum(&[0.0, 1.0]), 0.0);
    }
}
