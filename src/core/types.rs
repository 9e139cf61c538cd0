//! Core type definitions for the regime pipeline
//!
//! These types are shared by the metric pipeline, the fractal cache, the
//! agent and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observation of the traded instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Observation time
    pub time: DateTime<Utc>,
    /// Last traded / close price
    pub price: f64,
    /// Volume traded since the previous sample
    pub volume: f64,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self { time, price, volume }
    }

    /// Bytes used for content hashing (timestamp, price, volume; little-endian)
    pub fn to_le_bytes(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        out[0..8].copy_from_slice(&self.time.timestamp_micros().to_le_bytes());
        out[8..16].copy_from_slice(&self.price.to_le_bytes());
        out[16..24].copy_from_slice(&self.volume.to_le_bytes());
        out
    }
}

/// Top-of-book volume snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bid_volume: f64,
    pub ask_volume: f64,
}

impl OrderBookSnapshot {
    /// Bid/ask volume imbalance in [-1, 1] (positive = bid heavy)
    pub fn imbalance(&self) -> f64 {
        let total = self.bid_volume + self.ask_volume;
        if total <= 0.0 {
            return 0.0;
        }
        (self.bid_volume - self.ask_volume) / total
    }
}

/// Ordered sample window fetched for one cycle. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub symbol: String,
    samples: Vec<Sample>,
    pub order_book: Option<OrderBookSnapshot>,
}

impl Series {
    pub fn new(symbol: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            symbol: symbol.into(),
            samples,
            order_book: None,
        }
    }

    pub fn with_order_book(mut self, book: OrderBookSnapshot) -> Self {
        self.order_book = Some(book);
        self
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.price).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.volume).collect()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Keep only the trailing `n` samples
    pub fn tail(&self, n: usize) -> Series {
        let start = self.samples.len().saturating_sub(n);
        Series {
            symbol: self.symbol.clone(),
            samples: self.samples[start..].to_vec(),
            order_book: self.order_book,
        }
    }

    /// Log returns between consecutive samples. Non-positive prices yield no
    /// return for that step.
    pub fn log_returns(&self) -> Vec<f64> {
        self.samples
            .windows(2)
            .filter(|w| w[0].price > 0.0 && w[1].price > 0.0)
            .map(|w| (w[1].price / w[0].price).ln())
            .collect()
    }
}

/// Trading action emitted at the end of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Action::Buy),
            "SELL" => Some(Action::Sell),
            "HOLD" => Some(Action::Hold),
            _ => None,
        }
    }

    /// Position direction implied by the action (+1 long, -1 short, 0 flat)
    pub fn direction(&self) -> f64 {
        match self {
            Action::Buy => 1.0,
            Action::Sell => -1.0,
            Action::Hold => 0.0,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn series(prices: &[f64]) -> Series {
        let samples = prices
            .iter()
            .enumerate()
            .map(|(i, p)| Sample::new(Utc.timestamp_opt(i as i64 * 60, 0).unwrap(), *p, 100.0))
            .collect();
        Series::new("TEST", samples)
    }

    #[test]
    fn test_log_returns() {
        let s = series(&[100.0, 110.0, 99.0]);
        let r = s.log_returns();
        assert_eq!(r.len(), 2);
        assert!((r[0] - (1.1f64).ln()).abs() < 1e-12);
        assert!((r[1] - (0.9f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_tail() {
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.tail(2).prices(), vec![3.0, 4.0]);
        assert_eq!(s.tail(10).len(), 4);
    }

    #[test]
    fn test_action_strings() {
        for action in [Action::Buy, Action::Sell, Action::Hold] {
            assert_eq!(Action::from_str(action.as_str()), Some(action));
        }
        assert_eq!(Action::from_str("buy"), Some(Action::Buy));
        assert_eq!(Action::from_str("short"), None);
        assert_eq!(Action::Sell.direction(), -1.0);
    }

    #[test]
    fn test_imbalance() {
        let book = OrderBookSnapshot { bid_volume: 300.0, ask_volume: 100.0 };
        assert!((book.imbalance() - 0.5).abs() < 1e-12);
        let empty = OrderBookSnapshot { bid_volume: 0.0, ask_volume: 0.0 };
        assert_eq!(empty.imbalance(), 0.0);
    }
}
