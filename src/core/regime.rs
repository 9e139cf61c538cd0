//! Regime labelling from realized volatility and window momentum
//!
//! - Volatile: realized volatility above the volatile threshold
//! - Trending: |log(p_last / p_first)| above the trend threshold
//! - Stable: neither

use serde::{Deserialize, Serialize};

/// Market regime classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    /// Quiet, range-bound
    Stable,
    /// Sustained move in either direction
    Trending,
    /// High realized volatility
    Volatile,
}

impl Regime {
    /// Convert to database-storable string
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Stable => "STABLE",
            Regime::Trending => "TRENDING",
            Regime::Volatile => "VOLATILE",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "STABLE" => Some(Regime::Stable),
            "TRENDING" => Some(Regime::Trending),
            "VOLATILE" => Some(Regime::Volatile),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Regime::Stable => 0,
            Regime::Trending => 1,
            Regime::Volatile => 2,
        }
    }

    pub fn all() -> [Regime; 3] {
        [Regime::Stable, Regime::Trending, Regime::Volatile]
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Stable => write!(f, "Stable"),
            Regime::Trending => write!(f, "Trending"),
            Regime::Volatile => write!(f, "Volatile"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Annualized realized volatility above which the regime is Volatile
    pub volatile_threshold: f64,
    /// Absolute window log return above which the regime is Trending
    pub trend_threshold: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            volatile_threshold: 0.6,
            trend_threshold: 0.05,
        }
    }
}

impl RegimeConfig {
    /// Volatility takes precedence over trend
    pub fn classify(&self, realized_vol: f64, momentum: f64) -> Regime {
        if realized_vol > self.volatile_threshold {
            Regime::Volatile
        } else if momentum.abs() > self.trend_threshold {
            Regime::Trending
        } else {
            Regime::Stable
        }
    }
}
