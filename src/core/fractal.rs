//! Fractal Cache - multi-scale sub-window descriptors keyed by window content
//!
//! A window is cut into overlapping sub-windows; each gets a Ricker wavelet
//! scale profile and a few local statistics, then OPTICS groups them. The
//! result is cached under the blake3 hash of the window bytes with lazy TTL
//! expiry. Distinct keys never block each other (DashMap shards); concurrent
//! writers of the same key: last writer wins.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clustering::{self, NOISE};
use super::metrics::entropy::{self, BinStrategy};
use super::metrics::stats;
use super::types::Series;

/// Dyadic scales tried by the wavelet transform
pub const SCALES: [usize; 7] = [1, 2, 4, 8, 16, 32, 64];

pub type WindowKey = [u8; 32];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FractalConfig {
    pub sub_window: usize,
    pub stride: usize,
    pub min_points: usize,
    pub cluster_eps: f64,
    pub ttl_secs: u64,
}

impl Default for FractalConfig {
    fn default() -> Self {
        Self {
            sub_window: 32,
            stride: 8,
            min_points: 3,
            cluster_eps: 0.3,
            ttl_secs: 300,
        }
    }
}

/// Descriptor of one sub-window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractalNode {
    /// Relative start of the sub-window in [0, 1]
    pub position: f64,
    /// Mean of the z-scored prices in the sub-window
    pub mean: f64,
    /// Scale with the strongest average wavelet response
    pub dominant_scale: usize,
    pub entropy: f64,
    /// Std of first differences
    pub volatility: f64,
    /// OPTICS cluster, -1 = noise
    pub cluster_id: i32,
}

impl FractalNode {
    fn features(&self) -> [f64; 3] {
        [self.position, self.mean, (self.dominant_scale as f64).log2() / 6.0]
    }
}

/// Sampled Ricker (Mexican hat) wavelet at width `a`
fn ricker(a: f64) -> Vec<f64> {
    let half = (5.0 * a).ceil() as i64;
    let norm = 2.0 / ((3.0 * a).sqrt() * PI.powf(0.25));
    (-half..=half)
        .map(|t| {
            let x = t as f64 / a;
            norm * (1.0 - x * x) * (-x * x / 2.0).exp()
        })
        .collect()
}

/// Average |response| of a same-length convolution with the Ricker wavelet
fn wavelet_energy(signal: &[f64], scale: usize) -> f64 {
    let kernel = ricker(scale as f64);
    let half = (kernel.len() / 2) as i64;
    let n = signal.len() as i64;
    let total: f64 = (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let j = i + k as i64 - half;
                    (0..n).contains(&j).then(|| w * signal[j as usize])
                })
                .sum::<f64>()
                .abs()
        })
        .sum();
    total / n as f64
}

fn describe(window: &[f64], start: usize, span: usize) -> FractalNode {
    let len = window.len();
    let (dominant_scale, _) = SCALES
        .iter()
        .filter(|s| **s <= len)
        .map(|s| (*s, wavelet_energy(window, *s)))
        .fold((SCALES[0], f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

    let diffs: Vec<f64> = window.windows(2).map(|w| w[1] - w[0]).collect();
    FractalNode {
        position: if span == 0 { 0.0 } else { start as f64 / span as f64 },
        mean: stats::mean(window),
        dominant_scale,
        entropy: entropy::shannon_of(window, BinStrategy::FreedmanDiaconis, 64).unwrap_or(0.0),
        volatility: stats::std_dev(&diffs),
        cluster_id: NOISE,
    }
}

/// Decompose a window into clustered sub-window descriptors. Pure.
pub fn decompose(series: &Series, config: &FractalConfig) -> Vec<FractalNode> {
    let z = stats::zscore(&series.prices());
    let n = z.len();
    if n < 2 {
        return Vec::new();
    }
    let len = config.sub_window.clamp(2, n);
    let stride = config.stride.max(1);
    let span = n - len;
    let starts: Vec<usize> = (0..=span).step_by(stride).collect();

    #[cfg(feature = "parallel")]
    let mut nodes: Vec<FractalNode> = {
        use rayon::prelude::*;
        starts.par_iter().map(|s| describe(&z[*s..*s + len], *s, span)).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let mut nodes: Vec<FractalNode> = starts.iter().map(|s| describe(&z[*s..*s + len], *s, span)).collect();

    let features: Vec<[f64; 3]> = nodes.iter().map(FractalNode::features).collect();
    let labels = clustering::cluster(&features, config.min_points, config.cluster_eps);
    for (node, label) in nodes.iter_mut().zip(labels) {
        node.cluster_id = label;
    }
    nodes
}

/// Per-cycle digest of a decomposition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractalSummary {
    pub node_count: usize,
    pub cluster_count: usize,
    pub noise_fraction: f64,
    /// Most common dominant scale (smallest on ties)
    pub dominant_scale: Option<usize>,
}

impl FractalSummary {
    pub fn from_nodes(nodes: &[FractalNode]) -> Self {
        let mut clusters: Vec<i32> = nodes.iter().map(|n| n.cluster_id).filter(|c| *c != NOISE).collect();
        clusters.sort_unstable();
        clusters.dedup();
        let noise = nodes.iter().filter(|n| n.cluster_id == NOISE).count();

        let mut scale_counts: HashMap<usize, usize> = HashMap::new();
        for node in nodes {
            *scale_counts.entry(node.dominant_scale).or_default() += 1;
        }
        let dominant_scale = scale_counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(scale, _)| scale);

        Self {
            node_count: nodes.len(),
            cluster_count: clusters.len(),
            noise_fraction: if nodes.is_empty() { 0.0 } else { noise as f64 / nodes.len() as f64 },
            dominant_scale,
        }
    }
}

/// Content-addressed cache of decompositions, shared across symbols
pub struct FractalCache {
    config: FractalConfig,
    ttl: Duration,
    entries: DashMap<WindowKey, (Arc<Vec<FractalNode>>, Instant)>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FractalCache {
    pub fn new(config: FractalConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);
        Self::with_ttl(config, ttl)
    }

    pub fn with_ttl(config: FractalConfig, ttl: Duration) -> Self {
        Self {
            config,
            ttl,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// blake3 over every sample's (timestamp, price, volume) bytes
    pub fn window_key(series: &Series) -> WindowKey {
        let mut hasher = blake3::Hasher::new();
        for sample in series.samples() {
            hasher.update(&sample.to_le_bytes());
        }
        *hasher.finalize().as_bytes()
    }

    /// Cached decomposition for the window, recomputed when absent or stale
    pub fn get_or_compute(&self, series: &Series) -> Arc<Vec<FractalNode>> {
        let key = Self::window_key(series);
        if let Some(entry) = self.entries.get(&key) {
            let (nodes, stored_at) = entry.value();
            if stored_at.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Arc::clone(nodes);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let nodes = Arc::new(decompose(series, &self.config));
        debug!("[CACHE] {} decomposed into {} nodes", series.symbol, nodes.len());
        self.entries.insert(key, (Arc::clone(&nodes), Instant::now()));
        nodes
    }

    /// Drop every stale entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (_, stored_at)| stored_at.elapsed() < self.ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("[CACHE] purged {} expired entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Sample;
    use chrono::{TimeZone, Utc};

    fn series(n: usize, offset: f64) -> Series {
        let samples = (0..n)
            .map(|i| {
                let p = 100.0 + offset + (i as f64 * 0.2).sin() * 5.0 + i as f64 * 0.05;
                Sample::new(Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(), p, 500.0)
            })
            .collect();
        Series::new("TEST", samples)
    }

    #[test]
    fn test_cache_hit_returns_same_arc() {
        let cache = FractalCache::new(FractalConfig::default());
        let window = series(160, 0.0);
        let first = cache.get_or_compute(&window);
        let second = cache.get_or_compute(&window);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_expired_entry_recomputes_equal_value() {
        let cache = FractalCache::with_ttl(FractalConfig::default(), Duration::ZERO);
        let window = series(160, 0.0);
        let first = cache.get_or_compute(&window);
        let second = cache.get_or_compute(&window);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert_eq!(cache.misses(), 2);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_distinct_windows_get_distinct_keys() {
        assert_ne!(FractalCache::window_key(&series(100, 0.0)), FractalCache::window_key(&series(100, 1.0)));
        assert_eq!(FractalCache::window_key(&series(100, 0.0)), FractalCache::window_key(&series(100, 0.0)));
    }

    #[test]
    fn test_decompose_orders_by_position() {
        let nodes = decompose(&series(160, 0.0), &FractalConfig::default());
        // (160 - 32) / 8 + 1 sub-windows
        assert_eq!(nodes.len(), 17);
        assert_eq!(nodes[0].position, 0.0);
        assert_eq!(nodes[16].position, 1.0);
        assert!(nodes.windows(2).all(|w| w[0].position < w[1].position));
        assert!(nodes.iter().all(|n| SCALES.contains(&n.dominant_scale) && n.dominant_scale <= 32));
    }

    #[test]
    fn test_short_window_single_node() {
        let nodes = decompose(&series(10, 0.0), &FractalConfig::default());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].position, 0.0);
    }

    #[test]
    fn test_summary() {
        let mut nodes = decompose(&series(160, 0.0), &FractalConfig::default());
        nodes[0].cluster_id = NOISE;
        let summary = FractalSummary::from_nodes(&nodes);
        assert_eq!(summary.node_count, 17);
        assert!(summary.noise_fraction > 0.0);
        assert!(summary.dominant_scale.is_some());
        assert_eq!(FractalSummary::from_nodes(&[]).dominant_scale, None);
    }
}
