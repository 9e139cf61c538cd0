//! Relation graph over recent observations
//!
//! Nodes are individual returns positioned on a 1-D coordinate (the z-scored
//! return). How edges are drawn is up to the injected [`RelationGraphBuilder`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::metrics::stats;
use super::types::Series;

/// Direction shared by an edge's endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Bullish,
    Bearish,
    Neutral,
}

impl Polarity {
    /// Bullish when both returns are positive, Bearish when both are negative
    pub fn of(a: f64, b: f64) -> Self {
        if a > 0.0 && b > 0.0 {
            Polarity::Bullish
        } else if a < 0.0 && b < 0.0 {
            Polarity::Bearish
        } else {
            Polarity::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub u: usize,
    pub v: usize,
    pub weight: f64,
    pub polarity: Polarity,
}

/// Undirected weighted graph without self loops or parallel edges
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    coordinates: Vec<f64>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<(usize, f64)>>,
    seen: HashSet<(usize, usize)>,
}

impl RelationGraph {
    pub fn new(coordinates: Vec<f64>) -> Self {
        let n = coordinates.len();
        Self {
            coordinates,
            edges: Vec::new(),
            adjacency: vec![Vec::new(); n],
            seen: HashSet::new(),
        }
    }

    /// Add an edge; self loops, duplicates, out-of-range nodes and
    /// non-positive weights are ignored. Returns whether it was added.
    pub fn add_edge(&mut self, u: usize, v: usize, weight: f64, polarity: Polarity) -> bool {
        let n = self.coordinates.len();
        if u == v || u >= n || v >= n || weight <= 0.0 || !weight.is_finite() {
            return false;
        }
        let key = (u.min(v), u.max(v));
        if !self.seen.insert(key) {
            return false;
        }
        self.adjacency[u].push((v, weight));
        self.adjacency[v].push((u, weight));
        self.edges.push(Edge { u, v, weight, polarity });
        true
    }

    pub fn node_count(&self) -> usize {
        self.coordinates.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn coordinate(&self, node: usize) -> f64 {
        self.coordinates[node]
    }

    pub fn neighbors(&self, node: usize) -> &[(usize, f64)] {
        &self.adjacency[node]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    /// Number of common neighbours of u and v (triangles through the edge)
    pub fn shared_neighbors(&self, u: usize, v: usize) -> usize {
        let of_u: HashSet<usize> = self.adjacency[u].iter().map(|(n, _)| *n).collect();
        self.adjacency[v].iter().filter(|(n, _)| of_u.contains(n)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Builds the relation graph for a window
pub trait RelationGraphBuilder: Send + Sync {
    fn build(&self, series: &Series) -> RelationGraph;
}

/// Default builder: temporal chain plus k-nearest neighbours in
/// (return, volume change) space, weight = exp(-distance / mean distance).
#[derive(Debug, Clone)]
pub struct CoMovementGraphBuilder {
    /// Number of trailing returns turned into nodes
    pub lookback: usize,
    /// Neighbours linked per node
    pub neighbors: usize,
}

impl CoMovementGraphBuilder {
    pub fn new(lookback: usize, neighbors: usize) -> Self {
        Self { lookback, neighbors }
    }
}

impl Default for CoMovementGraphBuilder {
    fn default() -> Self {
        Self::new(64, 4)
    }
}

impl RelationGraphBuilder for CoMovementGraphBuilder {
    fn build(&self, series: &Series) -> RelationGraph {
        let samples = series.tail(self.lookback + 1);
        let samples = samples.samples();

        let mut returns = Vec::with_capacity(samples.len());
        let mut volume_changes = Vec::with_capacity(samples.len());
        for w in samples.windows(2) {
            if w[0].price <= 0.0 || w[1].price <= 0.0 {
                continue;
            }
            returns.push((w[1].price / w[0].price).ln());
            let dv = if w[0].volume > 0.0 && w[1].volume > 0.0 {
                (w[1].volume / w[0].volume).ln()
            } else {
                0.0
            };
            volume_changes.push(dv);
        }

        let z_ret = stats::zscore(&returns);
        let z_vol = stats::zscore(&volume_changes);
        let n = returns.len();
        let mut graph = RelationGraph::new(z_ret.clone());
        if n < 2 {
            return graph;
        }

        let distance = |i: usize, j: usize| ((z_ret[i] - z_ret[j]).powi(2) + (z_vol[i] - z_vol[j]).powi(2)).sqrt();

        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for i in 0..n - 1 {
            candidates.push((i, i + 1, distance(i, i + 1)));
        }
        for i in 0..n {
            let mut nearest: Vec<(usize, f64)> = (0..n).filter(|j| *j != i).map(|j| (j, distance(i, j))).collect();
            nearest.sort_by(|a, b| a.1.total_cmp(&b.1));
            for (j, d) in nearest.into_iter().take(self.neighbors) {
                candidates.push((i, j, d));
            }
        }

        let scale = {
            let ds: Vec<f64> = candidates.iter().map(|c| c.2).collect();
            stats::mean(&ds).max(1e-9)
        };
        for (i, j, d) in candidates {
            graph.add_edge(i, j, (-d / scale).exp(), Polarity::of(returns[i], returns[j]));
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Sample;
    use chrono::{TimeZone, Utc};

    fn series(prices: &[f64]) -> Series {
        let samples = prices
            .iter()
            .enumerate()
            .map(|(i, p)| Sample::new(Utc.timestamp_opt(i as i64, 0).unwrap(), *p, 100.0 + (i % 3) as f64))
            .collect();
        Series::new("TEST", samples)
    }

    #[test]
    fn test_add_edge_rejects_duplicates() {
        let mut g = RelationGraph::new(vec![0.0, 1.0, 2.0]);
        assert!(g.add_edge(0, 1, 1.0, Polarity::Neutral));
        assert!(!g.add_edge(1, 0, 1.0, Polarity::Neutral));
        assert!(!g.add_edge(2, 2, 1.0, Polarity::Neutral));
        assert!(!g.add_edge(0, 2, 0.0, Polarity::Neutral));
        assert_eq!(g.edges().len(), 1);
        assert_eq!(g.degree(0), 1);
    }

    #[test]
    fn test_shared_neighbors() {
        let mut g = RelationGraph::new(vec![0.0; 4]);
        g.add_edge(0, 1, 1.0, Polarity::Neutral);
        g.add_edge(0, 2, 1.0, Polarity::Neutral);
        g.add_edge(1, 2, 1.0, Polarity::Neutral);
        g.add_edge(1, 3, 1.0, Polarity::Neutral);
        assert_eq!(g.shared_neighbors(0, 1), 1);
        assert_eq!(g.shared_neighbors(2, 3), 1);
    }

    #[test]
    fn test_polarity() {
        assert_eq!(Polarity::of(0.1, 0.2), Polarity::Bullish);
        assert_eq!(Polarity::of(-0.1, -0.2), Polarity::Bearish);
        assert_eq!(Polarity::of(0.1, -0.2), Polarity::Neutral);
    }

    #[test]
    fn test_builder_links_chain_and_neighbors() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + ((i as f64) * 0.7).sin() * 3.0).collect();
        let g = CoMovementGraphBuilder::new(30, 3).build(&series(&prices));
        assert_eq!(g.node_count(), 30);
        assert!(g.edges().len() >= 29);
        assert!(g.edges().iter().all(|e| e.weight > 0.0 && e.weight <= 1.0));
    }
}
