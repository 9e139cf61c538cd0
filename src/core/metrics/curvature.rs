//! Discrete Ricci-style curvature on the relation graph
//!
//! Per edge: transport curvature (Ollivier, exact 1-D Wasserstein) blended
//! with augmented Forman curvature.

use crate::core::error::{ComputationError, MetricResult};
use crate::core::fingerprint::Metric;
use crate::core::graph::{Edge, Polarity, RelationGraph};

const MIN_EDGE_LENGTH: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct CurvatureSettings {
    /// Weight of transport curvature in the blend
    pub lambda: f64,
    /// Mass a node keeps on itself in its neighbourhood measure
    pub idleness: f64,
}

impl Default for CurvatureSettings {
    fn default() -> Self {
        Self { lambda: 0.5, idleness: 0.5 }
    }
}

/// Aggregate curvature readings of one graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvatureReport {
    /// Mean blended curvature over edges
    pub mean: f64,
    /// Mean squared blended curvature (curvature energy)
    pub energy: f64,
    /// Mean on bullish edges minus mean on bearish edges
    pub asymmetry: f64,
    pub edge_count: usize,
}

/// Neighbourhood measure of `node`: idleness on itself, the rest spread over
/// neighbours in proportion to edge weight
fn neighbourhood(graph: &RelationGraph, node: usize, idleness: f64) -> Vec<(f64, f64)> {
    let neighbors = graph.neighbors(node);
    let total: f64 = neighbors.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return vec![(graph.coordinate(node), 1.0)];
    }
    let mut measure = Vec::with_capacity(neighbors.len() + 1);
    measure.push((graph.coordinate(node), idleness));
    for (n, w) in neighbors {
        measure.push((graph.coordinate(*n), (1.0 - idleness) * w / total));
    }
    measure
}

/// Exact W1 between two discrete measures on the real line (CDF difference)
pub fn wasserstein_1d(a: &[(f64, f64)], b: &[(f64, f64)]) -> f64 {
    let mut points: Vec<(f64, f64)> = a.iter().copied().chain(b.iter().map(|(x, m)| (*x, -m))).collect();
    points.sort_by(|p, q| p.0.total_cmp(&q.0));
    let mut cdf = 0.0;
    let mut distance = 0.0;
    for pair in points.windows(2) {
        cdf += pair[0].1;
        distance += cdf.abs() * (pair[1].0 - pair[0].0);
    }
    distance
}

/// kappa_T = 1 - W1(mu_u, mu_v) / d(u, v); zero-length edges contribute 0
pub fn transport_curvature(graph: &RelationGraph, edge: &Edge, idleness: f64) -> f64 {
    let d = (graph.coordinate(edge.u) - graph.coordinate(edge.v)).abs();
    if d < MIN_EDGE_LENGTH {
        return 0.0;
    }
    let mu_u = neighbourhood(graph, edge.u, idleness);
    let mu_v = neighbourhood(graph, edge.v, idleness);
    1.0 - wasserstein_1d(&mu_u, &mu_v) / d
}

/// kappa_C = (4 - deg u - deg v + 3 * triangles) / (deg u + deg v)
pub fn combinatorial_curvature(graph: &RelationGraph, edge: &Edge) -> f64 {
    let du = graph.degree(edge.u) as f64;
    let dv = graph.degree(edge.v) as f64;
    let shared = graph.shared_neighbors(edge.u, edge.v) as f64;
    if du + dv == 0.0 {
        return 0.0;
    }
    (4.0 - du - dv + 3.0 * shared) / (du + dv)
}

pub fn edge_curvature(graph: &RelationGraph, edge: &Edge, settings: &CurvatureSettings) -> f64 {
    let lambda = settings.lambda.clamp(0.0, 1.0);
    lambda * transport_curvature(graph, edge, settings.idleness.clamp(0.0, 1.0))
        + (1.0 - lambda) * combinatorial_curvature(graph, edge)
}

pub fn curvature(graph: &RelationGraph, settings: &CurvatureSettings) -> MetricResult<CurvatureReport> {
    if graph.is_empty() {
        return Err(ComputationError::EmptyGraph);
    }
    // Coincident nodes carry no geometry; a flat window lands here
    let (lo, hi) = (0..graph.node_count())
        .map(|i| graph.coordinate(i))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c), hi.max(c)));
    if hi - lo <= MIN_EDGE_LENGTH {
        return Err(ComputationError::ZeroVariance(Metric::Curvature));
    }
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let (mut bull_sum, mut bull_n) = (0.0, 0usize);
    let (mut bear_sum, mut bear_n) = (0.0, 0usize);

    for edge in graph.edges() {
        let k = edge_curvature(graph, edge, settings);
        sum += k;
        sum_sq += k * k;
        match edge.polarity {
            Polarity::Bullish => {
                bull_sum += k;
                bull_n += 1;
            }
            Polarity::Bearish => {
                bear_sum += k;
                bear_n += 1;
            }
            Polarity::Neutral => {}
        }
    }

    let m = graph.edges().len() as f64;
    let asymmetry = if bull_n > 0 && bear_n > 0 {
        bull_sum / bull_n as f64 - bear_sum / bear_n as f64
    } else {
        0.0
    };
    Ok(CurvatureReport {
        mean: sum / m,
        energy: sum_sq / m,
        asymmetry,
        edge_count: graph.edges().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wasserstein_point_masses() {
        let a = [(0.0, 1.0)];
        let b = [(2.5, 1.0)];
        assert!((wasserstein_1d(&a, &b) - 2.5).abs() < 1e-12);
        assert!(wasserstein_1d(&a, &a).abs() < 1e-12);
    }

    #[test]
    fn test_coincident_nodes_are_zero_variance() {
        let mut g = RelationGraph::new(vec![0.0; 4]);
        g.add_edge(0, 1, 1.0, Polarity::Neutral);
        g.add_edge(1, 2, 1.0, Polarity::Neutral);
        g.add_edge(2, 3, 1.0, Polarity::Neutral);
        let settings = CurvatureSettings { lambda: 0.5, idleness: 0.5 };
        assert_eq!(
            curvature(&g, &settings),
            Err(ComputationError::ZeroVariance(Metric::Curvature))
        );
    }

    #[test]
    fn test_single_edge_curvature() {
        let mut g = RelationGraph::new(vec![0.0, 1.0]);
        g.add_edge(0, 1, 1.0, Polarity::Neutral);
        let edge = g.edges()[0];
        assert!((combinatorial_curvature(&g, &edge) - 1.0).abs() < 1e-12);
        // symmetric 0.5 / 0.5 measures coincide
        assert!((transport_curvature(&g, &edge, 0.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_path_graph_middle_edge_is_flat() {
        let mut g = RelationGraph::new(vec![0.0, 1.0, 2.0, 3.0]);
        g.add_edge(0, 1, 1.0, Polarity::Bullish);
        g.add_edge(1, 2, 1.0, Polarity::Bullish);
        g.add_edge(2, 3, 1.0, Polarity::Bearish);
        let middle = g.edges()[1];
        assert!(combinatorial_curvature(&g, &middle).abs() < 1e-12);
        assert!((combinatorial_curvature(&g, &g.edges()[0]) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_triangle_is_positively_curved() {
        let mut g = RelationGraph::new(vec![0.0, 1.0, 0.5]);
        g.add_edge(0, 1, 1.0, Polarity::Neutral);
        g.add_edge(1, 2, 1.0, Polarity::Neutral);
        g.add_edge(0, 2, 1.0, Polarity::Neutral);
        let report = curvature(&g, &CurvatureSettings { lambda: 0.0, idleness: 0.5 }).unwrap();
        assert!((report.mean - 0.75).abs() < 1e-12);
        assert!((report.energy - 0.5625).abs() < 1e-12);
        assert_eq!(report.asymmetry, 0.0);
    }

    #[test]
    fn test_asymmetry_and_empty_graph() {
        let mut g = RelationGraph::new(vec![0.0, 1.0, 2.0, 3.0]);
        g.add_edge(0, 1, 1.0, Polarity::Bullish);
        g.add_edge(1, 2, 1.0, Polarity::Bullish);
        g.add_edge(2, 3, 1.0, Polarity::Bearish);
        let report = curvature(&g, &CurvatureSettings { lambda: 0.0, idleness: 0.5 }).unwrap();
        // bullish: 1/3 and 0, bearish: 1/3
        assert!((report.asymmetry - (1.0 / 6.0 - 1.0 / 3.0)).abs() < 1e-12);

        let empty = RelationGraph::new(vec![0.0, 1.0]);
        assert_eq!(curvature(&empty, &CurvatureSettings::default()).unwrap_err(), ComputationError::EmptyGraph);
    }
}
