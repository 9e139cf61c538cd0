//! OPTICS density ordering with DBSCAN-style cluster extraction

/// Label for points that belong to no cluster
pub const NOISE: i32 = -1;

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// Result of an OPTICS run
#[derive(Debug, Clone)]
pub struct OpticsOrdering {
    /// Point indices in processing order
    pub order: Vec<usize>,
    /// Reachability distance per point (infinite for ordering starts)
    pub reachability: Vec<f64>,
    /// Core distance per point (infinite when fewer than min_points exist)
    pub core_distance: Vec<f64>,
}

/// Compute the OPTICS ordering with unbounded generating distance.
/// `min_points` counts the point itself.
pub fn optics<P: AsRef<[f64]>>(points: &[P], min_points: usize) -> OpticsOrdering {
    let n = points.len();
    let min_points = min_points.max(1);

    let core_distance: Vec<f64> = (0..n)
        .map(|i| {
            if n < min_points {
                return f64::INFINITY;
            }
            let mut ds: Vec<f64> = (0..n).map(|j| distance(points[i].as_ref(), points[j].as_ref())).collect();
            ds.sort_by(|a, b| a.total_cmp(b));
            ds[min_points - 1]
        })
        .collect();

    let mut reachability = vec![f64::INFINITY; n];
    let mut processed = vec![false; n];
    let mut order = Vec::with_capacity(n);

    for start in 0..n {
        if processed[start] {
            continue;
        }
        let mut current = Some(start);
        while let Some(p) = current {
            processed[p] = true;
            order.push(p);
            if core_distance[p].is_finite() {
                for o in 0..n {
                    if processed[o] {
                        continue;
                    }
                    let reach = core_distance[p].max(distance(points[p].as_ref(), points[o].as_ref()));
                    if reach < reachability[o] {
                        reachability[o] = reach;
                    }
                }
            }
            // Next seed: smallest finite reachability among unprocessed points
            current = (0..n)
                .filter(|o| !processed[*o] && reachability[*o].is_finite())
                .min_by(|a, b| reachability[*a].total_cmp(&reachability[*b]));
        }
    }

    OpticsOrdering {
        order,
        reachability,
        core_distance,
    }
}

impl OpticsOrdering {
    /// DBSCAN-equivalent labels at radius `eps`, indexed by original point
    pub fn extract(&self, eps: f64) -> Vec<i32> {
        let mut labels = vec![NOISE; self.reachability.len()];
        let mut cluster = NOISE;
        for &p in &self.order {
            if self.reachability[p] > eps {
                if self.core_distance[p] <= eps {
                    cluster += 1;
                    labels[p] = cluster;
                }
            } else {
                labels[p] = cluster;
            }
        }
        labels
    }
}

/// Convenience: OPTICS + extraction in one call
pub fn cluster<P: AsRef<[f64]>>(points: &[P], min_points: usize, eps: f64) -> Vec<i32> {
    optics(points, min_points).extract(eps)
}
