use serde::{Deserialize, Serialize};

/// A directed link from a point to one of its nearest neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: usize,
    pub target: usize,
}

/// Exact k-nearest neighbours in the plane.
///
/// Each point's own index is excluded (coincident points still see each
/// other). Neighbours are ordered by ascending distance, ties by index.
/// `k` is clamped to `n - 1`.
pub fn nearest_neighbors(coords: &[[f64; 2]], k: usize) -> Vec<Vec<usize>> {
    let k = k.min(coords.len().saturating_sub(1));
    if k == 0 {
        return vec![Vec::new(); coords.len()];
    }

    coords
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut others: Vec<(f64, usize)> = coords
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, q)| (squared_distance(p, q), j))
                .collect();
            let by_distance =
                |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
            if k < others.len() {
                others.select_nth_unstable_by(k - 1, by_distance);
                others.truncate(k);
            }
            others.sort_by(by_distance);
            others.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

/// Flatten neighbour lists into links, in point order then neighbour rank.
pub fn connections(neighbors: &[Vec<usize>]) -> Vec<Connection> {
    neighbors
        .iter()
        .enumerate()
        .flat_map(|(source, list)| {
            list.iter().map(move |&target| Connection { source, target })
        })
        .collect()
}

fn squared_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}
