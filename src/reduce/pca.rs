use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const MAX_ITERATIONS: usize = 500;
const TOLERANCE: f64 = 1e-10;
const EPSILON: f64 = 1e-12;
/// Eigenvalues below this fraction of the total sum of squares are noise.
const RELATIVE_FLOOR: f64 = 1e-9;
/// Fixed so the same embeddings always give the same layout.
const START_SEED: u64 = 0x5eed;

/// Samples projected onto their first two principal axes.
#[derive(Debug, Clone)]
pub struct Projection {
    pub coords: Vec<[f64; 2]>,
    /// Variance captured by each component found (sample variance, n-1).
    pub explained_variance: Vec<f64>,
    /// `explained_variance` as a fraction of the total variance.
    pub explained_variance_ratio: Vec<f64>,
}

/// Principal component analysis down to (at most) two dimensions.
///
/// Components come from power iteration on XᵀX, applied as Xᵀ(Xv) so the
/// d×d covariance matrix is never formed. Each component is signed so its
/// largest-magnitude loading is positive, which keeps layouts stable across
/// runs. Axes that cannot be found (too few samples, or no variance left)
/// are zero-filled.
pub fn pca(data: &[Vec<f32>], n_components: usize) -> Result<Projection> {
    let n = data.len();
    if n < 2 {
        bail!("PCA needs at least 2 samples, got {n}");
    }
    let dims = data[0].len();
    if dims == 0 {
        bail!("PCA needs non-empty vectors");
    }
    if let Some(bad) = data.iter().position(|row| row.len() != dims) {
        bail!(
            "inconsistent embedding width: row {bad} has {} values, expected {dims}",
            data[bad].len()
        );
    }

    let centered = center(data, dims);
    let sum_of_squares: f64 = centered
        .iter()
        .flat_map(|row| row.iter())
        .map(|v| v * v)
        .sum();
    let total_variance = sum_of_squares / (n - 1) as f64;
    let floor = RELATIVE_FLOOR * sum_of_squares.max(EPSILON);

    let wanted = n_components.min(2).min(n).min(dims);
    let mut components: Vec<Vec<f64>> = Vec::with_capacity(wanted);
    let mut explained_variance = Vec::with_capacity(wanted);
    for _ in 0..wanted {
        match leading_component(&centered, &components, floor) {
            Some((component, eigenvalue)) => {
                explained_variance.push(eigenvalue / (n - 1) as f64);
                components.push(component);
            }
            None => break,
        }
    }
    debug!(samples = n, dims, found = components.len(), "pca complete");

    let coords = centered
        .iter()
        .map(|row| {
            let mut point = [0.0; 2];
            for (axis, component) in components.iter().enumerate() {
                point[axis] = dot(row, component);
            }
            point
        })
        .collect();

    let explained_variance_ratio = explained_variance
        .iter()
        .map(|v| if total_variance > EPSILON { v / total_variance } else { 0.0 })
        .collect();

    Ok(Projection {
        coords,
        explained_variance,
        explained_variance_ratio,
    })
}

fn center(data: &[Vec<f32>], dims: usize) -> Vec<Vec<f64>> {
    let n = data.len() as f64;
    let mut mean = vec![0f64; dims];
    for row in data {
        for (m, &v) in mean.iter_mut().zip(row) {
            *m += v as f64;
        }
    }
    for m in &mut mean {
        *m /= n;
    }
    data.iter()
        .map(|row| row.iter().zip(&mean).map(|(&v, m)| v as f64 - m).collect())
        .collect()
}

/// Dominant eigenvector of XᵀX restricted to the complement of `found`,
/// with its eigenvalue. None once the residual eigenvalue drops below `floor`.
fn leading_component(
    x: &[Vec<f64>],
    found: &[Vec<f64>],
    floor: f64,
) -> Option<(Vec<f64>, f64)> {
    // A sample row can sit exactly on a minor axis and trap the iteration
    // there; a generic start vector has weight on every direction.
    let dims = x.first()?.len();
    let mut rng = StdRng::seed_from_u64(START_SEED + found.len() as u64);
    let mut v: Vec<f64> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
    orthogonalize(&mut v, found);
    if normalize(&mut v) < EPSILON {
        return None;
    }

    let mut eigenvalue = 0.0;
    for _ in 0..MAX_ITERATIONS {
        let mut w = gram_apply(x, &v);
        orthogonalize(&mut w, found);
        eigenvalue = normalize(&mut w);
        if eigenvalue < floor {
            return None;
        }
        let delta: f64 = w.iter().zip(&v).map(|(a, b)| (a - b) * (a - b)).sum();
        v = w;
        if delta.sqrt() < TOLERANCE {
            break;
        }
    }

    flip_sign(&mut v);
    Some((v, eigenvalue))
}

/// Xᵀ(Xv)
fn gram_apply(x: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    let mut out = vec![0f64; v.len()];
    for row in x {
        let s = dot(row, v);
        if s == 0.0 {
            continue;
        }
        for (o, r) in out.iter_mut().zip(row) {
            *o += s * r;
        }
    }
    out
}

fn orthogonalize(v: &mut [f64], basis: &[Vec<f64>]) {
    for b in basis {
        let s = dot(v, b);
        for (x, y) in v.iter_mut().zip(b) {
            *x -= s * y;
        }
    }
}

/// Scale to unit length in place, returning the original norm.
fn normalize(v: &mut [f64]) -> f64 {
    let n = norm(v);
    if n > 0.0 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
    n
}

fn flip_sign(v: &mut [f64]) {
    let pivot = v
        .iter()
        .copied()
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))
        .unwrap_or(0.0);
    if pivot < 0.0 {
        for x in v.iter_mut() {
            *x = -*x;
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}
