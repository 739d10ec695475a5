//! Planar homography: normalized DLT, RANSAC fitting and the
//! pool-then-consensus estimation policy used for alignment.

use log::debug;
use nalgebra::{DMatrix, Matrix3, Vector3};
use rescan_core::{Correspondence, Keypoint};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ransac::{ransac, Estimator, RansacOptions};

const EPS: f64 = 1e-9;

pub type Point = (f64, f64);

/// 3×3 projective transform mapping source pixels to target pixels, `H[2,2] == 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// Normalize and validate a raw matrix; `None` if it is singular or not finite
    pub fn from_matrix(m: Matrix3<f64>) -> Option<Self> {
        if m.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let scale = m[(2, 2)];
        let m = if scale.abs() > EPS { m / scale } else { m };
        if m.determinant().abs() < EPS {
            return None;
        }
        Some(Self(m))
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self(Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Map a point; `None` if it lands on the line at infinity
    pub fn apply(&self, (x, y): Point) -> Option<Point> {
        let v = self.0 * Vector3::new(x, y, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() <= EPS {
            return None;
        }
        Some((v[0] / w, v[1] / w))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.0.try_inverse().and_then(Self::from_matrix)
    }

    /// Row-major single-precision copy
    pub fn to_row_major_f32(&self) -> [f32; 9] {
        let mut out = [0f32; 9];
        for r in 0..3 {
            for c in 0..3 {
                out[r * 3 + c] = self.0[(r, c)] as f32;
            }
        }
        out
    }
}

/// Hartley normalization: zero mean, mean distance sqrt(2)
fn normalize_points(points: &[Point]) -> Option<(Vec<Point>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    let (cx, cy) = (sx / n, sy / n);
    let mean_dist = points
        .iter()
        .map(|&(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < EPS {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points.iter().map(|&(x, y)| (s * (x - cx), s * (y - cy))).collect();
    Some((normalized, t))
}

/// Estimate `H` with `target ~ H * source` by the normalized DLT.
///
/// Needs at least four correspondences in general position.
pub fn dlt_homography(source: &[Point], target: &[Point]) -> Option<Homography> {
    let n = source.len();
    if n < 4 || target.len() != n {
        return None;
    }

    let (src_n, t_src) = normalize_points(source)?;
    let (dst_n, t_dst) = normalize_points(target)?;

    // pad to square so the SVD yields a full right-singular basis
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (&(x, y), &(u, v))) in src_n.iter().zip(dst_n.iter()).enumerate() {
        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let h_vec = v_t.row(svd.singular_values.imin());

    let h_norm = Matrix3::from_fn(|r, c| h_vec[3 * r + c]);
    let h = t_dst.try_inverse()? * h_norm * t_src;
    Homography::from_matrix(h)
}

/// Forward reprojection error of one correspondence
pub fn reprojection_error(h: &Homography, source: Point, target: Point) -> f64 {
    match h.apply(source) {
        Some((x, y)) => ((x - target.0).powi(2) + (y - target.1).powi(2)).sqrt(),
        None => f64::INFINITY,
    }
}

fn collinear(a: Point, b: Point, c: Point) -> bool {
    let area = (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0);
    area.abs() < 1e-6
}

#[derive(Debug, Clone, Copy)]
struct PointPair {
    source: Point,
    target: Point,
}

struct HomographyEstimator;

impl HomographyEstimator {
    fn fit_indices(data: &[PointPair], indices: &[usize]) -> Option<Homography> {
        let (source, target): (Vec<Point>, Vec<Point>) =
            indices.iter().map(|&i| (data[i].source, data[i].target)).unzip();
        dlt_homography(&source, &target)
    }
}

impl Estimator for HomographyEstimator {
    type Datum = PointPair;
    type Model = Homography;

    const MIN_SAMPLES: usize = 4;

    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model> {
        Self::fit_indices(data, sample_indices)
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        reprojection_error(model, datum.source, datum.target)
    }

    /// Any three of the four sample points collinear, on either side
    fn is_degenerate(data: &[Self::Datum], sample_indices: &[usize]) -> bool {
        const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
        if sample_indices.len() != 4 {
            return false;
        }
        TRIPLES.iter().any(|&t| {
            let [a, b, c] = t.map(|k| data[sample_indices[k]]);
            collinear(a.source, b.source, c.source) || collinear(a.target, b.target, c.target)
        })
    }

    fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        Self::fit_indices(data, inliers)
    }
}

/// Fit a homography to point pairs with RANSAC, returning it with its inlier indices
pub fn ransac_homography(
    source: &[Point],
    target: &[Point],
    opts: &RansacOptions,
) -> Option<(Homography, Vec<usize>)> {
    if source.len() != target.len() {
        return None;
    }
    let data: Vec<PointPair> = source
        .iter()
        .zip(target)
        .map(|(&source, &target)| PointPair { source, target })
        .collect();

    let res = ransac::<HomographyEstimator>(&data, opts);
    debug!(
        "ransac: {} of {} inliers after {} iterations (rms {:.3})",
        res.inliers.len(),
        data.len(),
        res.iters,
        res.inlier_rms
    );
    res.model.map(|h| (h, res.inliers))
}

/// Tunables of the correspondence-to-homography policy
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EstimatorConfig {
    /// Fraction of the ranked matches kept as the candidate pool
    pub pool_fraction: f64,
    /// Smallest pool worth fitting
    pub min_pool: usize,
    /// Inlier reprojection threshold in pixels
    pub reprojection_threshold: f64,
    pub max_iters: usize,
    pub confidence: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        let ransac = RansacOptions::default();
        Self {
            pool_fraction: 0.15,
            min_pool: 20,
            reprojection_threshold: 3.0,
            max_iters: ransac.max_iters,
            confidence: ransac.confidence,
            min_inliers: ransac.min_inliers,
            seed: ransac.seed,
        }
    }
}

impl EstimatorConfig {
    pub fn ransac_options(&self) -> RansacOptions {
        RansacOptions {
            max_iters: self.max_iters,
            thresh: self.reprojection_threshold,
            min_inliers: self.min_inliers,
            confidence: self.confidence,
            seed: self.seed,
            refit_on_inliers: true,
        }
    }

    /// Number of leading matches kept out of `total`
    pub fn pool_size(&self, total: usize) -> usize {
        ((total as f64) * self.pool_fraction).floor() as usize
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.pool_fraction > 0.0 && self.pool_fraction <= 1.0) {
            return Err(format!("pool_fraction must be in (0, 1], got {}", self.pool_fraction));
        }
        if !(self.reprojection_threshold > 0.0) {
            return Err(format!(
                "reprojection_threshold must be positive, got {}",
                self.reprojection_threshold
            ));
        }
        if self.min_pool < 4 {
            return Err(format!("min_pool must be at least 4, got {}", self.min_pool));
        }
        if self.max_iters == 0 {
            return Err("max_iters must be positive".to_string());
        }
        Ok(())
    }
}

/// Homography from `source_kps` space to `target_kps` space.
///
/// Keeps the strongest `pool_fraction` of `matches` (already ranked
/// strongest first), gives up when fewer than `min_pool` remain, then fits by
/// RANSAC. `None` means no trustworthy transform.
pub fn estimate(
    matches: &[Correspondence],
    source_kps: &[Keypoint],
    target_kps: &[Keypoint],
    cfg: &EstimatorConfig,
) -> Option<Homography> {
    let pool_len = cfg.pool_size(matches.len());
    if pool_len < cfg.min_pool {
        debug!("candidate pool {} of {} matches is below {}", pool_len, matches.len(), cfg.min_pool);
        return None;
    }

    let mut source = Vec::with_capacity(pool_len);
    let mut target = Vec::with_capacity(pool_len);
    for m in &matches[..pool_len] {
        let s = source_kps.get(m.source)?;
        let t = target_kps.get(m.target)?;
        source.push((s.x as f64, s.y as f64));
        target.push((t.x as f64, t.y as f64));
    }

    ransac_homography(&source, &target, &cfg.ransac_options()).map(|(h, _)| h)
}
