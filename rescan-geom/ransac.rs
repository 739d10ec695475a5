//! Generic, model-agnostic RANSAC.
//!
//! Implement [`Estimator`] for a model and call [`ransac`] with the data and
//! [`RansacOptions`]. Failure to reach consensus is reported through
//! `RansacResult::model == None`, never by panicking.

use rand::seq::index;
use rand::SeedableRng;
use rand_pcg::Pcg64;

/// Configuration parameters for the RANSAC loop
#[derive(Debug, Clone, PartialEq)]
pub struct RansacOptions {
    /// Maximum number of iterations
    pub max_iters: usize,
    /// Inlier residual threshold
    pub thresh: f64,
    /// Minimum number of inliers required to accept a model
    pub min_inliers: usize,
    /// Desired probability in `[0, 1]` of drawing at least one outlier-free sample
    pub confidence: f64,
    /// Sampler seed; equal seeds give equal results
    pub seed: u64,
    /// Refit the model on all inliers before scoring
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            thresh: 3.0,
            min_inliers: 4,
            confidence: 0.995,
            seed: 0x5eed_a11c,
            refit_on_inliers: true,
        }
    }
}

/// Output of a RANSAC run
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    /// Best model found, if any reached consensus
    pub model: Option<M>,
    /// Indices of inlier data points
    pub inliers: Vec<usize>,
    /// Root-mean-square residual over inliers
    pub inlier_rms: f64,
    /// Iterations actually performed
    pub iters: usize,
}

impl<M> Default for RansacResult<M> {
    fn default() -> Self {
        Self {
            model: None,
            inliers: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters: 0,
        }
    }
}

impl<M> RansacResult<M> {
    pub fn success(&self) -> bool {
        self.model.is_some()
    }
}

/// A model that RANSAC can fit from minimal samples
pub trait Estimator {
    type Datum;
    type Model;

    /// Minimal number of samples needed to estimate a model
    const MIN_SAMPLES: usize;

    /// Fit a model from a subset of data indices; `None` if fitting fails
    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum, in the units of `RansacOptions::thresh`
    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64;

    /// Reject degenerate samples before fitting
    fn is_degenerate(_data: &[Self::Datum], _sample_indices: &[usize]) -> bool {
        false
    }

    /// Refit on the full inlier set; `None` keeps the minimal-sample model
    fn refit(_data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

fn rms(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::INFINITY;
    }
    let ss: f64 = vals.iter().map(|&v| v * v).sum();
    (ss / (vals.len() as f64)).sqrt()
}

/// Iterations needed to hit `confidence` at the observed inlier ratio
fn calculate_iterations(
    confidence: f64,
    inlier_ratio: f64,
    min_samples: usize,
    iters_so_far: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }

    let denom = (1.0 - inlier_ratio.powf(min_samples as f64)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }

    let n_iter = ((1.0 - confidence).max(f64::MIN_POSITIVE).ln() / denom).ceil() as usize;
    n_iter.clamp(iters_so_far, max_iters)
}

fn collect_inliers<E: Estimator>(
    model: &E::Model,
    data: &[E::Datum],
    thresh: f64,
    inliers: &mut Vec<usize>,
    residuals: &mut Vec<f64>,
) {
    inliers.clear();
    residuals.clear();
    for (i, datum) in data.iter().enumerate() {
        let r = E::residual(model, datum);
        if r <= thresh {
            inliers.push(i);
            residuals.push(r);
        }
    }
}

/// Run RANSAC for an [`Estimator`].
///
/// The best model maximizes the inlier count, ties broken by lower RMS.
pub fn ransac<E: Estimator>(data: &[E::Datum], opts: &RansacOptions) -> RansacResult<E::Model> {
    let mut best: RansacResult<E::Model> = RansacResult::default();

    if data.len() < E::MIN_SAMPLES {
        return best;
    }

    let mut rng = Pcg64::seed_from_u64(opts.seed);
    let mut sample_idxs = Vec::with_capacity(E::MIN_SAMPLES);
    let mut inliers = Vec::with_capacity(data.len());
    let mut residuals = Vec::with_capacity(data.len());

    let mut dynamic_max_iters = opts.max_iters;
    let mut num_iters = 0;
    while num_iters < dynamic_max_iters {
        num_iters += 1;

        sample_idxs.clear();
        sample_idxs.extend(index::sample(&mut rng, data.len(), E::MIN_SAMPLES).iter());

        if E::is_degenerate(data, &sample_idxs) {
            continue;
        }

        let Some(mut model) = E::fit(data, &sample_idxs) else {
            continue;
        };

        collect_inliers::<E>(&model, data, opts.thresh, &mut inliers, &mut residuals);
        if inliers.len() < opts.min_inliers.max(E::MIN_SAMPLES) {
            continue;
        }

        if opts.refit_on_inliers {
            if let Some(refit) = E::refit(data, &inliers) {
                let mut refit_inliers = Vec::with_capacity(data.len());
                let mut refit_residuals = Vec::with_capacity(data.len());
                collect_inliers::<E>(&refit, data, opts.thresh, &mut refit_inliers, &mut refit_residuals);
                // keep the refit only if it does not lose support
                if refit_inliers.len() >= inliers.len() {
                    model = refit;
                    inliers = refit_inliers;
                    residuals = refit_residuals;
                }
            }
        }

        let inlier_rms = rms(&residuals);
        let better = best.model.is_none()
            || inliers.len() > best.inliers.len()
            || (inliers.len() == best.inliers.len() && inlier_rms < best.inlier_rms);

        if better {
            best.model = Some(model);
            best.inliers = inliers.clone();
            best.inlier_rms = inlier_rms;
            best.iters = num_iters;

            let inlier_ratio = best.inliers.len() as f64 / data.len() as f64;
            dynamic_max_iters = calculate_iterations(
                opts.confidence,
                inlier_ratio,
                E::MIN_SAMPLES,
                num_iters,
                opts.max_iters,
            );
        }
    }

    best
}
