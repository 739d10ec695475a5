use image::RgbImage;
use log::debug;
use thiserror::Error;

use rescan_brief::match_features;
use rescan_core::AlignConfig;
use rescan_geom::{estimate, warp, EstimatorConfig, Homography};

use crate::extractor::{ExtractError, FeatureExtractor};

/// The only failure callers see; the cause is logged, not returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("alignment failed, adjust angle or lighting.")]
pub struct AlignmentFailure;

#[derive(Debug, Error)]
enum FailureCause {
    #[error("feature extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("no descriptor matches ({candidate} candidate, {baseline} baseline features)")]
    NoMatches { candidate: usize, baseline: usize },
    #[error("no homography from {0} matches")]
    NoHomography(usize),
    #[error("homography cannot be used for warping")]
    Warp,
}

/// Registers a candidate photograph onto a baseline photograph.
///
/// Holds no state between calls and can be shared across threads.
#[derive(Debug, Clone)]
pub struct AlignmentPipeline {
    extractor: FeatureExtractor,
    estimator: EstimatorConfig,
}

impl AlignmentPipeline {
    pub fn new(extractor: FeatureExtractor, estimator: EstimatorConfig) -> Self {
        Self { extractor, estimator }
    }

    pub fn from_config(align: AlignConfig, estimator: EstimatorConfig) -> Result<Self, ExtractError> {
        Ok(Self::new(FeatureExtractor::new(align)?, estimator))
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn estimator(&self) -> &EstimatorConfig {
        &self.estimator
    }

    /// Homography taking `candidate` pixels onto `baseline` pixels
    pub fn register(&self, candidate: &RgbImage, baseline: &RgbImage) -> Result<Homography, AlignmentFailure> {
        self.try_register(candidate, baseline).map_err(report)
    }

    /// `candidate` warped into the frame of `baseline`, with the baseline's dimensions
    pub fn align(&self, candidate: &RgbImage, baseline: &RgbImage) -> Result<RgbImage, AlignmentFailure> {
        self.try_register(candidate, baseline)
            .and_then(|h| warp(candidate, &h, baseline.dimensions()).ok_or(FailureCause::Warp))
            .map_err(report)
    }

    fn try_register(&self, candidate: &RgbImage, baseline: &RgbImage) -> Result<Homography, FailureCause> {
        let source = self.extractor.extract(candidate)?;
        let target = self.extractor.extract(baseline)?;

        let matches = match_features(&source, &target);
        if matches.is_empty() {
            return Err(FailureCause::NoMatches { candidate: source.len(), baseline: target.len() });
        }
        debug!("{} matches between {} and {} features", matches.len(), source.len(), target.len());

        estimate(&matches, source.keypoints(), target.keypoints(), &self.estimator)
            .ok_or(FailureCause::NoHomography(matches.len()))
    }
}

fn report(cause: FailureCause) -> AlignmentFailure {
    debug!("alignment failed: {cause}");
    AlignmentFailure
}
