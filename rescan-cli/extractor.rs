use image::{imageops, GrayImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use log::debug;
use thiserror::Error;

use rescan_brief::BriefGenerator;
use rescan_core::{AlignConfig, Descriptor, FeatureSet, Keypoint};
use rescan_fast::{FastError, PyramidDetector};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fast(#[from] FastError),
    #[error("Invalid blur sigma: {0} (must be >= 0)")]
    InvalidBlurSigma(f32),
    #[error("Pyramid level {0} buffer does not match its dimensions")]
    LevelBuffer(usize),
}

/// Oriented FAST keypoints with rotated BRIEF descriptors, over every pyramid level
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    detector: PyramidDetector,
}

impl FeatureExtractor {
    pub fn new(cfg: AlignConfig) -> Result<Self, ExtractError> {
        if !(cfg.blur_sigma >= 0.0) {
            return Err(ExtractError::InvalidBlurSigma(cfg.blur_sigma));
        }
        Ok(Self { detector: PyramidDetector::new(cfg)? })
    }

    pub fn config(&self) -> &AlignConfig {
        self.detector.config()
    }

    /// Detect and describe features of `image`.
    ///
    /// Keypoints are in `image` pixel coordinates. An image too small for the
    /// detector gives an empty set.
    pub fn extract(&self, image: &RgbImage) -> Result<FeatureSet, ExtractError> {
        let gray = imageops::grayscale(image);
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        if width == 0 || height == 0 {
            return Ok(FeatureSet::empty());
        }

        let cfg = self.detector.config();
        let levels = self.detector.detect(gray.as_raw(), width, height)?;

        let mut keypoints: Vec<Keypoint> = Vec::new();
        let mut descriptors: Vec<Descriptor> = Vec::new();
        for level in levels {
            if level.keypoints.is_empty() {
                continue;
            }
            let (lw, lh) = (level.scale.width, level.scale.height);
            let smoothed = if cfg.blur_sigma > 0.0 {
                let buffer = GrayImage::from_raw(lw as u32, lh as u32, level.image)
                    .ok_or(ExtractError::LevelBuffer(level.scale.level))?;
                gaussian_blur_f32(&buffer, cfg.blur_sigma).into_raw()
            } else {
                level.image
            };

            let brief = BriefGenerator::new(lw, lh, cfg.patch_size);
            descriptors.extend(brief.generate_descriptors(&smoothed, &level.keypoints, level.scale.scale));
            keypoints.extend(level.keypoints);
        }

        debug!("extracted {} features from {}x{} image", keypoints.len(), width, height);
        Ok(FeatureSet::new(keypoints, descriptors))
    }
}
