//! FAST-9 corner detection over an image pyramid.
//!
//! [`FastDetector`] handles one resolution; [`PyramidDetector`] runs it on
//! every level of an [`ImagePyramid`] and reports keypoints in full-resolution
//! coordinates, tagged with the level they came from.

pub mod detector;
pub mod error;
pub mod pyramid;
pub mod utils;

pub use detector::{FastDetector, ScoredKeypoint};
pub use error::{FastError, FastResult};
pub use pyramid::{bilinear_sample, ImagePyramid, ScaleLevel};

use log::debug;
use rescan_core::{AlignConfig, Image, Keypoint};

/// Keypoints detected on one pyramid level, with the level image they were found in
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub scale: ScaleLevel,
    pub image: Image,
    /// Full-resolution coordinates; divide by `scale.scale` for level coordinates
    pub keypoints: Vec<Keypoint>,
}

/// Multi-scale FAST detection for arbitrary image sizes
#[derive(Debug, Clone)]
pub struct PyramidDetector {
    cfg: AlignConfig,
}

impl PyramidDetector {
    pub fn new(cfg: AlignConfig) -> FastResult<Self> {
        if cfg.threshold == 0 || cfg.threshold > 127 {
            return Err(FastError::InvalidThreshold(cfg.threshold));
        }
        if cfg.patch_size % 2 == 0 {
            return Err(FastError::InvalidPatchSize { patch_size: cfg.patch_size, min_image_dim: 0 });
        }
        if !(cfg.scale_factor > 1.0) {
            return Err(FastError::InvalidScaleFactor(cfg.scale_factor));
        }
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &AlignConfig {
        &self.cfg
    }

    /// Detect keypoints on every level large enough for the configured patch.
    ///
    /// Images too small for any level produce no levels rather than an error.
    pub fn detect(&self, img: &Image, width: usize, height: usize) -> FastResult<Vec<PyramidLevel>> {
        if width == 0 || height == 0 {
            return Err(FastError::InvalidImageSize { width, height });
        }

        let scale_levels =
            ImagePyramid::generate_scale_levels(width, height, self.cfg.n_levels, self.cfg.scale_factor)?;
        let images = ImagePyramid::build_image_pyramid(img, width, height, &scale_levels)?;

        let mut levels = Vec::with_capacity(scale_levels.len());
        for (scale, image) in scale_levels.into_iter().zip(images) {
            let detector = match FastDetector::new(self.cfg.clone(), scale.width, scale.height) {
                Ok(detector) => detector,
                Err(FastError::ImageTooSmall { .. }) | Err(FastError::InvalidPatchSize { .. }) => {
                    debug!("skipping pyramid level {} ({}x{}): too small", scale.level, scale.width, scale.height);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let keypoints = detector
                .detect_keypoints(&image)?
                .into_iter()
                .map(|kp| Keypoint {
                    x: kp.x * scale.scale,
                    y: kp.y * scale.scale,
                    octave: scale.level,
                    size: kp.size * scale.scale,
                    ..kp
                })
                .collect::<Vec<_>>();

            debug!("pyramid level {}: {} keypoints", scale.level, keypoints.len());
            levels.push(PyramidLevel { scale, image, keypoints });
        }

        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bright squares on a dark background, one per `pitch` cell
    fn square_grid(width: usize, height: usize, pitch: usize, side: usize) -> Image {
        (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| if x % pitch < side && y % pitch < side { 220 } else { 30 })
            })
            .collect()
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = AlignConfig { threshold: 0, ..AlignConfig::default() };
        assert!(matches!(PyramidDetector::new(cfg), Err(FastError::InvalidThreshold(0))));

        let cfg = AlignConfig { scale_factor: 0.5, ..AlignConfig::default() };
        assert!(matches!(PyramidDetector::new(cfg), Err(FastError::InvalidScaleFactor(_))));
    }

    #[test]
    fn tiny_image_yields_no_levels() {
        let detector = PyramidDetector::new(AlignConfig::default()).unwrap();
        let levels = detector.detect(&vec![0; 20 * 20], 20, 20).unwrap();
        assert!(levels.is_empty());
    }

    #[test]
    fn keypoints_are_reported_at_full_resolution() {
        let cfg = AlignConfig { n_levels: 3, ..AlignConfig::default() };
        let detector = PyramidDetector::new(cfg).unwrap();
        let img = square_grid(160, 120, 20, 9);
        let levels = detector.detect(&img, 160, 120).unwrap();
        assert_eq!(levels.len(), 3);
        for level in &levels {
            assert_eq!(level.image.len(), level.scale.width * level.scale.height);
            for kp in &level.keypoints {
                assert_eq!(kp.octave, level.scale.level);
                assert!(kp.x >= 0.0 && kp.x < 160.0);
                assert!(kp.y >= 0.0 && kp.y < 120.0);
            }
        }
        assert!(!levels[0].keypoints.is_empty());
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let detector = PyramidDetector::new(AlignConfig::default()).unwrap();
        assert!(matches!(
            detector.detect(&vec![0; 10], 64, 64),
            Err(FastError::InvalidImageData { .. })
        ));
    }
}
