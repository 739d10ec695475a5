use std::collections::HashMap;

use rescan_core::{AlignConfig, Image, Keypoint};
use rayon::prelude::*;

use crate::error::{FastError, FastResult};
use crate::utils::{has_consecutive_bits, FAST_ARC, FAST_RING};

/// FAST needs a 3-pixel ring around every tested pixel
pub const MIN_SIZE: usize = 7;

/// Corner before suppression; `response` orders the candidates
#[derive(Debug, Clone, Copy)]
pub struct ScoredKeypoint {
    pub keypoint: Keypoint,
    pub response: f32,
}

/// Which side of the center the contiguous arc lies on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Polarity {
    Brighter,
    Darker,
}

/// FAST-9 detector for a single image size
#[derive(Debug, Clone)]
pub struct FastDetector {
    cfg: AlignConfig,
    w: usize,
    h: usize,
}

impl FastDetector {
    /// Creates a new FAST detector with validation
    pub fn new(cfg: AlignConfig, width: usize, height: usize) -> FastResult<Self> {
        if width == 0 || height == 0 {
            return Err(FastError::InvalidImageSize { width, height });
        }

        if width < MIN_SIZE || height < MIN_SIZE {
            return Err(FastError::ImageTooSmall { width, height, min_size: MIN_SIZE });
        }

        // 0 would accept every pixel, >127 overflows the ring comparisons
        if cfg.threshold == 0 || cfg.threshold > 127 {
            return Err(FastError::InvalidThreshold(cfg.threshold));
        }

        let min_dim = width.min(height);
        if cfg.patch_size % 2 == 0 || cfg.patch_size >= min_dim {
            return Err(FastError::InvalidPatchSize {
                patch_size: cfg.patch_size,
                min_image_dim: min_dim,
            });
        }

        Ok(Self { cfg, w: width, h: height })
    }

    fn validate_image(&self, img: &Image) -> FastResult<()> {
        let expected_len = self.w * self.h;
        if img.len() != expected_len {
            return Err(FastError::InvalidImageData { expected_len, actual_len: img.len() });
        }
        Ok(())
    }

    /// Detect oriented corners, suppressed to one per `nms_radius` neighbourhood.
    /// Coordinates are in this detector's pixel grid.
    pub fn detect_keypoints(&self, img: &Image) -> FastResult<Vec<Keypoint>> {
        let scored = self.detect_keypoints_with_response(img)?;
        let suppressed = self.non_maximum_suppression(&scored, self.cfg.nms_radius);
        Ok(suppressed.into_iter().map(|sk| sk.keypoint).collect())
    }

    /// Detect keypoints with corner response scores, before suppression.
    ///
    /// Corners closer to the border than half a patch are skipped so the
    /// orientation and descriptor patches always lie inside the image.
    pub fn detect_keypoints_with_response(&self, img: &Image) -> FastResult<Vec<ScoredKeypoint>> {
        self.validate_image(img)?;

        let border = (self.cfg.patch_size / 2).max(3);
        if self.w <= 2 * border || self.h <= 2 * border {
            return Ok(Vec::new());
        }

        let keypoints = (border..self.h - border)
            .into_par_iter()
            .flat_map_iter(|y| {
                let mut row = Vec::new();
                for x in border..self.w - border {
                    let Some((_, response)) = self.segment_test(img, x, y) else {
                        continue;
                    };
                    let angle = self.compute_orientation(img, x, y);
                    row.push(ScoredKeypoint {
                        keypoint: Keypoint {
                            x: x as f32,
                            y: y as f32,
                            angle,
                            octave: 0,
                            size: self.cfg.patch_size as f32,
                            response,
                        },
                        response,
                    });
                }
                row
            })
            .collect();

        Ok(keypoints)
    }

    /// Classify the ring around (x, y); the response is the mean absolute
    /// contrast of the ring pixels on the winning side.
    fn segment_test(&self, img: &Image, x: usize, y: usize) -> Option<(Polarity, f32)> {
        let p = img[y * self.w + x] as i32;
        let t = self.cfg.threshold as i32;

        let mut bright_mask = 0u16;
        let mut dark_mask = 0u16;
        let mut bright_sum = 0i32;
        let mut dark_sum = 0i32;

        for (i, &(dx, dy)) in FAST_RING.iter().enumerate() {
            let xx = (x as i32 + dx) as usize;
            let yy = (y as i32 + dy) as usize;
            let q = img[yy * self.w + xx] as i32;
            if q >= p + t {
                bright_mask |= 1 << i;
                bright_sum += q - p;
            } else if q <= p - t {
                dark_mask |= 1 << i;
                dark_sum += p - q;
            }
        }

        if has_consecutive_bits(bright_mask, FAST_ARC) {
            Some((Polarity::Brighter, bright_sum as f32 / bright_mask.count_ones() as f32))
        } else if has_consecutive_bits(dark_mask, FAST_ARC) {
            Some((Polarity::Darker, dark_sum as f32 / dark_mask.count_ones() as f32))
        } else {
            None
        }
    }

    /// Non-Maximum Suppression to remove nearby redundant keypoints.
    ///
    /// Strongest first; ties keep detection (row-major) order.
    fn non_maximum_suppression(&self, keypoints: &[ScoredKeypoint], min_distance: f32) -> Vec<ScoredKeypoint> {
        if keypoints.is_empty() {
            return Vec::new();
        }
        if min_distance <= 0.0 {
            return keypoints.to_vec();
        }

        let mut sorted_keypoints = keypoints.to_vec();
        sorted_keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));

        let min_distance_sq = min_distance * min_distance;
        let cell_of = |kp: &Keypoint| {
            ((kp.x / min_distance).floor() as i64, (kp.y / min_distance).floor() as i64)
        };

        // accepted keypoints bucketed by a grid of min_distance cells
        let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        let mut suppressed: Vec<ScoredKeypoint> = Vec::new();

        for candidate in sorted_keypoints {
            let (cx, cy) = cell_of(&candidate.keypoint);
            let mut is_local_maximum = true;

            'search: for gy in cy - 1..=cy + 1 {
                for gx in cx - 1..=cx + 1 {
                    let Some(bucket) = grid.get(&(gx, gy)) else {
                        continue;
                    };
                    for &idx in bucket {
                        let accepted = &suppressed[idx].keypoint;
                        let dx = candidate.keypoint.x - accepted.x;
                        let dy = candidate.keypoint.y - accepted.y;
                        if dx * dx + dy * dy < min_distance_sq {
                            is_local_maximum = false;
                            break 'search;
                        }
                    }
                }
            }

            if is_local_maximum {
                grid.entry((cx, cy)).or_default().push(suppressed.len());
                suppressed.push(candidate);
            }
        }

        suppressed
    }

    /// Intensity-centroid orientation over a circular patch
    fn compute_orientation(&self, img: &Image, x: usize, y: usize) -> f32 {
        let half = (self.cfg.patch_size / 2) as i32;
        let (cx, cy) = (x as i32, y as i32);
        let radius_sq = half * half;

        let mut m10 = 0i64;
        let mut m01 = 0i64;

        for dy in -half..=half {
            let yy = (cy + dy).clamp(0, self.h as i32 - 1) as usize;
            for dx in -half..=half {
                if dx * dx + dy * dy > radius_sq {
                    continue;
                }
                let xx = (cx + dx).clamp(0, self.w as i32 - 1) as usize;
                let val = img[yy * self.w + xx] as i64;
                m10 += dx as i64 * val;
                m01 += dy as i64 * val;
            }
        }

        (m01 as f32).atan2(m10 as f32)
    }

    /// Get detector configuration
    pub fn config(&self) -> &AlignConfig {
        &self.cfg
    }

    /// Get image dimensions
    pub fn dimensions(&self) -> (usize, usize) {
        (self.w, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> AlignConfig {
        AlignConfig {
            threshold: 20,
            patch_size: 15,
            n_threads: 1,
            ..AlignConfig::default()
        }
    }

    fn create_small_test_config() -> AlignConfig {
        AlignConfig {
            patch_size: 5,
            ..create_test_config()
        }
    }

    fn create_test_image(width: usize, height: usize) -> Image {
        vec![128; width * height]
    }

    /// Bright square on a dark background: its four corners pass FAST-9
    fn create_square_image(width: usize, height: usize, half: i32) -> Image {
        let mut img = vec![50; width * height];
        let cx = (width / 2) as i32;
        let cy = (height / 2) as i32;
        for y in cy - half..=cy + half {
            for x in cx - half..=cx + half {
                img[y as usize * width + x as usize] = 255;
            }
        }
        img
    }

    fn create_multiple_squares_image(width: usize, height: usize) -> Image {
        let mut img = vec![50; width * height];
        let centers = [(width / 4, height / 4), (3 * width / 4, height / 4), (width / 2, 3 * height / 4)];
        for &(cx, cy) in &centers {
            for y in cy - 3..=cy + 3 {
                for x in cx - 3..=cx + 3 {
                    img[y * width + x] = 255;
                }
            }
        }
        img
    }

    #[test]
    fn test_valid_constructor() {
        assert!(FastDetector::new(create_test_config(), 100, 100).is_ok());
    }

    #[test]
    fn test_invalid_dimensions() {
        let result = FastDetector::new(create_test_config(), 0, 100);
        assert!(matches!(result, Err(FastError::InvalidImageSize { .. })));

        let result = FastDetector::new(create_test_config(), 100, 0);
        assert!(matches!(result, Err(FastError::InvalidImageSize { .. })));
    }

    #[test]
    fn test_too_small_image() {
        let result = FastDetector::new(create_test_config(), 6, 6);
        assert!(matches!(result, Err(FastError::ImageTooSmall { .. })));
    }

    #[test]
    fn test_invalid_threshold() {
        let mut cfg = create_test_config();

        cfg.threshold = 0;
        let result = FastDetector::new(cfg.clone(), 100, 100);
        assert!(matches!(result, Err(FastError::InvalidThreshold(0))));

        cfg.threshold = 200;
        let result = FastDetector::new(cfg, 100, 100);
        assert!(matches!(result, Err(FastError::InvalidThreshold(200))));
    }

    #[test]
    fn test_invalid_patch_size() {
        let mut cfg = create_test_config();

        cfg.patch_size = 16;
        let result = FastDetector::new(cfg.clone(), 100, 100);
        assert!(matches!(result, Err(FastError::InvalidPatchSize { .. })));

        cfg.patch_size = 101;
        let result = FastDetector::new(cfg, 100, 100);
        assert!(matches!(result, Err(FastError::InvalidPatchSize { .. })));
    }

    #[test]
    fn test_invalid_image_data() {
        let detector = FastDetector::new(create_small_test_config(), 10, 10).unwrap();
        let img = vec![0; 50];
        let result = detector.detect_keypoints(&img);
        assert!(matches!(result, Err(FastError::InvalidImageData { expected_len: 100, actual_len: 50 })));
    }

    #[test]
    fn test_uniform_image_has_no_corners() {
        let detector = FastDetector::new(create_small_test_config(), 10, 10).unwrap();
        let keypoints = detector.detect_keypoints(&create_test_image(10, 10)).unwrap();
        assert!(keypoints.is_empty());
    }

    #[test]
    fn test_square_corners_detected() {
        let detector = FastDetector::new(create_small_test_config(), 40, 40).unwrap();
        let keypoints = detector.detect_keypoints(&create_square_image(40, 40, 6)).unwrap();
        assert!(!keypoints.is_empty());
        // every detection sits near one of the four square corners
        for kp in &keypoints {
            let near_corner = [(14.0, 14.0), (26.0, 14.0), (14.0, 26.0), (26.0, 26.0)]
                .iter()
                .any(|&(cx, cy): &(f32, f32)| (kp.x - cx).abs() <= 2.0 && (kp.y - cy).abs() <= 2.0);
            assert!(near_corner, "unexpected keypoint at ({}, {})", kp.x, kp.y);
        }
    }

    #[test]
    fn test_border_corners_skipped() {
        let cfg = AlignConfig { patch_size: 35, ..create_test_config() };
        let detector = FastDetector::new(cfg, 40, 40).unwrap();
        // square corners at 14..16 and 24..26 lie within the 17-pixel border
        let keypoints = detector.detect_keypoints(&create_square_image(40, 40, 6)).unwrap();
        assert!(keypoints.is_empty());
    }

    #[test]
    fn test_non_maximum_suppression() {
        let detector = FastDetector::new(create_test_config(), 60, 60).unwrap();
        let img = create_multiple_squares_image(60, 60);

        let scored = detector.detect_keypoints_with_response(&img).unwrap();
        let suppressed = detector.non_maximum_suppression(&scored, 5.0);

        assert!(!suppressed.is_empty());
        assert!(suppressed.len() <= scored.len());
        for i in 0..suppressed.len() {
            for j in (i + 1)..suppressed.len() {
                let dx = suppressed[i].keypoint.x - suppressed[j].keypoint.x;
                let dy = suppressed[i].keypoint.y - suppressed[j].keypoint.y;
                let distance = (dx * dx + dy * dy).sqrt();
                assert!(distance >= 5.0, "Keypoints too close after NMS: {}", distance);
            }
        }
    }

    #[test]
    fn test_configuration_access() {
        let cfg = create_test_config();
        let detector = FastDetector::new(cfg.clone(), 20, 20).unwrap();
        assert_eq!(detector.config().threshold, cfg.threshold);
        assert_eq!(detector.config().patch_size, cfg.patch_size);
        assert_eq!(detector.dimensions(), (20, 20));
    }

    #[test]
    fn test_boundary_cases() {
        let detector = FastDetector::new(create_small_test_config(), 7, 7).unwrap();
        assert!(detector.detect_keypoints(&create_test_image(7, 7)).unwrap().is_empty());
    }

    #[test]
    fn test_orientation_points_towards_bright_mass() {
        let detector = FastDetector::new(create_small_test_config(), 21, 21).unwrap();
        let mut img = vec![0u8; 21 * 21];
        // bright half to the right of the center
        for y in 0..21 {
            for x in 11..21 {
                img[y * 21 + x] = 200;
            }
        }
        let angle = detector.compute_orientation(&img, 10, 10);
        assert!(angle.abs() < 1e-3, "angle {angle}");
    }

    #[test]
    fn test_repeated_detection_is_identical() {
        let detector = FastDetector::new(create_test_config(), 100, 100).unwrap();
        let img = create_multiple_squares_image(100, 100);
        let first = detector.detect_keypoints(&img).unwrap();
        for _ in 0..5 {
            assert_eq!(detector.detect_keypoints(&img).unwrap(), first);
        }
    }

    #[test]
    fn test_segment_test_polarity() {
        let detector = FastDetector::new(create_small_test_config(), 40, 40).unwrap();
        let img = create_square_image(40, 40, 6);
        assert_eq!(detector.segment_test(&img, 14, 14), Some((Polarity::Darker, 205.0)));
        assert_eq!(detector.segment_test(&img, 13, 13), None);
        assert_eq!(detector.segment_test(&img, 20, 20), None);

        let inverted: Image = img.iter().map(|&v| 255 - v).collect();
        assert_eq!(detector.segment_test(&inverted, 14, 14), Some((Polarity::Brighter, 205.0)));
    }

    #[test]
    fn test_response_scoring() {
        let detector = FastDetector::new(create_small_test_config(), 40, 40).unwrap();
        let scored = detector
            .detect_keypoints_with_response(&create_square_image(40, 40, 6))
            .unwrap();
        for sk in &scored {
            assert!(sk.response >= 20.0);
            assert!(sk.response.is_finite());
        }
    }
}
