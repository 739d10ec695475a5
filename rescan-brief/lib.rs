//! Rotated BRIEF descriptors and brute-force Hamming matching.

pub mod matcher;

pub use matcher::{hamming_distance, match_descriptors, match_features};

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use rayon::prelude::*;
use rescan_core::{Descriptor, Image, Keypoint, DESCRIPTOR_BYTES};
use rescan_fast::bilinear_sample;

/// One bit per pair
pub const PAIR_COUNT: usize = DESCRIPTOR_BYTES * 8;

/// Seed of the sampling pattern. Changing it changes every descriptor.
const PATTERN_SEED: u64 = 0x0b71_ef5e_ed00_2a11;

/// Two sample offsets relative to the keypoint, compared to produce one bit
pub type PointPair = (f32, f32, f32, f32);

/// Build the fixed sampling pattern for a patch of `patch_size` pixels.
///
/// Offsets are center-weighted (sum of two uniforms) and kept inside a disc so
/// that any rotation of the pattern stays within the patch.
pub fn sampling_pattern(patch_size: usize) -> Vec<PointPair> {
    let radius = ((patch_size / 2) as f32 - 1.0).max(1.0);
    let mut rng = Pcg32::seed_from_u64(PATTERN_SEED);

    let sample_point = |rng: &mut Pcg32| loop {
        let x = (rng.gen_range(-radius..=radius) + rng.gen_range(-radius..=radius)) * 0.5;
        let y = (rng.gen_range(-radius..=radius) + rng.gen_range(-radius..=radius)) * 0.5;
        if x * x + y * y <= radius * radius {
            return (x.round(), y.round());
        }
    };

    let mut pairs = Vec::with_capacity(PAIR_COUNT);
    while pairs.len() < PAIR_COUNT {
        let (x1, y1) = sample_point(&mut rng);
        let (x2, y2) = sample_point(&mut rng);
        if (x1, y1) != (x2, y2) {
            pairs.push((x1, y1, x2, y2));
        }
    }
    pairs
}

/// Descriptor generation for one pyramid level
pub struct BriefGenerator {
    w: usize,
    h: usize,
    pattern: Vec<PointPair>,
}

impl BriefGenerator {
    pub fn new(width: usize, height: usize, patch_size: usize) -> Self {
        assert!(width > 0 && height > 0);
        Self {
            w: width,
            h: height,
            pattern: sampling_pattern(patch_size),
        }
    }

    /// Describe `kps` (full-resolution coordinates) on a level image downscaled by `scale`.
    ///
    /// `img` should already be smoothed; sampling is bilinear and steered by each keypoint's angle.
    pub fn generate_descriptors(&self, img: &Image, kps: &[Keypoint], scale: f32) -> Vec<Descriptor> {
        assert_eq!(img.len(), self.w * self.h, "level image does not match generator size");

        kps.par_iter()
            .map(|kp| {
                let (s, c) = kp.angle.sin_cos();
                let (cx, cy) = (kp.x / scale, kp.y / scale);
                let mut d = [0u8; DESCRIPTOR_BYTES];

                for (i, &(dx1, dy1, dx2, dy2)) in self.pattern.iter().enumerate() {
                    let (rx1, ry1) = (cx + c * dx1 - s * dy1, cy + s * dx1 + c * dy1);
                    let (rx2, ry2) = (cx + c * dx2 - s * dy2, cy + s * dx2 + c * dy2);

                    let val1 = bilinear_sample(img, self.w, self.h, rx1, ry1);
                    let val2 = bilinear_sample(img, self.w, self.h, rx2, ry2);

                    let bit = (val1 < val2) as u8;
                    d[i / 8] |= bit << (i % 8);
                }
                d
            })
            .collect()
    }

    pub fn pattern(&self) -> &[PointPair] {
        &self.pattern
    }
}
