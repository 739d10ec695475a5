#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Row-major 8-bit grayscale image
pub type Image = Vec<u8>;

/// Key-point ≙ FAST corner + orientation (radians), in full-resolution pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    /// Pyramid level the corner was found on (0 = full resolution)
    pub octave: usize,
    /// Patch diameter in full-resolution pixels
    pub size: f32,
    pub response: f32,
}

impl Keypoint {
    pub fn point(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

pub const DESCRIPTOR_BYTES: usize = 32;

/// 256-bit binary descriptor = 32 bytes
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

/// Keypoints of one image together with their descriptors.
///
/// Index `i` of `keypoints()` belongs to index `i` of `descriptors()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Vec<Descriptor>) -> Self {
        assert_eq!(
            keypoints.len(),
            descriptors.len(),
            "every keypoint needs exactly one descriptor"
        );
        Self { keypoints, descriptors }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Keypoint>, Vec<Descriptor>) {
        (self.keypoints, self.descriptors)
    }
}

/// A claimed pairing between `source[source]` and `target[target]`.
/// Lower distance = stronger match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Correspondence {
    pub source: usize,
    pub target: usize,
    pub distance: u32,
}

/// Detector and descriptor settings shared by the extraction stages
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AlignConfig {
    /// FAST intensity threshold (1-127)
    pub threshold: u8,
    /// Odd patch size used for orientation and descriptor sampling
    pub patch_size: usize,
    pub n_threads: usize,
    /// Upper bound on pyramid levels
    pub n_levels: usize,
    /// Downscale factor between consecutive pyramid levels
    pub scale_factor: f32,
    /// Minimum distance between keypoints kept by non-maximum suppression
    pub nms_radius: f32,
    /// Gaussian sigma applied before descriptor sampling
    pub blur_sigma: f32,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            patch_size: 31,
            n_threads: num_cpus::get().max(1),
            n_levels: 8,
            scale_factor: 1.2,
            nms_radius: 3.0,
            blur_sigma: 2.0,
        }
    }
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}
