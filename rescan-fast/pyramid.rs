use rescan_core::Image;
use rayon::prelude::*;
use crate::error::{FastError, FastResult};

/// Levels narrower or shorter than this are not worth searching
pub const MIN_LEVEL_DIM: usize = 32;

/// One pyramid level: level `level` is the full image shrunk by `scale`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub level: usize,
    pub scale: f32,
    pub width: usize,
    pub height: usize,
}

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Generate scale levels for image pyramid. Level 0 is always present.
    pub fn generate_scale_levels(
        width: usize,
        height: usize,
        n_levels: usize,
        scale_factor: f32,
    ) -> FastResult<Vec<ScaleLevel>> {
        if !(scale_factor > 1.0) || !scale_factor.is_finite() {
            return Err(FastError::InvalidScaleFactor(scale_factor));
        }

        let mut levels = vec![ScaleLevel { level: 0, scale: 1.0, width, height }];
        let mut current_scale = scale_factor;

        for level in 1..n_levels.max(1) {
            let scaled_width = ((width as f32) / current_scale) as usize;
            let scaled_height = ((height as f32) / current_scale) as usize;
            if scaled_width < MIN_LEVEL_DIM || scaled_height < MIN_LEVEL_DIM {
                break;
            }
            levels.push(ScaleLevel {
                level,
                scale: current_scale,
                width: scaled_width,
                height: scaled_height,
            });
            current_scale *= scale_factor;
        }

        Ok(levels)
    }

    /// Build image pyramid from base image
    pub fn build_image_pyramid(
        img: &Image,
        width: usize,
        height: usize,
        scale_levels: &[ScaleLevel],
    ) -> FastResult<Vec<Image>> {
        let expected_len = width * height;
        if img.len() != expected_len {
            return Err(FastError::InvalidImageData { expected_len, actual_len: img.len() });
        }

        Ok(scale_levels
            .par_iter()
            .map(|scale_level| {
                if scale_level.level == 0 {
                    img.clone()
                } else {
                    Self::downsample_image(img, width, height, scale_level.width, scale_level.height)
                }
            })
            .collect())
    }

    /// Downsample image using bilinear interpolation
    fn downsample_image(
        img: &Image,
        src_width: usize,
        src_height: usize,
        target_width: usize,
        target_height: usize,
    ) -> Image {
        let x_ratio = src_width as f32 / target_width as f32;
        let y_ratio = src_height as f32 / target_height as f32;

        let mut downsampled = vec![0u8; target_width * target_height];
        for (y, row) in downsampled.chunks_exact_mut(target_width).enumerate() {
            let src_y = y as f32 * y_ratio;
            for (x, px) in row.iter_mut().enumerate() {
                let src_x = x as f32 * x_ratio;
                let value = bilinear_sample(img, src_width, src_height, src_x, src_y);
                *px = value.round().clamp(0.0, 255.0) as u8;
            }
        }
        downsampled
    }
}

/// Sample a grayscale buffer at fractional coordinates, clamping at the border
pub fn bilinear_sample(img: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let x1 = x.floor() as usize;
    let y1 = y.floor() as usize;
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);

    let fx = x - x1 as f32;
    let fy = y - y1 as f32;

    let p11 = img[y1 * width + x1] as f32;
    let p12 = img[y1 * width + x2] as f32;
    let p21 = img[y2 * width + x1] as f32;
    let p22 = img[y2 * width + x2] as f32;

    let top = p11 * (1.0 - fx) + p12 * fx;
    let bottom = p21 * (1.0 - fx) + p22 * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_shrink_by_scale_factor() {
        let levels = ImagePyramid::generate_scale_levels(640, 480, 8, 1.2).unwrap();
        assert_eq!(levels.len(), 8);
        assert_eq!(levels[0], ScaleLevel { level: 0, scale: 1.0, width: 640, height: 480 });
        for pair in levels.windows(2) {
            assert!(pair[1].width < pair[0].width);
            assert!((pair[1].scale / pair[0].scale - 1.2).abs() < 1e-4);
        }
    }

    #[test]
    fn small_images_keep_only_base_level() {
        let levels = ImagePyramid::generate_scale_levels(35, 35, 8, 1.2).unwrap();
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn rejects_non_shrinking_factor() {
        assert!(matches!(
            ImagePyramid::generate_scale_levels(100, 100, 4, 1.0),
            Err(FastError::InvalidScaleFactor(_))
        ));
    }

    #[test]
    fn pyramid_matches_level_dimensions() {
        let img: Image = (0..100 * 80).map(|i| (i % 251) as u8).collect();
        let levels = ImagePyramid::generate_scale_levels(100, 80, 4, 1.5).unwrap();
        let pyramid = ImagePyramid::build_image_pyramid(&img, 100, 80, &levels).unwrap();
        assert_eq!(pyramid.len(), levels.len());
        assert_eq!(pyramid[0], img);
        for (level, buf) in levels.iter().zip(&pyramid) {
            assert_eq!(buf.len(), level.width * level.height);
        }
    }

    #[test]
    fn uniform_image_stays_uniform() {
        let img = vec![77u8; 64 * 64];
        let levels = ImagePyramid::generate_scale_levels(64, 64, 3, 1.2).unwrap();
        let pyramid = ImagePyramid::build_image_pyramid(&img, 64, 64, &levels).unwrap();
        assert!(pyramid.iter().flatten().all(|&p| p == 77));
    }

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let img = [0u8, 100, 0, 100];
        assert!((bilinear_sample(&img, 2, 2, 0.5, 0.0) - 50.0).abs() < 1e-4);
        assert!((bilinear_sample(&img, 2, 2, -3.0, 0.0)).abs() < 1e-4);
    }
}
