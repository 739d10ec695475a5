use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

use crate::homography::Homography;

/// Resample `image` into a `width × height` canvas through `h`.
///
/// `h` maps input pixels to output pixels; every output pixel is pulled back
/// through its inverse and sampled bilinearly. Pixels that fall outside the
/// input are black. `None` for an empty canvas or a transform that cannot be
/// inverted.
pub fn warp(
    image: &RgbImage,
    h: &Homography,
    (width, height): (u32, u32),
) -> Option<RgbImage> {
    if width == 0 || height == 0 {
        return None;
    }
    let projection = Projection::from_matrix(h.to_row_major_f32())?;
    let mut out = RgbImage::new(width, height);
    warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    fn pattern(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 9 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8]))
    }

    fn close(a: &Rgb<u8>, b: &Rgb<u8>) -> bool {
        a.0.iter().zip(b.0.iter()).all(|(&p, &q)| (p as i16 - q as i16).abs() <= 1)
    }

    #[test]
    fn identity_preserves_interior() {
        let img = pattern(40, 30);
        let out = warp(&img, &Homography::identity(), (40, 30)).unwrap();
        for y in 0..29 {
            for x in 0..39 {
                assert!(close(out.get_pixel(x, y), img.get_pixel(x, y)), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn output_takes_requested_size() {
        let img = pattern(64, 48);
        for size in [(100, 20), (10, 90), (64, 48)] {
            let out = warp(&img, &Homography::identity(), size).unwrap();
            assert_eq!(out.dimensions(), size);
        }
    }

    #[test]
    fn translation_shifts_content_and_fills_black() {
        let img = pattern(40, 30);
        let out = warp(&img, &Homography::translation(5.0, 3.0), (40, 30)).unwrap();
        assert!(close(out.get_pixel(15, 13), img.get_pixel(10, 10)));
        assert!(close(out.get_pixel(25, 20), img.get_pixel(20, 17)));
        assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(2, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn empty_canvas_is_rejected() {
        let img = pattern(8, 8);
        assert!(warp(&img, &Homography::identity(), (0, 8)).is_none());
        assert!(warp(&img, &Homography::identity(), (8, 0)).is_none());
    }

    #[test]
    fn scale_maps_into_larger_canvas() {
        let img = pattern(20, 20);
        let h = Homography::from_matrix(Matrix3::new(2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0)).unwrap();
        let out = warp(&img, &h, (40, 40)).unwrap();
        assert!(close(out.get_pixel(10, 10), img.get_pixel(5, 5)));
    }
}
