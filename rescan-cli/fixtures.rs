//! Synthetic scenes shared by the unit tests.

use image::{imageops, Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Overlapping flat rectangles of random shades on a mid-gray background
pub fn textured_scene(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = Pcg32::seed_from_u64(seed);
    let mut img = RgbImage::from_pixel(width, height, Rgb([96, 96, 96]));
    let count = (width * height / 900).max(4);
    for _ in 0..count {
        let (rw, rh) = (rng.gen_range(6..=30), rng.gen_range(6..=30));
        let (x0, y0) = (rng.gen_range(0..width), rng.gen_range(0..height));
        let shade: u8 = rng.gen_range(10..=245);
        for y in y0..(y0 + rh).min(height) {
            for x in x0..(x0 + rw).min(width) {
                img.put_pixel(x, y, Rgb([shade, shade, shade]));
            }
        }
    }
    img
}

pub fn crop(img: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    imageops::crop_imm(img, x, y, width, height).to_image()
}

/// Mean absolute channel difference over `[x0, x1) × [y0, y1)`
pub fn mean_abs_diff(a: &RgbImage, b: &RgbImage, (x0, y0): (u32, u32), (x1, y1): (u32, u32)) -> f64 {
    let mut total = 0u64;
    let mut n = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            for (p, q) in a.get_pixel(x, y).0.iter().zip(b.get_pixel(x, y).0.iter()) {
                total += (*p as i32 - *q as i32).unsigned_abs() as u64;
                n += 1;
            }
        }
    }
    total as f64 / n.max(1) as f64
}
