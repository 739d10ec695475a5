use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{imageops, Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use rescan_cli::{AlignConfig, AlignmentPipeline, EstimatorConfig, FeatureExtractor};

/// Random flat rectangles, corner-rich like a textured wall
fn create_scene(width: u32, height: u32) -> RgbImage {
    let mut rng = Pcg32::seed_from_u64(17);
    let mut img = RgbImage::from_pixel(width, height, Rgb([96, 96, 96]));
    for _ in 0..width * height / 900 {
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

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    let extractor = FeatureExtractor::new(AlignConfig::default()).unwrap();
    for &(width, height) in &[(320, 240), (640, 480)] {
        let scene = create_scene(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &scene,
            |b, scene| b.iter(|| black_box(extractor.extract(black_box(scene)).unwrap())),
        );
    }
    group.finish();
}

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("align");
    group.sample_size(20);
    let pipeline = AlignmentPipeline::from_config(AlignConfig::default(), EstimatorConfig::default()).unwrap();
    for &(width, height) in &[(320, 240), (640, 480)] {
        let scene = create_scene(width + 20, height + 20);
        let baseline = imageops::crop_imm(&scene, 10, 10, width, height).to_image();
        let candidate = imageops::crop_imm(&scene, 4, 6, width, height).to_image();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &(candidate, baseline),
            |b, (candidate, baseline)| b.iter(|| black_box(pipeline.align(candidate, baseline).is_ok())),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_extract, bench_align);
criterion_main!(benches);
