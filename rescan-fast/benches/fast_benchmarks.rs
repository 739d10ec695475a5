use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rescan_core::{AlignConfig, Image};
use rescan_fast::{FastDetector, ImagePyramid, PyramidDetector};

/// Create benchmark image with corner patterns and a mild gradient
fn create_benchmark_image(width: usize, height: usize) -> Image {
    let mut img = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let gradient = ((x as f32 / width as f32) * 50.0) as u8;
            let block = if (x / 13) % 3 == 0 && (y / 11) % 2 == 0 { 120 } else { 0 };
            img[y * width + x] = 60 + gradient + block;
        }
    }
    img
}

fn bench_config() -> AlignConfig {
    AlignConfig {
        n_threads: 1,
        ..AlignConfig::default()
    }
}

fn bench_single_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_level");
    for &(width, height) in &[(128, 128), (320, 240), (640, 480)] {
        let detector = FastDetector::new(bench_config(), width, height).unwrap();
        let img = create_benchmark_image(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &(detector, img),
            |b, (detector, img)| b.iter(|| black_box(detector.detect_keypoints(black_box(img)).unwrap())),
        );
    }
    group.finish();
}

fn bench_pyramid(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid");
    let (width, height) = (640, 480);
    let img = create_benchmark_image(width, height);
    let cfg = bench_config();

    group.bench_function("build", |b| {
        let levels = ImagePyramid::generate_scale_levels(width, height, cfg.n_levels, cfg.scale_factor).unwrap();
        b.iter(|| black_box(ImagePyramid::build_image_pyramid(black_box(&img), width, height, &levels).unwrap()))
    });

    let detector = PyramidDetector::new(cfg).unwrap();
    group.bench_function("detect", |b| {
        b.iter(|| black_box(detector.detect(black_box(&img), width, height).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_single_level, bench_pyramid);
criterion_main!(benches);
