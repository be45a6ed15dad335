use bg_eraser::utils::{ImagePreprocessor, PreprocessingConfig};
use bg_eraser::{BackgroundColor, ExportEncoder, ImageResizer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgba, RgbaImage};
use std::time::Duration;

/// Gradient with a transparent left half, roughly what a cut-out looks like
fn create_cutout(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let alpha = if x < width / 2 { 0 } else { 255 };
        Rgba([r, g, 128, alpha])
    })
}

fn bench_previews(c: &mut Criterion) {
    let mut group = c.benchmark_group("preview_resize");
    group.measurement_time(Duration::from_secs(8));
    group.sample_size(20);

    for (width, height) in [(1024, 768), (3000, 2000)] {
        let image = DynamicImage::ImageRgba8(create_cutout(width, height));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &image,
            |b, image| b.iter(|| ImageResizer::fit_within(black_box(image), 800, 800).unwrap()),
        );
    }

    group.finish();
}

fn bench_encoders(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_encoders");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    let cutout = create_cutout(1024, 768);

    group.bench_function("flatten", |b| {
        b.iter(|| ExportEncoder::flatten(black_box(&cutout), BackgroundColor::WHITE));
    });
    group.bench_function("png", |b| {
        b.iter(|| ExportEncoder::to_png(black_box(&cutout)).unwrap());
    });
    for quality in [60u8, 90] {
        group.bench_with_input(BenchmarkId::new("jpeg", quality), &quality, |b, &quality| {
            b.iter(|| {
                ExportEncoder::to_jpeg(black_box(&cutout), BackgroundColor::WHITE, quality).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    group.sample_size(10);

    let config = PreprocessingConfig {
        target_size: [1024, 1024],
        normalization_mean: [0.5, 0.5, 0.5],
        normalization_std: [1.0, 1.0, 1.0],
    };
    let image = DynamicImage::ImageRgba8(create_cutout(1920, 1080));

    group.bench_function("letterbox_1024", |b| {
        b.iter(|| ImagePreprocessor::preprocess_for_inference(black_box(&image), &config).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_previews, bench_encoders, bench_preprocessing);
criterion_main!(benches);
