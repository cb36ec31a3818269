use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use iconslice::export::trim_transparent;
use iconslice::mask::{self, MaskSettings};
use iconslice::{Axis, GridModel};
use image::{Rgba, RgbaImage};
use std::hint::black_box;

// Helper function to create icon sheets of different patterns
fn create_sheet(width: u32, height: u32, pattern: &str) -> RgbaImage {
    match pattern {
        // Icons every 32px on a flat background color
        "icons" => RgbaImage::from_fn(width, height, |x, y| {
            if x % 32 < 24 && y % 32 < 24 {
                Rgba([40, 90, 160, 255])
            } else {
                Rgba([250, 240, 230, 255])
            }
        }),
        // Noise that defeats the key everywhere
        "noise" => RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 255])
        }),
        // Sparse content on transparency
        "sparse" => RgbaImage::from_fn(width, height, |x, y| {
            if x % 64 == 0 && y % 64 == 0 {
                Rgba([200, 30, 30, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }),
        _ => RgbaImage::from_pixel(width, height, Rgba([250, 240, 230, 255])),
    }
}

// Benchmark masking across sheet sizes
fn bench_mask_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_sizes");
    let sizes = [(128, 128), (512, 512), (1024, 1024), (2048, 2048)];
    let settings = MaskSettings {
        key: Some([250, 240, 230]),
        ..MaskSettings::default()
    };

    for size in sizes.iter() {
        let (width, height) = *size;
        let sheet = create_sheet(width, height, "icons");

        group.bench_with_input(
            BenchmarkId::new("size", format!("{}x{}", width, height)),
            &sheet,
            |b, sheet| {
                b.iter(|| {
                    black_box(mask::apply(sheet, &settings));
                });
            },
        );
    }
    group.finish();
}

// Benchmark feather radii, the dominant cost of masking
fn bench_mask_feather(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_feather");
    let sheet = create_sheet(1024, 1024, "icons");
    let radii = [0u8, 1, 3, 6, 12];

    for feather in radii.iter() {
        let settings = MaskSettings {
            key: Some([250, 240, 230]),
            feather: *feather,
            ..MaskSettings::default()
        };

        group.bench_with_input(BenchmarkId::new("feather", feather), &sheet, |b, sheet| {
            b.iter(|| {
                black_box(mask::apply(sheet, &settings));
            });
        });
    }
    group.finish();
}

// Benchmark partition derivation against divider counts
fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    let divider_counts = [2u32, 8, 16, 64, 256];

    for count in divider_counts.iter() {
        let mut grid = GridModel::new(4096, 4096);
        for i in 1..=*count {
            grid.add_divider(Axis::X, i * 4096 / (count + 1));
            grid.add_divider(Axis::Y, i * 4096 / (count + 1));
        }

        group.bench_with_input(BenchmarkId::new("dividers", count), &grid, |b, grid| {
            b.iter(|| {
                black_box(grid.partition());
            });
        });
    }
    group.finish();
}

// Benchmark content trimming across patterns
fn bench_trim(c: &mut Criterion) {
    let mut group = c.benchmark_group("trim");
    let patterns = ["icons", "noise", "sparse"];

    for pattern in patterns.iter() {
        let cell = create_sheet(256, 256, pattern);

        group.bench_with_input(BenchmarkId::new("pattern", pattern), &cell, |b, cell| {
            b.iter(|| {
                black_box(trim_transparent(cell));
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20); // Reduced sample size for faster runs
    targets = bench_mask_sizes, bench_mask_feather, bench_partition, bench_trim
}
criterion_main!(benches);
