//! Codec hot-path benchmarks: compressed decode via both backends

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use splat_ply_codec::{
    build_splat_buffer, build_splat_buffer_batch, compress, decompress, GaussianPoint, RawCloud,
    SchemaKind,
};

fn fixture(count: usize) -> RawCloud {
    let points = (0..count)
        .map(|i| {
            let t = i as f32 / count as f32;
            GaussianPoint {
                position: [t * 20.0, (t * 9.0).sin() * 5.0, t * t * 3.0],
                scale: [-6.0 + 2.0 * t, -5.0 + t, -4.0 - t],
                rotation: [1.0 - t, 0.5 * t, -0.25 * t, 0.1],
                color: [t, 1.0 - t, 0.5],
                opacity: 0.1 + 0.8 * t,
            }
        })
        .collect();
    RawCloud {
        points,
        schema: SchemaKind::Gaussian,
    }
}

fn bench_decode(c: &mut Criterion) {
    let compressed = compress(&fixture(100_000));

    let mut group = c.benchmark_group("compressed_to_splat");
    group.bench_function("scalar", |b| {
        b.iter(|| build_splat_buffer(&decompress(black_box(&compressed)).points));
    });
    group.bench_function("batch", |b| {
        b.iter(|| build_splat_buffer_batch(black_box(&compressed)));
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let cloud = fixture(100_000);
    c.bench_function("raw_to_compressed", |b| {
        b.iter(|| compress(black_box(&cloud)));
    });
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
