//! Distance kernel benchmarks
//!
//! Run with: cargo bench --bench distance

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quiver_core::{detect_simd_level, DataType, Metric, SimdLevel, VectorSpace};
use rand::Rng;

fn random_vector(space: &VectorSpace) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let floats: Vec<f32> = (0..space.aligned_dim).map(|_| rng.gen::<f32>() - 0.5).collect();
    bytemuck::cast_slice(&floats).to_vec()
}

fn random_space_pair(dim: usize, metric: Metric, level: SimdLevel) -> (VectorSpace, Vec<u8>, Vec<u8>) {
    let space = VectorSpace::create(dim, metric, DataType::F32, level).unwrap();
    let a = random_vector(&space);
    let b = random_vector(&space);
    (space, a, b)
}

fn bench_metric(c: &mut Criterion, metric: Metric, name: &str) {
    let dims = [64, 128, 256, 512];
    let fast_level = detect_simd_level();

    let mut group = c.benchmark_group(name);
    for dim in dims {
        group.throughput(Throughput::Elements(dim as u64));

        let (space, a, b) = random_space_pair(dim, metric, SimdLevel::None);
        group.bench_function(format!("scalar_dim_{}", dim), |bencher| {
            bencher.iter(|| space.standard_distance(black_box(&a), black_box(&b)))
        });

        if fast_level != SimdLevel::None {
            let (space, a, b) = random_space_pair(dim, metric, fast_level);
            group.bench_function(format!("simd_dim_{}", dim), |bencher| {
                bencher.iter(|| space.distance(black_box(&a), black_box(&b)))
            });
        }
    }
    group.finish();
}

fn bench_l2(c: &mut Criterion) {
    bench_metric(c, Metric::L2, "l2_distance");
}

fn bench_ip(c: &mut Criterion) {
    bench_metric(c, Metric::Ip, "inner_product");
}

fn bench_cosine(c: &mut Criterion) {
    bench_metric(c, Metric::Cosine, "cosine");
}

criterion_group!(benches, bench_l2, bench_ip, bench_cosine);
criterion_main!(benches);
