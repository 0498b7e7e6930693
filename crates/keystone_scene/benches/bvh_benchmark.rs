//! # BVH Benchmark
//!
//! Per-frame hierarchy rebuild and frustum traversal over random scenes.
//!
//! Run with: `cargo bench --package keystone_scene --bench bvh_benchmark`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keystone_core::ecs::Handle;
use keystone_core::math::Vec3;
use keystone_scene::bvh::{BvhInput, SceneBvh};
use keystone_scene::{BoundingSphere, Frustum, Ray};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_inputs(count: u32) -> Vec<BvhInput> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let position = Vec3::new(
                rng.gen_range(-500.0..500.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-500.0..500.0),
            );
            BvhInput {
                entity: Handle::new(i, 0),
                visibility: Handle::new(i, 0),
                node: Handle::new(i, 0),
                position,
                sphere: BoundingSphere::new(position, rng.gen_range(0.5..4.0)),
                ray_visible: true,
            }
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_build");

    for count in [1_000_u32, 10_000, 100_000] {
        let inputs = random_inputs(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &inputs, |b, inputs| {
            b.iter(|| black_box(SceneBvh::build(inputs)));
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let bvh = SceneBvh::build(&random_inputs(100_000));
    let frustum = Frustum::from_perspective(
        Vec3::new(0.0, 10.0, 0.0),
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::Y,
        1.0,
        16.0 / 9.0,
        0.1,
        300.0,
    );
    let ray = Ray::new(Vec3::new(-600.0, 0.0, 0.0), Vec3::X);

    c.bench_function("bvh_frustum_100k", |b| {
        b.iter(|| {
            let mut visible = 0_usize;
            bvh.traverse(&frustum, |_, ()| visible += 1);
            black_box(visible)
        });
    });

    c.bench_function("bvh_ray_100k", |b| {
        b.iter(|| {
            let mut nearest = f32::MAX;
            bvh.traverse(&ray, |_, t| nearest = nearest.min(t));
            black_box(nearest)
        });
    });
}

criterion_group!(benches, bench_build, bench_queries);
criterion_main!(benches);
