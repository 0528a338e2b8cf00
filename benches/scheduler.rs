//! Segmented vs. unsegmented scheduler throughput across group sizes that
//! straddle the default working-set threshold.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use particle_engine::{Context, Domain, Vec3};

fn build_context(group_size: usize, segmented: bool) -> Context {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, group_size).unwrap();
    ctx.set_current_group(0).unwrap();
    ctx.seed(1);
    ctx.set_time_step(1.0 / 60.0);
    if !segmented {
        // Force every action to be its own segment by spacing a kill-free but
        // do_not_segment-tagged action (Sort) between every pair.
        ctx.gen_action_lists(1).unwrap();
        ctx.new_action_list(0).unwrap();
        ctx.gravity(Vec3::new(0.0, -9.8, 0.0)).unwrap();
        ctx.sort(Vec3::ZERO, Vec3::Z, false, false).unwrap();
        ctx.damping(Vec3::new(0.99, 0.99, 0.99), 0.0, 1e6).unwrap();
        ctx.sort(Vec3::ZERO, Vec3::Z, false, false).unwrap();
        ctx.move_particles(true, false).unwrap();
        ctx.end_action_list().unwrap();
    } else {
        ctx.gen_action_lists(1).unwrap();
        ctx.new_action_list(0).unwrap();
        ctx.gravity(Vec3::new(0.0, -9.8, 0.0)).unwrap();
        ctx.damping(Vec3::new(0.99, 0.99, 0.99), 0.0, 1e6).unwrap();
        ctx.move_particles(true, false).unwrap();
        ctx.end_action_list().unwrap();
    }

    for _ in 0..group_size {
        ctx.vertex(Vec3::ZERO, 0).unwrap();
    }
    ctx
}

fn bench_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");
    for &size in &[1_000usize, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("segmented", size), &size, |b, &size| {
            b.iter_batched(
                || build_context(size, true),
                |mut ctx| ctx.call_action_list(0).unwrap(),
                criterion::BatchSize::LargeInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("unsegmented", size), &size, |b, &size| {
            b.iter_batched(
                || build_context(size, false),
                |mut ctx| ctx.call_action_list(0).unwrap(),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_domain_sampling(c: &mut Criterion) {
    c.bench_function("domain_sample_union", |b| {
        let dom = Domain::union(vec![
            Domain::sphere(Vec3::ZERO, 1.0, 0.0).unwrap(),
            Domain::bbox(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0)),
        ]);
        let mut rng = particle_engine::Prng::seed(1);
        b.iter(|| dom.generate(&mut rng));
    });
}

criterion_group!(benches, bench_scheduler, bench_domain_sampling);
criterion_main!(benches);
