//! Step-pipeline benchmarks: stacking, bullets, and broad-phase churn.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use planar_collision::Shape;
use planar_types::{StepConf, Vec2, WorldConf};
use planar_world::{BodyConf, FixtureConf, World};

fn build_stack_world(count: usize) -> World {
    let mut world = World::new(WorldConf::default().with_gravity(Vec2::new(0.0, -10.0)))
        .expect("world conf is valid");

    let ground = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
        .expect("ground body");
    let ground_shape = world
        .create_shape(Shape::edge(Vec2::new(-100.0, 0.0), Vec2::new(100.0, 0.0)))
        .expect("ground shape");
    world
        .create_fixture(FixtureConf::new(ground, ground_shape))
        .expect("ground fixture");

    let box_shape = world
        .create_shape(Shape::box_shape(0.5, 0.5))
        .expect("box shape");
    for column in 0..(count / 10).max(1) {
        for row in 0..10.min(count) {
            let body = world
                .create_body(BodyConf::dynamic_at(Vec2::new(
                    column as f64 * 3.0,
                    0.51 + 1.01 * row as f64,
                )))
                .expect("box body");
            world
                .create_fixture(FixtureConf::new(body, box_shape).density(1.0).friction(0.5))
                .expect("box fixture");
        }
    }
    world
}

fn bench_stack_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_step");
    for &count in &[10usize, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut world = build_stack_world(count);
            let conf = StepConf::default();
            // Warm the contacts up so the benchmark measures steady state.
            for _ in 0..60 {
                world.step(&conf).expect("step");
            }
            b.iter(|| world.step(&conf).expect("step"));
        });
    }
    group.finish();
}

fn bench_bullet_step(c: &mut Criterion) {
    c.bench_function("bullet_toi_step", |b| {
        b.iter_batched(
            || {
                let mut world =
                    World::new(WorldConf::default().with_gravity(Vec2::new(0.0, 0.0)))
                        .expect("world");
                let wall = world
                    .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
                    .expect("wall body");
                let wall_shape = world
                    .create_shape(Shape::box_shape(0.05, 5.0))
                    .expect("wall shape");
                world
                    .create_fixture(FixtureConf::new(wall, wall_shape))
                    .expect("wall fixture");
                let bullet = world
                    .create_body(
                        BodyConf::dynamic_at(Vec2::new(-4.0, 0.0))
                            .bullet(true)
                            .linear_velocity(Vec2::new(400.0, 0.0)),
                    )
                    .expect("bullet body");
                let bullet_shape = world.create_shape(Shape::circle(0.25)).expect("disk");
                world
                    .create_fixture(FixtureConf::new(bullet, bullet_shape).density(1.0))
                    .expect("bullet fixture");
                world
            },
            |mut world| {
                world.step(&StepConf::default()).expect("step");
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_stack_step, bench_bullet_step);
criterion_main!(benches);
