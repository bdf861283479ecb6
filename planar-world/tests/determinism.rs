//! Deterministic replay: identical snapshots stepped with identical
//! configurations produce bit-identical trajectories.

use planar_collision::Shape;
use planar_types::{BodyId, StepConf, Vec2, WorldConf};
use planar_world::{BodyConf, FixtureConf, World};

/// A mixed scene: stack, loose bodies, a pendulum-ish circle pile.
fn build_scene() -> (World, Vec<BodyId>) {
    let mut world = World::new(WorldConf::default().with_gravity(Vec2::new(0.0, -10.0))).unwrap();

    let ground = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
        .unwrap();
    let ground_shape = world
        .create_shape(Shape::edge(Vec2::new(-50.0, 0.0), Vec2::new(50.0, 0.0)))
        .unwrap();
    world.create_fixture(FixtureConf::new(ground, ground_shape)).unwrap();

    let box_shape = world.create_shape(Shape::box_shape(0.5, 0.5)).unwrap();
    let circle_shape = world.create_shape(Shape::circle(0.4)).unwrap();

    let mut bodies = Vec::new();
    for i in 0..8 {
        let body = world
            .create_body(BodyConf::dynamic_at(Vec2::new(-3.0, 0.6 + 1.1 * f64::from(i))))
            .unwrap();
        world
            .create_fixture(FixtureConf::new(body, box_shape).friction(0.4))
            .unwrap();
        bodies.push(body);
    }
    for i in 0..8 {
        let body = world
            .create_body(
                BodyConf::dynamic_at(Vec2::new(3.0 + 0.1 * f64::from(i), 2.0 + f64::from(i)))
                    .linear_velocity(Vec2::new(-1.0, 0.0)),
            )
            .unwrap();
        world
            .create_fixture(FixtureConf::new(body, circle_shape).restitution(0.3))
            .unwrap();
        bodies.push(body);
    }
    (world, bodies)
}

fn signature(world: &World, bodies: &[BodyId]) -> Vec<u64> {
    let mut bits = Vec::with_capacity(bodies.len() * 4);
    for &id in bodies {
        let body = world.body(id).unwrap();
        bits.push(body.position().x.to_bits());
        bits.push(body.position().y.to_bits());
        bits.push(body.velocity().linear.x.to_bits());
        bits.push(body.velocity().angular.to_bits());
    }
    bits
}

#[test]
fn test_bit_identical_replay() {
    let (mut world_a, bodies_a) = build_scene();
    let (mut world_b, bodies_b) = build_scene();

    let conf = StepConf::default();
    for step in 0..240 {
        world_a.step(&conf).unwrap();
        world_b.step(&conf).unwrap();
        assert_eq!(
            signature(&world_a, &bodies_a),
            signature(&world_b, &bodies_b),
            "trajectories diverged at step {step}"
        );
    }
}

#[test]
fn test_varied_step_conf_sequences_replay_identically() {
    let (mut world_a, bodies_a) = build_scene();
    let (mut world_b, bodies_b) = build_scene();

    // A repeating sequence of differing configurations.
    let confs = [
        StepConf::default(),
        StepConf::with_dt(1.0 / 120.0).iterations(4, 2),
        StepConf::default().max_sub_steps(0),
    ];
    for step in 0..120 {
        let conf = &confs[step % confs.len()];
        world_a.step(conf).unwrap();
        world_b.step(conf).unwrap();
    }
    assert_eq!(signature(&world_a, &bodies_a), signature(&world_b, &bodies_b));
}

#[test]
fn test_step_stats_replay_identically() {
    let (mut world_a, _) = build_scene();
    let (mut world_b, _) = build_scene();

    let conf = StepConf::default();
    for _ in 0..120 {
        let stats_a = world_a.step(&conf).unwrap();
        let stats_b = world_b.step(&conf).unwrap();
        assert_eq!(stats_a.pre, stats_b.pre);
        assert_eq!(stats_a.reg.islands_found, stats_b.reg.islands_found);
        assert_eq!(stats_a.reg.bodies_slept, stats_b.reg.bodies_slept);
    }
}
