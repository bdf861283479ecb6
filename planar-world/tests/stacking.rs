//! Vertical-stack stability: the stack settles, sleeps, and stays put.

use planar_collision::Shape;
use planar_types::{BodyId, StepConf, Vec2, WorldConf};
use planar_world::{BodyConf, FixtureConf, World};

const STACK_COUNT: usize = 15;

/// A column of unit boxes resting on a ground edge.
fn build_stack(warm_starting: bool) -> (World, Vec<BodyId>, StepConf) {
    let mut world = World::new(WorldConf::default().with_gravity(Vec2::new(0.0, -10.0))).unwrap();

    let ground = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
        .unwrap();
    let ground_shape = world
        .create_shape(Shape::edge(Vec2::new(-40.0, 0.0), Vec2::new(40.0, 0.0)))
        .unwrap();
    world
        .create_fixture(FixtureConf::new(ground, ground_shape).friction(0.5))
        .unwrap();

    let box_shape = world.create_shape(Shape::box_shape(0.5, 0.5)).unwrap();
    let mut boxes = Vec::new();
    for i in 0..STACK_COUNT {
        let y = 0.51 + 1.01 * i as f64;
        let body = world
            .create_body(BodyConf::dynamic_at(Vec2::new(0.0, y)))
            .unwrap();
        world
            .create_fixture(
                FixtureConf::new(body, box_shape)
                    .density(1.0)
                    .friction(0.5),
            )
            .unwrap();
        boxes.push(body);
    }

    let conf = StepConf::default().iterations(8, 3).warm_starting(warm_starting);
    (world, boxes, conf)
}

#[test]
fn test_stack_settles_and_sleeps() {
    let (mut world, boxes, conf) = build_stack(true);

    let top = boxes[STACK_COUNT - 1];
    let initial_x = world.body(top).unwrap().position().x;

    let mut slept = 0;
    for _ in 0..600 {
        let stats = world.step(&conf).unwrap();
        slept += stats.reg.bodies_slept;
    }

    for &body in &boxes {
        assert!(
            !world.body(body).unwrap().is_awake(),
            "box at {:?} is still awake after 600 steps",
            world.body(body).unwrap().position()
        );
    }
    assert!(slept >= STACK_COUNT as u32, "sleep transitions were recorded");

    let top_position = world.body(top).unwrap().position();
    assert!(
        (top_position.x - initial_x).abs() < 0.02,
        "top box drifted horizontally to {}",
        top_position.x
    );
    assert!(
        (top_position.y - 14.55).abs() < 0.05,
        "top box settled at height {}",
        top_position.y
    );
}

#[test]
fn test_sleep_happens_within_time_to_sleep_budget() {
    // One box on the ground: equilibrium almost immediately, asleep within
    // settle time plus ceil(time_to_sleep / dt) steps.
    let mut world = World::new(WorldConf::default().with_gravity(Vec2::new(0.0, -10.0))).unwrap();
    let ground = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
        .unwrap();
    let ground_shape = world
        .create_shape(Shape::edge(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)))
        .unwrap();
    world.create_fixture(FixtureConf::new(ground, ground_shape)).unwrap();

    let box_shape = world.create_shape(Shape::box_shape(0.5, 0.5)).unwrap();
    let body = world
        .create_body(BodyConf::dynamic_at(Vec2::new(0.0, 0.505)))
        .unwrap();
    world
        .create_fixture(FixtureConf::new(body, box_shape).density(1.0))
        .unwrap();

    let conf = StepConf::default();
    let budget = (conf.time_to_sleep / conf.dt).ceil() as usize;
    let settle = 30;
    let mut asleep_at = None;
    for i in 0..(settle + budget + 5) {
        world.step(&conf).unwrap();
        if !world.body(body).unwrap().is_awake() {
            asleep_at = Some(i);
            break;
        }
    }
    let asleep_at = asleep_at.expect("the box never fell asleep");
    assert!(
        asleep_at <= settle + budget,
        "sleep took {asleep_at} steps, budget was {}",
        settle + budget
    );
}

#[test]
fn test_warm_starting_reduces_late_step_impulse_work() {
    // With warm starting the solver re-applies stored impulses and its
    // incremental corrections shrink toward zero; solving the same stack
    // cold leaves the full weight to be rebuilt every step.
    let (mut warm_world, _, warm_conf) = build_stack(true);
    let (mut cold_world, _, cold_conf) = build_stack(false);

    // Let both settle into steady contact.
    for _ in 0..120 {
        warm_world.step(&warm_conf).unwrap();
        cold_world.step(&cold_conf).unwrap();
    }

    let mut warm_peak: f64 = 0.0;
    let mut cold_peak: f64 = 0.0;
    for _ in 0..30 {
        let warm = warm_world.step(&warm_conf).unwrap();
        let cold = cold_world.step(&cold_conf).unwrap();
        warm_peak = warm_peak.max(warm.reg.max_incremental_impulse);
        cold_peak = cold_peak.max(cold.reg.max_incremental_impulse);
    }
    assert!(
        warm_peak < cold_peak,
        "warm {warm_peak} should need less incremental impulse than cold {cold_peak}"
    );
}

#[test]
fn test_applying_force_wakes_the_stack() {
    let (mut world, boxes, conf) = build_stack(true);
    for _ in 0..600 {
        world.step(&conf).unwrap();
    }
    assert!(!world.body(boxes[0]).unwrap().is_awake());

    world.apply_force(boxes[0], Vec2::new(500.0, 0.0)).unwrap();
    assert!(world.body(boxes[0]).unwrap().is_awake());
    world.step(&conf).unwrap();
    assert!(
        world.body(boxes[0]).unwrap().velocity().linear.x > 0.0,
        "the force moved the woken box"
    );
}
