//! Joints exercised through the full world pipeline.

use planar_collision::Shape;
use planar_joints::{
    DistanceJoint, GearJoint, Joint, PrismaticJoint, RevoluteJoint, RopeJoint,
};
use planar_types::{StepConf, Vec2, WorldConf};
use planar_world::{BodyConf, FixtureConf, World};

fn zero_g_world() -> World {
    World::new(WorldConf::default().with_gravity(Vec2::new(0.0, 0.0))).unwrap()
}

#[test]
fn test_prismatic_limits_hold_under_dragging() {
    let mut world = zero_g_world();

    let anchor = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
        .unwrap();
    let slider = world
        .create_body(BodyConf::dynamic_at(Vec2::new(0.0, 0.0)))
        .unwrap();
    let shape = world.create_shape(Shape::box_shape(0.3, 0.3)).unwrap();
    world
        .create_fixture(FixtureConf::new(slider, shape).density(1.0))
        .unwrap();

    let joint = world
        .create_joint(Joint::Prismatic(
            PrismaticJoint::new(
                anchor,
                slider,
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
            )
            .with_limit(-1.0, 1.0),
        ))
        .unwrap();

    let conf = StepConf::default();
    for step in 0..360 {
        // Drag back and forth, hard.
        let direction = if (step / 90) % 2 == 0 { 1.0 } else { -1.0 };
        world.apply_force(slider, Vec2::new(direction * 200.0, 0.0)).unwrap();
        world.step(&conf).unwrap();

        let translation = world.joint_translation(joint).unwrap();
        assert!(
            (-1.0 - conf.linear_slop..=1.0 + conf.linear_slop).contains(&translation),
            "translation {translation} escaped the limits at step {step}"
        );
    }
}

#[test]
fn test_revolute_pendulum_conserves_anchor() {
    let mut world = World::new(WorldConf::default().with_gravity(Vec2::new(0.0, -10.0))).unwrap();

    let pivot = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 5.0)))
        .unwrap();
    let bob = world
        .create_body(BodyConf::dynamic_at(Vec2::new(2.0, 5.0)))
        .unwrap();
    let shape = world.create_shape(Shape::circle(0.2)).unwrap();
    world
        .create_fixture(FixtureConf::new(bob, shape).density(5.0))
        .unwrap();

    world
        .create_joint(Joint::Revolute(RevoluteJoint::new(
            pivot,
            bob,
            Vec2::new(0.0, 0.0),
            Vec2::new(-2.0, 0.0),
        )))
        .unwrap();

    let conf = StepConf::default();
    for _ in 0..600 {
        world.step(&conf).unwrap();
        let p = world.body(bob).unwrap().position();
        let q = planar_types::Rot::new(world.body(bob).unwrap().angle());
        let anchor = p + q.rotate(Vec2::new(-2.0, 0.0));
        let drift = (anchor - Vec2::new(0.0, 5.0)).norm();
        assert!(drift < 0.05, "pendulum anchor drifted by {drift}");
    }
}

#[test]
fn test_distance_spring_settles_at_rest_length() {
    let mut world = zero_g_world();
    let anchor = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
        .unwrap();
    let bob = world
        .create_body(BodyConf::dynamic_at(Vec2::new(4.0, 0.0)))
        .unwrap();
    let shape = world.create_shape(Shape::circle(0.2)).unwrap();
    world
        .create_fixture(FixtureConf::new(bob, shape).density(1.0))
        .unwrap();

    world
        .create_joint(Joint::Distance(
            DistanceJoint::new(
                anchor,
                bob,
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
                2.0,
            )
            .with_spring(1.5, 0.8),
        ))
        .unwrap();

    let conf = StepConf::default();
    for _ in 0..900 {
        world.step(&conf).unwrap();
    }
    let distance = world.body(bob).unwrap().position().norm();
    assert!(
        (distance - 2.0).abs() < 0.05,
        "spring settled at distance {distance}"
    );
}

#[test]
fn test_rope_caps_fall_distance() {
    let mut world = World::new(WorldConf::default().with_gravity(Vec2::new(0.0, -10.0))).unwrap();
    let anchor = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 10.0)))
        .unwrap();
    let weight = world
        .create_body(BodyConf::dynamic_at(Vec2::new(0.0, 9.0)))
        .unwrap();
    let shape = world.create_shape(Shape::circle(0.2)).unwrap();
    world
        .create_fixture(FixtureConf::new(weight, shape).density(1.0))
        .unwrap();

    world
        .create_joint(Joint::Rope(RopeJoint::new(
            anchor,
            weight,
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0),
            3.0,
        )))
        .unwrap();

    let conf = StepConf::default();
    for _ in 0..300 {
        world.step(&conf).unwrap();
        let distance = (world.body(weight).unwrap().position() - Vec2::new(0.0, 10.0)).norm();
        assert!(
            distance <= 3.0 + 10.0 * conf.linear_slop,
            "rope stretched to {distance}"
        );
    }
}

#[test]
fn test_gear_couples_wheel_velocities_through_world() {
    let mut world = zero_g_world();
    let ground = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
        .unwrap();

    let shape = world.create_shape(Shape::circle(0.5)).unwrap();
    let wheel_a = world
        .create_body(BodyConf::dynamic_at(Vec2::new(-1.0, 0.0)))
        .unwrap();
    world
        .create_fixture(FixtureConf::new(wheel_a, shape).density(1.0))
        .unwrap();
    let wheel_b = world
        .create_body(BodyConf::dynamic_at(Vec2::new(1.0, 0.0)))
        .unwrap();
    world
        .create_fixture(FixtureConf::new(wheel_b, shape).density(1.0))
        .unwrap();

    let rev_a = Joint::Revolute(RevoluteJoint::new(
        ground,
        wheel_a,
        Vec2::new(-1.0, 0.0),
        Vec2::new(0.0, 0.0),
    ));
    let rev_b = Joint::Revolute(RevoluteJoint::new(
        ground,
        wheel_b,
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 0.0),
    ));
    let gear = GearJoint::new(&rev_a, &rev_b, 2.0).unwrap();
    world.create_joint(rev_a).unwrap();
    world.create_joint(rev_b).unwrap();
    world.create_joint(Joint::Gear(gear)).unwrap();

    world.apply_torque(wheel_a, 10.0).unwrap();
    let conf = StepConf::default();
    for _ in 0..60 {
        world.step(&conf).unwrap();
        let w_a = world.body(wheel_a).unwrap().velocity().angular;
        let w_b = world.body(wheel_b).unwrap().velocity().angular;
        assert!(
            (w_a + 2.0 * w_b).abs() < 1e-6,
            "gear constraint violated: {w_a} + 2 * {w_b}"
        );
    }
}

#[test]
fn test_destroying_joint_wakes_bodies() {
    let mut world = World::new(WorldConf::default().with_gravity(Vec2::new(0.0, -10.0))).unwrap();
    let ground = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
        .unwrap();
    let ground_shape = world
        .create_shape(Shape::edge(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)))
        .unwrap();
    world.create_fixture(FixtureConf::new(ground, ground_shape)).unwrap();

    // A box welded in the air by a distance joint falls once it is cut.
    let anchor = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 5.0)))
        .unwrap();
    let weight = world
        .create_body(BodyConf::dynamic_at(Vec2::new(0.0, 3.0)))
        .unwrap();
    let shape = world.create_shape(Shape::box_shape(0.3, 0.3)).unwrap();
    world
        .create_fixture(FixtureConf::new(weight, shape).density(1.0))
        .unwrap();
    let joint = world
        .create_joint(Joint::Distance(DistanceJoint::new(
            anchor,
            weight,
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0),
            2.0,
        )))
        .unwrap();

    let conf = StepConf::default();
    for _ in 0..240 {
        world.step(&conf).unwrap();
    }
    assert!(
        !world.body(weight).unwrap().is_awake(),
        "the hanging weight went to sleep"
    );

    world.destroy_joint(joint).unwrap();
    assert!(world.body(weight).unwrap().is_awake());
    for _ in 0..120 {
        world.step(&conf).unwrap();
    }
    assert!(
        world.body(weight).unwrap().position().y < 1.0,
        "the weight fell after the joint was destroyed"
    );
}
