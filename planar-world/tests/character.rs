//! Character traversal over chains: ghost vertices keep the internal seams
//! silent so a sliding disk never snags.

use planar_collision::{ChainShape, Shape};
use planar_types::{StepConf, Vec2, Velocity, WorldConf};
use planar_world::{BodyConf, FixtureConf, World};

fn chain_world(vertices: &[Vec2]) -> (World, planar_types::BodyId) {
    let mut world = World::new(WorldConf::default().with_gravity(Vec2::new(0.0, -10.0))).unwrap();

    let ground = world
        .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
        .unwrap();
    let chain = world
        .create_shape(Shape::Chain(ChainShape::new(vertices).unwrap()))
        .unwrap();
    world
        .create_fixture(FixtureConf::new(ground, chain).friction(0.0))
        .unwrap();

    let character = world
        .create_body(
            BodyConf::dynamic_at(Vec2::new(5.0, 0.26)).fixed_rotation(true),
        )
        .unwrap();
    let disk = world.create_shape(Shape::circle(0.25)).unwrap();
    world
        .create_fixture(FixtureConf::new(character, disk).density(20.0).friction(0.0))
        .unwrap();

    (world, character)
}

#[test]
fn test_character_crosses_collinear_chain_seams_smoothly() {
    // Three collinear edges with internal vertices at x = -2 and x = 2.
    let (mut world, character) = chain_world(&[
        Vec2::new(-6.0, 0.0),
        Vec2::new(-2.0, 0.0),
        Vec2::new(2.0, 0.0),
        Vec2::new(6.0, 0.0),
    ]);

    let conf = StepConf::default();

    // Let the character land first.
    for _ in 0..30 {
        world.step(&conf).unwrap();
    }

    let mut slow_streak = 0;
    for _ in 0..120 {
        // Drive leftward at 5 m/s, preserving the vertical component.
        let vy = world.body(character).unwrap().velocity().linear.y;
        world
            .set_velocity(character, Velocity::new(Vec2::new(-5.0, vy), 0.0))
            .unwrap();
        world.step(&conf).unwrap();

        let touching = world
            .body(character)
            .unwrap()
            .contacts()
            .iter()
            .any(|&(_, id)| world.contact(id).unwrap().is_touching());
        let vx = world.body(character).unwrap().velocity().linear.x;
        if touching && vx > -4.0 {
            slow_streak += 1;
            assert!(
                slow_streak < 2,
                "character snagged at x = {} (vx = {vx})",
                world.body(character).unwrap().position().x
            );
        } else {
            slow_streak = 0;
        }
    }

    // It actually crossed both seams.
    assert!(world.body(character).unwrap().position().x < -3.0);
}

#[test]
fn test_square_slides_across_chain_seam() {
    let (mut world, _) = chain_world(&[
        Vec2::new(-6.0, 0.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(6.0, 0.0),
    ]);

    let square = world
        .create_body(
            BodyConf::dynamic_at(Vec2::new(3.0, 0.52))
                .linear_velocity(Vec2::new(-4.0, 0.0)),
        )
        .unwrap();
    let box_shape = world.create_shape(Shape::box_shape(0.5, 0.5)).unwrap();
    world
        .create_fixture(FixtureConf::new(square, box_shape).density(1.0).friction(0.0))
        .unwrap();

    let conf = StepConf::default();
    for _ in 0..90 {
        world.step(&conf).unwrap();
        let body = world.body(square).unwrap();
        assert!(
            body.position().y > 0.4,
            "box dipped into the seam at x = {}",
            body.position().x
        );
        assert!(
            body.angle().abs() < 0.05,
            "box tipped at the seam: angle {}",
            body.angle()
        );
    }
    assert!(world.body(square).unwrap().position().x < -1.0);
}

#[test]
fn test_chain_loop_contains_a_ball() {
    // A diamond-shaped loop; a ball dropped inside must stay inside.
    let (mut world, _) = {
        let mut world =
            World::new(WorldConf::default().with_gravity(Vec2::new(0.0, -10.0))).unwrap();
        let ground = world
            .create_body(BodyConf::static_at(Vec2::new(0.0, 0.0)))
            .unwrap();
        let loop_shape = world
            .create_shape(Shape::Chain(
                ChainShape::new_loop(&[
                    Vec2::new(0.0, -3.0),
                    Vec2::new(3.0, 0.0),
                    Vec2::new(0.0, 3.0),
                    Vec2::new(-3.0, 0.0),
                ])
                .unwrap(),
            ))
            .unwrap();
        world.create_fixture(FixtureConf::new(ground, loop_shape)).unwrap();
        (world, ground)
    };

    let ball = world
        .create_body(BodyConf::dynamic_at(Vec2::new(0.3, 1.0)))
        .unwrap();
    let disk = world.create_shape(Shape::circle(0.25)).unwrap();
    world
        .create_fixture(FixtureConf::new(ball, disk).density(1.0).restitution(0.4))
        .unwrap();

    let conf = StepConf::default();
    for _ in 0..600 {
        world.step(&conf).unwrap();
        let p = world.body(ball).unwrap().position();
        assert!(
            p.x.abs() + p.y.abs() < 3.5,
            "ball escaped the loop at {p:?}"
        );
    }
}
