//! The world facade of the planar 2-D physics engine.
//!
//! A [`World`] owns every simulation entity - bodies, shapes, fixtures,
//! joints, contacts - in free-list pools referenced by small dense handles,
//! plus the broad-phase tree and the listener slots. Advancing time happens
//! through exactly one entry point, [`World::step`], which runs the ordered
//! pipeline:
//!
//! 1. consume queued broad-phase proxy moves
//! 2. discover new contacts from tree overlaps (de-duplicated by pair key)
//! 3. destroy contacts whose boxes separated or whose filters changed
//! 4. update contact manifolds, buffering begin/end events
//! 5. regular solve: islands, velocity iterations, integration, position
//!    iterations, sleep management
//! 6. continuous (TOI) solve for bullets and fast pairs
//! 7. flush listener events
//! 8. record the inverse step time for next step's warm-start ratio
//!
//! While a step is in flight the world is *locked*: every mutating API call
//! fails with [`PhysicsError::WrongState`](planar_types::PhysicsError)
//! instead of corrupting the solve. The lock is held by a scope guard, so it
//! clears on every exit path.
//!
//! # Example
//!
//! ```
//! use planar_types::{StepConf, Vec2, WorldConf};
//! use planar_world::{BodyConf, FixtureConf, World};
//! use planar_collision::Shape;
//!
//! let mut world = World::new(WorldConf::default()).unwrap();
//!
//! let ground = world.create_body(BodyConf::static_at(Vec2::new(0.0, 0.0))).unwrap();
//! let ground_shape = world.create_shape(Shape::edge(
//!     Vec2::new(-40.0, 0.0),
//!     Vec2::new(40.0, 0.0),
//! )).unwrap();
//! world.create_fixture(FixtureConf::new(ground, ground_shape)).unwrap();
//!
//! let ball_body = world.create_body(BodyConf::dynamic_at(Vec2::new(0.0, 4.0))).unwrap();
//! let ball = world.create_shape(Shape::circle(0.5)).unwrap();
//! world.create_fixture(FixtureConf::new(ball_body, ball).density(1.0)).unwrap();
//!
//! let conf = StepConf::default();
//! for _ in 0..120 {
//!     world.step(&conf).unwrap();
//! }
//! // The ball has landed on the ground.
//! assert!(world.body(ball_body).unwrap().position().y < 1.0);
//! ```

#![doc(html_root_url = "https://docs.rs/planar-world/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::similar_names,
    clippy::many_single_char_names,
)]

mod body;
mod events;
mod fixture;
mod island;
mod pool;
mod step;
mod world;

pub use body::{Body, BodyConf, BodyType};
pub use events::{
    ContactFilter, ContactImpulses, ContactListener, FixtureListener, JointListener,
    PostSolveListener, PreSolveListener, ShapeListener,
};
pub use fixture::{Fixture, FixtureConf};
pub use world::World;

/// Largest number of bodies a world will hold.
pub const MAX_BODIES: u32 = 1 << 20;
/// Largest number of shapes a world will hold.
pub const MAX_SHAPES: u32 = 1 << 20;
/// Largest number of fixtures a world will hold.
pub const MAX_FIXTURES: u32 = 1 << 20;
/// Largest number of joints a world will hold.
pub const MAX_JOINTS: u32 = 1 << 20;
/// Largest number of contacts a world will hold.
pub const MAX_CONTACTS: u32 = 1 << 22;
