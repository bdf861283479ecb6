//! Core types for the planar 2-D rigid-body physics engine.
//!
//! This crate provides the foundational types shared by every layer of the
//! engine:
//!
//! - [`BodyId`], [`FixtureId`], [`ShapeId`], [`JointId`], [`ContactId`] -
//!   stable dense handles into world-owned pools
//! - [`Rot`], [`Pose2`], [`Position`], [`Velocity`], [`Sweep`] - planar
//!   kinematic state
//! - [`Filter`] - collision filtering bits
//! - [`StepConf`], [`WorldConf`] - simulation configuration
//! - [`StepStats`] - per-step diagnostics
//! - [`PhysicsError`] - the error taxonomy of the public API
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They carry no physics, no integration, and
//! no references back into the world. They are the common language between:
//!
//! - The collision layer (shapes, broad phase, manifolds)
//! - The constraint layer (contacts, joints)
//! - The world facade (stepping, queries, events)
//! - Host applications (games, robotics prototypes, educational demos)
//!
//! # Coordinate System
//!
//! Right-handed planar coordinates: X right, Y up, angles counter-clockwise
//! in radians. All scalar math is `f64`.
//!
//! # Example
//!
//! ```
//! use planar_types::{Pose2, Vec2};
//!
//! let pose = Pose2::new(Vec2::new(1.0, 2.0), std::f64::consts::FRAC_PI_2);
//! let world = pose.transform_point(Vec2::new(1.0, 0.0));
//! assert!((world.x - 1.0).abs() < 1e-12);
//! assert!((world.y - 3.0).abs() < 1e-12);
//! ```

#![doc(html_root_url = "https://docs.rs/planar-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,   // usize to f64 is fine for counts
    clippy::missing_errors_doc,    // Error docs added where non-obvious
)]

mod config;
mod error;
mod filter;
mod id;
mod math;
mod stats;

pub use config::{StepConf, WorldConf, DEFAULT_ANGULAR_SLOP, DEFAULT_LINEAR_SLOP};
pub use error::{EntityKind, PhysicsError};
pub use filter::Filter;
pub use id::{BodyId, ContactId, FixtureId, JointId, ShapeId};
pub use math::{
    cross, cross_sv, cross_vs, inverse22, normalize_angle, perp, solve22, solve33, solve33_22,
    sym_inverse33, Mat22, Mat33, Pose2, Position, Rot, Sweep, Vec2, Vec3, Velocity,
};
pub use stats::{IslandStats, PreStepStats, RegStepStats, StepStats, ToiStepStats};

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
