//! Contact persistence and the sequential-impulse contact solver.
//!
//! A [`Contact`] is the persistent record of one potentially-touching pair
//! of fixture children, created when their broad-phase boxes first overlap
//! and destroyed when they separate. Its manifold survives across steps so
//! that accumulated impulses can warm-start the next solve.
//!
//! The solver half of this crate mirrors each touching contact into a
//! [`ContactVelocityConstraint`] / [`ContactPositionConstraint`] pair over
//! island-local body indices and runs the classic sequential-impulse scheme:
//! warm start, iterate velocity constraints (friction clamped to the
//! friction cone, normal impulses kept non-negative, two-point manifolds
//! solved as a coupled 2x2 block), then iterate a Gauss-Seidel position
//! correction after integration.
//!
//! Determinism note: constraints are solved strictly in the order given;
//! nothing here allocates, times out, or consults global state.

#![doc(html_root_url = "https://docs.rs/planar-contact/0.1.0")]
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

mod contact;
mod solver;

pub use contact::{
    mix_friction, mix_restitution, Contact, ContactKey, ContactUpdateConf, Contactable,
    TouchingChange,
};
pub use solver::{
    build_constraints, ConstraintBodyData, ContactPositionConstraint, ContactSolver,
    ContactVelocityConstraint, PositionSolverConf, VelocityConstraintConf,
    VelocityConstraintPoint, VelocitySolveResult,
};
