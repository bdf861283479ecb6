//! Joint constraints for the planar 2-D physics engine.
//!
//! A joint is a bilateral kinematic constraint between two bodies, solved
//! with the same sequential-impulse scheme as contacts: effective masses are
//! prepared once per island solve, accumulated impulses warm-start the
//! velocity iterations, and a pseudo-impulse pass corrects positional drift
//! after integration.
//!
//! The engine supports a closed set of kinds dispatched by pattern match on
//! the [`Joint`] sum type:
//!
//! | Kind | Constraint |
//! |---|---|
//! | [`RevoluteJoint`] | Shared point; optional angle limit and motor |
//! | [`PrismaticJoint`] | Shared axis; optional translation limit and motor |
//! | [`DistanceJoint`] | Fixed (optionally spring-damped) anchor distance |
//! | [`WeldJoint`] | Shared point and angle, optionally spring-damped |
//! | [`RopeJoint`] | Anchor distance capped from above |
//! | [`PulleyJoint`] | `lengthA + ratio * lengthB` held constant |
//! | [`GearJoint`] | Couples two revolute/prismatic joints by a ratio |
//! | [`WheelJoint`] | Axis constraint with spring and optional motor |
//! | [`MotorJoint`] | Drives a relative pose under force/torque caps |
//! | [`FrictionJoint`] | Top-down friction via force/torque caps |
//! | [`MouseJoint`] | Soft spring toward a world target point |
//!
//! Joints never own their bodies; they hold [`BodyId`] handles and resolve
//! island-local indices through the [`BodyMetaMap`] the world hands to
//! [`Joint::init_velocity_constraints`] each solve.

#![doc(html_root_url = "https://docs.rs/planar-joints/0.1.0")]
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

use planar_types::{BodyId, Position, Vec2, Velocity};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod distance;
mod friction;
mod gear;
mod motor;
mod mouse;
mod prismatic;
mod pulley;
mod revolute;
mod rope;
mod weld;
mod wheel;

pub use distance::DistanceJoint;
pub use friction::FrictionJoint;
pub use gear::{GearHalf, GearHalfKind, GearJoint};
pub use motor::MotorJoint;
pub use mouse::MouseJoint;
pub use prismatic::PrismaticJoint;
pub use pulley::PulleyJoint;
pub use revolute::RevoluteJoint;
pub use rope::RopeJoint;
pub use weld::WeldJoint;
pub use wheel::WheelJoint;

/// Island-local body data a joint resolves its handles against.
#[derive(Debug, Clone, Copy)]
pub struct JointBodyMeta {
    /// Island-local index into the position/velocity arrays.
    pub index: usize,
    /// Center of mass in body-local coordinates.
    pub local_center: Vec2,
    /// Inverse mass.
    pub inv_mass: f64,
    /// Inverse rotational inertia about the center of mass.
    pub inv_inertia: f64,
}

/// Map from body handle to island-local meta, built per island by the world.
pub type BodyMetaMap = hashbrown::HashMap<BodyId, JointBodyMeta>;

/// Step data the joint solvers need.
#[derive(Debug, Clone, Copy)]
pub struct JointStepConf {
    /// Integration period.
    pub dt: f64,
    /// Inverse integration period (zero when `dt` is zero).
    pub inv_dt: f64,
    /// Ratio of this step's `dt` to the previous step's.
    pub dt_ratio: f64,
    /// Whether accumulated impulses seed the velocity solve.
    pub warm_starting: bool,
    /// Allowed linear error.
    pub linear_slop: f64,
    /// Allowed angular error.
    pub angular_slop: f64,
    /// Per-iteration clamp on linear position corrections.
    pub max_linear_correction: f64,
    /// Per-iteration clamp on angular position corrections.
    pub max_angular_correction: f64,
}

impl Default for JointStepConf {
    fn default() -> Self {
        let step = planar_types::StepConf::default();
        Self {
            dt: step.dt,
            inv_dt: step.inv_dt(),
            dt_ratio: 1.0,
            warm_starting: step.warm_starting,
            linear_slop: step.linear_slop,
            angular_slop: step.angular_slop,
            max_linear_correction: step.max_linear_correction,
            max_angular_correction: step.max_angular_correction,
        }
    }
}

/// The state of a joint limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LimitState {
    /// The joint coordinate is strictly between the limits.
    #[default]
    Inactive,
    /// The joint coordinate is at or below the lower limit.
    AtLower,
    /// The joint coordinate is at or above the upper limit.
    AtUpper,
    /// The limits coincide; the coordinate is pinned.
    Equal,
}

/// The closed sum type of joint kinds.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Joint {
    /// Shared-point joint with optional angle limit and motor.
    Revolute(RevoluteJoint),
    /// Shared-axis joint with optional translation limit and motor.
    Prismatic(PrismaticJoint),
    /// Fixed-distance joint, optionally spring-damped.
    Distance(DistanceJoint),
    /// Rigid (or spring-damped) pose lock.
    Weld(WeldJoint),
    /// Maximum-distance rope.
    Rope(RopeJoint),
    /// Two-sided pulley.
    Pulley(PulleyJoint),
    /// Ratio coupling of two other joints.
    Gear(GearJoint),
    /// Suspension-style axis + spring + motor.
    Wheel(WheelJoint),
    /// Relative-pose driver.
    Motor(MotorJoint),
    /// Top-down friction.
    Friction(FrictionJoint),
    /// Soft target-point spring.
    Mouse(MouseJoint),
}

macro_rules! dispatch {
    ($self:expr, $j:ident => $body:expr) => {
        match $self {
            Joint::Revolute($j) => $body,
            Joint::Prismatic($j) => $body,
            Joint::Distance($j) => $body,
            Joint::Weld($j) => $body,
            Joint::Rope($j) => $body,
            Joint::Pulley($j) => $body,
            Joint::Gear($j) => $body,
            Joint::Wheel($j) => $body,
            Joint::Motor($j) => $body,
            Joint::Friction($j) => $body,
            Joint::Mouse($j) => $body,
        }
    };
}

impl Joint {
    /// The first constrained body.
    #[must_use]
    pub fn body_a(&self) -> BodyId {
        dispatch!(self, j => j.body_a)
    }

    /// The second constrained body.
    #[must_use]
    pub fn body_b(&self) -> BodyId {
        dispatch!(self, j => j.body_b)
    }

    /// Whether fixtures on the two connected bodies may still collide with
    /// each other.
    #[must_use]
    pub fn collide_connected(&self) -> bool {
        dispatch!(self, j => j.collide_connected)
    }

    /// Prepare effective masses and warm-start impulses for the island's
    /// velocity solve.
    pub fn init_velocity_constraints(
        &mut self,
        metas: &BodyMetaMap,
        positions: &mut [Position],
        velocities: &mut [Velocity],
        conf: &JointStepConf,
    ) {
        dispatch!(self, j => j.init_velocity_constraints(metas, positions, velocities, conf));
    }

    /// Apply one velocity iteration.
    pub fn solve_velocity_constraints(
        &mut self,
        velocities: &mut [Velocity],
        conf: &JointStepConf,
    ) {
        dispatch!(self, j => j.solve_velocity_constraints(velocities, conf));
    }

    /// Apply one position iteration; returns true when the joint's position
    /// error is within tolerance.
    pub fn solve_position_constraints(
        &mut self,
        positions: &mut [Position],
        conf: &JointStepConf,
    ) -> bool {
        dispatch!(self, j => j.solve_position_constraints(positions, conf))
    }
}

/// Resolve both endpoints of a joint in the island's meta map.
pub(crate) fn lookup2(
    metas: &BodyMetaMap,
    a: BodyId,
    b: BodyId,
) -> Option<(JointBodyMeta, JointBodyMeta)> {
    Some((*metas.get(&a)?, *metas.get(&b)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
pub(crate) mod test_support {
    use super::*;

    /// A two-body rig: body 0 static at the origin, body 1 dynamic with
    /// unit mass and inertia, at the given position.
    pub fn rig(at: Vec2) -> (BodyMetaMap, Vec<Position>, Vec<Velocity>) {
        let mut metas = BodyMetaMap::default();
        metas.insert(
            BodyId::new(0),
            JointBodyMeta {
                index: 0,
                local_center: Vec2::new(0.0, 0.0),
                inv_mass: 0.0,
                inv_inertia: 0.0,
            },
        );
        metas.insert(
            BodyId::new(1),
            JointBodyMeta {
                index: 1,
                local_center: Vec2::new(0.0, 0.0),
                inv_mass: 1.0,
                inv_inertia: 1.0,
            },
        );
        let positions = vec![
            Position::new(Vec2::new(0.0, 0.0), 0.0),
            Position::new(at, 0.0),
        ];
        let velocities = vec![Velocity::zero(), Velocity::zero()];
        (metas, positions, velocities)
    }

    /// Run full solve cycles of a joint over the rig.
    pub fn run_joint(
        joint: &mut Joint,
        metas: &BodyMetaMap,
        positions: &mut [Position],
        velocities: &mut [Velocity],
        steps: usize,
    ) {
        let conf = JointStepConf::default();
        for _ in 0..steps {
            joint.init_velocity_constraints(metas, positions, velocities, &conf);
            for _ in 0..8 {
                joint.solve_velocity_constraints(velocities, &conf);
            }
            for i in 0..positions.len() {
                positions[i].linear += velocities[i].linear * conf.dt;
                positions[i].angular += velocities[i].angular * conf.dt;
            }
            for _ in 0..3 {
                if joint.solve_position_constraints(positions, &conf) {
                    break;
                }
            }
        }
    }
}
