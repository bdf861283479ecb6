//! Gear joint: couples the coordinates of two revolute or prismatic joints
//! so that `coordinateA + ratio * coordinateB` stays constant.
//!
//! The gear does not reference the two joints while solving; it captures
//! their anchors, axes, and reference angles at creation and constrains the
//! four involved bodies directly.

use planar_types::{cross, BodyId, PhysicsError, Pose2, Position, Result, Rot, Vec2, Velocity};

use crate::{BodyMetaMap, Joint, JointStepConf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The kind of joint a gear half was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GearHalfKind {
    /// An angular coordinate from a revolute joint.
    Revolute,
    /// A translation coordinate from a prismatic joint.
    Prismatic,
}

/// One side of a gear: the captured geometry of a revolute or prismatic
/// joint between a reference body and an output body.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GearHalf {
    /// Coordinate kind.
    pub kind: GearHalfKind,
    /// The joint's first body (commonly static ground).
    pub body_ref: BodyId,
    /// The joint's second body, which the gear drives.
    pub body_out: BodyId,
    /// Anchor on the reference body, local frame.
    pub local_anchor_ref: Vec2,
    /// Anchor on the output body, local frame.
    pub local_anchor_out: Vec2,
    /// The captured reference angle.
    pub reference_angle: f64,
    /// The captured slide axis (prismatic only), reference-body frame.
    pub local_axis: Vec2,
}

impl GearHalf {
    /// Capture a gear half from a revolute or prismatic joint.
    pub fn from_joint(joint: &Joint) -> Result<Self> {
        match joint {
            Joint::Revolute(j) => Ok(Self {
                kind: GearHalfKind::Revolute,
                body_ref: j.body_a,
                body_out: j.body_b,
                local_anchor_ref: j.local_anchor_a,
                local_anchor_out: j.local_anchor_b,
                reference_angle: j.reference_angle,
                local_axis: Vec2::new(0.0, 0.0),
            }),
            Joint::Prismatic(j) => Ok(Self {
                kind: GearHalfKind::Prismatic,
                body_ref: j.body_a,
                body_out: j.body_b,
                local_anchor_ref: j.local_anchor_a,
                local_anchor_out: j.local_anchor_b,
                reference_angle: j.reference_angle,
                local_axis: j.local_axis_a,
            }),
            _ => Err(PhysicsError::invalid_argument(
                "gear joints require revolute or prismatic halves",
            )),
        }
    }

    /// The half's coordinate under the given poses and raw angles.
    #[must_use]
    pub fn coordinate(&self, xf_ref: &Pose2, xf_out: &Pose2, a_ref: f64, a_out: f64) -> f64 {
        match self.kind {
            GearHalfKind::Revolute => a_out - a_ref - self.reference_angle,
            GearHalfKind::Prismatic => {
                let p_ref = self.local_anchor_ref;
                let p_out = xf_ref
                    .inverse_transform_point(xf_out.transform_point(self.local_anchor_out));
                (p_out - p_ref).dot(&self.local_axis)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct HalfState {
    index_ref: usize,
    index_out: usize,
    inv_mass_ref: f64,
    inv_mass_out: f64,
    inv_i_ref: f64,
    inv_i_out: f64,
    local_center_ref: Vec2,
    local_center_out: Vec2,
    jv: Vec2,
    jw_ref: f64,
    jw_out: f64,
}

impl HalfState {
    /// The half's coordinate from island positions, anchored at the bodies'
    /// centers of mass.
    fn coordinate(&self, half: &GearHalf, positions: &[Position]) -> f64 {
        let pos_ref = positions[self.index_ref];
        let pos_out = positions[self.index_out];
        match half.kind {
            GearHalfKind::Revolute => pos_out.angular - pos_ref.angular - half.reference_angle,
            GearHalfKind::Prismatic => {
                let q_ref = Rot::new(pos_ref.angular);
                let q_out = Rot::new(pos_out.angular);
                let r_out = q_out.rotate(half.local_anchor_out - self.local_center_out);
                let p_ref = half.local_anchor_ref - self.local_center_ref;
                let p_out =
                    q_ref.inv_rotate(r_out + (pos_out.linear - pos_ref.linear));
                (p_out - p_ref).dot(&half.local_axis)
            }
        }
    }
}

/// A gear joint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GearJoint {
    /// Output body of the first captured joint.
    pub body_a: BodyId,
    /// Output body of the second captured joint.
    pub body_b: BodyId,
    /// Whether the connected bodies may still collide.
    pub collide_connected: bool,

    /// First captured half.
    pub half_a: GearHalf,
    /// Second captured half.
    pub half_b: GearHalf,
    /// Gear ratio applied to the second coordinate.
    pub ratio: f64,
    /// The conserved value `coordinateA + ratio * coordinateB`, captured at
    /// creation via [`GearJoint::calibrate`].
    pub constant: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    state_a: HalfState,
    #[cfg_attr(feature = "serde", serde(skip))]
    state_b: HalfState,
    #[cfg_attr(feature = "serde", serde(skip))]
    mass: f64,
}

impl GearJoint {
    /// Create a gear joint coupling two existing revolute/prismatic joints.
    ///
    /// The caller must [`calibrate`](Self::calibrate) the joint against the
    /// current body poses before the first step.
    pub fn new(joint1: &Joint, joint2: &Joint, ratio: f64) -> Result<Self> {
        if !ratio.is_finite() || ratio == 0.0 {
            return Err(PhysicsError::invalid_argument(
                "gear ratio must be finite and non-zero",
            ));
        }
        let half_a = GearHalf::from_joint(joint1)?;
        let half_b = GearHalf::from_joint(joint2)?;
        Ok(Self {
            body_a: half_a.body_out,
            body_b: half_b.body_out,
            collide_connected: false,
            half_a,
            half_b,
            ratio,
            constant: 0.0,
            impulse: 0.0,
            state_a: HalfState::default(),
            state_b: HalfState::default(),
            mass: 0.0,
        })
    }

    /// Capture the conserved coordinate sum from the current body poses.
    #[allow(clippy::too_many_arguments)]
    pub fn calibrate(
        &mut self,
        xf_ref_a: &Pose2,
        xf_out_a: &Pose2,
        a_ref_a: f64,
        a_out_a: f64,
        xf_ref_b: &Pose2,
        xf_out_b: &Pose2,
        a_ref_b: f64,
        a_out_b: f64,
    ) {
        let coordinate_a = self.half_a.coordinate(xf_ref_a, xf_out_a, a_ref_a, a_out_a);
        let coordinate_b = self.half_b.coordinate(xf_ref_b, xf_out_b, a_ref_b, a_out_b);
        self.constant = coordinate_a + self.ratio * coordinate_b;
    }

    /// All four involved bodies: (outA, outB, refA, refB).
    #[must_use]
    pub fn bodies(&self) -> [BodyId; 4] {
        [
            self.body_a,
            self.body_b,
            self.half_a.body_ref,
            self.half_b.body_ref,
        ]
    }

    fn init_half(
        half: &GearHalf,
        scale: f64,
        metas: &BodyMetaMap,
        positions: &[Position],
    ) -> Option<(HalfState, f64)> {
        let meta_ref = metas.get(&half.body_ref)?;
        let meta_out = metas.get(&half.body_out)?;

        let mut state = HalfState {
            index_ref: meta_ref.index,
            index_out: meta_out.index,
            inv_mass_ref: meta_ref.inv_mass,
            inv_mass_out: meta_out.inv_mass,
            inv_i_ref: meta_ref.inv_inertia,
            inv_i_out: meta_out.inv_inertia,
            local_center_ref: meta_ref.local_center,
            local_center_out: meta_out.local_center,
            ..HalfState::default()
        };

        let mass_term = match half.kind {
            GearHalfKind::Revolute => {
                state.jv = Vec2::new(0.0, 0.0);
                state.jw_ref = scale;
                state.jw_out = scale;
                scale * scale * (state.inv_i_ref + state.inv_i_out)
            }
            GearHalfKind::Prismatic => {
                let pos_ref = positions[state.index_ref];
                let pos_out = positions[state.index_out];
                let q_ref = Rot::new(pos_ref.angular);
                let q_out = Rot::new(pos_out.angular);

                let u = q_ref.rotate(half.local_axis);
                let r_ref = q_ref.rotate(half.local_anchor_ref - meta_ref.local_center);
                let r_out = q_out.rotate(half.local_anchor_out - meta_out.local_center);

                state.jv = u * scale;
                state.jw_ref = scale * cross(r_ref, u);
                state.jw_out = scale * cross(r_out, u);
                scale * scale * (state.inv_mass_ref + state.inv_mass_out)
                    + state.inv_i_ref * state.jw_ref * state.jw_ref
                    + state.inv_i_out * state.jw_out * state.jw_out
            }
        };
        Some((state, mass_term))
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        metas: &BodyMetaMap,
        positions: &mut [Position],
        velocities: &mut [Velocity],
        conf: &JointStepConf,
    ) {
        let Some((state_a, mass_a)) = Self::init_half(&self.half_a, 1.0, metas, positions) else {
            self.mass = 0.0;
            return;
        };
        let Some((state_b, mass_b)) =
            Self::init_half(&self.half_b, self.ratio, metas, positions)
        else {
            self.mass = 0.0;
            return;
        };
        self.state_a = state_a;
        self.state_b = state_b;

        let mass = mass_a + mass_b;
        self.mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };

        if conf.warm_starting {
            self.impulse *= conf.dt_ratio;
            self.apply_impulse(velocities, self.impulse);
        } else {
            self.impulse = 0.0;
        }
    }

    fn apply_impulse(&self, velocities: &mut [Velocity], impulse: f64) {
        for state in [&self.state_a, &self.state_b] {
            let mut v_out = velocities[state.index_out];
            v_out.linear += state.jv * (impulse * state.inv_mass_out);
            v_out.angular += state.inv_i_out * impulse * state.jw_out;
            velocities[state.index_out] = v_out;

            let mut v_ref = velocities[state.index_ref];
            v_ref.linear -= state.jv * (impulse * state.inv_mass_ref);
            v_ref.angular -= state.inv_i_ref * impulse * state.jw_ref;
            velocities[state.index_ref] = v_ref;
        }
    }

    pub(crate) fn solve_velocity_constraints(
        &mut self,
        velocities: &mut [Velocity],
        _conf: &JointStepConf,
    ) {
        if self.mass == 0.0 {
            return;
        }
        let mut cdot = 0.0;
        for state in [&self.state_a, &self.state_b] {
            let v_out = velocities[state.index_out];
            let v_ref = velocities[state.index_ref];
            cdot += state.jv.dot(&(v_out.linear - v_ref.linear));
            cdot += state.jw_out * v_out.angular - state.jw_ref * v_ref.angular;
        }

        let impulse = -self.mass * cdot;
        self.impulse += impulse;
        self.apply_impulse(velocities, impulse);
    }

    pub(crate) fn solve_position_constraints(
        &mut self,
        positions: &mut [Position],
        conf: &JointStepConf,
    ) -> bool {
        if self.mass == 0.0 {
            return true;
        }

        let coordinate_a = self.state_a.coordinate(&self.half_a, positions);
        let coordinate_b = self.state_b.coordinate(&self.half_b, positions);
        let c = (coordinate_a + self.ratio * coordinate_b) - self.constant;

        let impulse = -self.mass * c;
        for state in [&self.state_a, &self.state_b] {
            let mut pos_out = positions[state.index_out];
            pos_out.linear += state.jv * (impulse * state.inv_mass_out);
            pos_out.angular += state.inv_i_out * impulse * state.jw_out;
            positions[state.index_out] = pos_out;

            let mut pos_ref = positions[state.index_ref];
            pos_ref.linear -= state.jv * (impulse * state.inv_mass_ref);
            pos_ref.angular -= state.inv_i_ref * impulse * state.jw_ref;
            positions[state.index_ref] = pos_ref;
        }

        c.abs() < conf.linear_slop
    }
}
