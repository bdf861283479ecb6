//! Prismatic joint: two bodies translate along a shared axis with relative
//! rotation locked, optionally within a translation limit and driven by a
//! linear motor.
//!
//! The limit row joins the two constraint rows in a 3x3 block; when the
//! accumulated limit impulse would leave its admissible half-line the block
//! is re-solved with the limit impulse pinned and its contribution folded
//! into the 2x2 right-hand side.

use planar_types::{
    cross, perp, solve33, solve33_22, BodyId, Mat33, Position, Rot, Vec2, Vec3,
    Velocity,
};

use crate::{BodyMetaMap, JointStepConf, LimitState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Solver scratch recomputed each island solve.
#[derive(Debug, Clone, Default)]
struct SolverState {
    index_a: usize,
    index_b: usize,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    axis: Vec2,
    perp: Vec2,
    s1: f64,
    s2: f64,
    a1: f64,
    a2: f64,
    k: Mat33,
    motor_mass: f64,
}

/// A prismatic (slider) joint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrismaticJoint {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Whether the connected bodies may still collide.
    pub collide_connected: bool,

    /// Anchor in body A's local frame.
    pub local_anchor_a: Vec2,
    /// Anchor in body B's local frame.
    pub local_anchor_b: Vec2,
    /// Slide axis in body A's local frame, unit length.
    pub local_axis_a: Vec2,
    /// `angleB - angleA` at rig time.
    pub reference_angle: f64,

    /// Whether the translation limit is active.
    pub enable_limit: bool,
    /// Lower translation along the axis, meters.
    pub lower_translation: f64,
    /// Upper translation along the axis, meters.
    pub upper_translation: f64,
    /// Whether the motor is active.
    pub enable_motor: bool,
    /// Motor target speed along the axis, m/s.
    pub motor_speed: f64,
    /// Motor force cap, N.
    pub max_motor_force: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    impulse: Vec3,
    #[cfg_attr(feature = "serde", serde(skip))]
    motor_impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    limit_state: LimitState,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: SolverState,
}

impl PrismaticJoint {
    /// Create a prismatic joint with the given local anchors and axis.
    ///
    /// The axis is normalized; a zero axis falls back to +X.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        local_axis_a: Vec2,
    ) -> Self {
        let n = local_axis_a.norm();
        let local_axis_a = if n > f64::EPSILON {
            local_axis_a / n
        } else {
            Vec2::new(1.0, 0.0)
        };
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a,
            local_anchor_b,
            local_axis_a,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
            impulse: Vec3::zeros(),
            motor_impulse: 0.0,
            limit_state: LimitState::Inactive,
            state: SolverState::default(),
        }
    }

    /// Enable the translation limit.
    #[must_use]
    pub fn with_limit(mut self, lower: f64, upper: f64) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }

    /// Enable the motor.
    #[must_use]
    pub fn with_motor(mut self, speed: f64, max_force: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }

    /// The current translation along the axis, from the body poses.
    #[must_use]
    pub fn translation(&self, xf_a: &planar_types::Pose2, xf_b: &planar_types::Pose2) -> f64 {
        let p_a = xf_a.transform_point(self.local_anchor_a);
        let p_b = xf_b.transform_point(self.local_anchor_b);
        let axis = xf_a.q.rotate(self.local_axis_a);
        (p_b - p_a).dot(&axis)
    }

    /// The current limit state after the last solve.
    #[must_use]
    pub fn limit_state(&self) -> LimitState {
        self.limit_state
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        metas: &BodyMetaMap,
        positions: &mut [Position],
        velocities: &mut [Velocity],
        conf: &JointStepConf,
    ) {
        let Some((meta_a, meta_b)) = crate::lookup2(metas, self.body_a, self.body_b) else {
            return;
        };
        let s = &mut self.state;
        s.index_a = meta_a.index;
        s.index_b = meta_b.index;
        s.local_center_a = meta_a.local_center;
        s.local_center_b = meta_b.local_center;
        s.inv_mass_a = meta_a.inv_mass;
        s.inv_mass_b = meta_b.inv_mass;
        s.inv_i_a = meta_a.inv_inertia;
        s.inv_i_b = meta_b.inv_inertia;

        let c_a = positions[s.index_a].linear;
        let a_a = positions[s.index_a].angular;
        let c_b = positions[s.index_b].linear;
        let a_b = positions[s.index_b].angular;
        let mut v_a = velocities[s.index_a];
        let mut v_b = velocities[s.index_b];

        let q_a = Rot::new(a_a);
        let q_b = Rot::new(a_b);

        let r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        let r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);
        let d = (c_b - c_a) + r_b - r_a;

        let (m_a, m_b) = (s.inv_mass_a, s.inv_mass_b);
        let (i_a, i_b) = (s.inv_i_a, s.inv_i_b);

        // Motor Jacobian and effective mass.
        s.axis = q_a.rotate(self.local_axis_a);
        s.a1 = cross(d + r_a, s.axis);
        s.a2 = cross(r_b, s.axis);
        s.motor_mass = m_a + m_b + i_a * s.a1 * s.a1 + i_b * s.a2 * s.a2;
        if s.motor_mass > 0.0 {
            s.motor_mass = 1.0 / s.motor_mass;
        }

        // Prismatic constraint block.
        s.perp = q_a.rotate(perp(self.local_axis_a));
        s.s1 = cross(d + r_a, s.perp);
        s.s2 = cross(r_b, s.perp);

        let k11 = m_a + m_b + i_a * s.s1 * s.s1 + i_b * s.s2 * s.s2;
        let k12 = i_a * s.s1 + i_b * s.s2;
        let k13 = i_a * s.s1 * s.a1 + i_b * s.s2 * s.a2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            // Both bodies have fixed rotation.
            k22 = 1.0;
        }
        let k23 = i_a * s.a1 + i_b * s.a2;
        let k33 = m_a + m_b + i_a * s.a1 * s.a1 + i_b * s.a2 * s.a2;
        s.k = Mat33::new(k11, k12, k13, k12, k22, k23, k13, k23, k33);

        // Limit state.
        if self.enable_limit {
            let joint_translation = s.axis.dot(&d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * conf.linear_slop {
                self.limit_state = LimitState::Equal;
            } else if joint_translation <= self.lower_translation {
                if self.limit_state != LimitState::AtLower {
                    self.limit_state = LimitState::AtLower;
                    self.impulse.z = 0.0;
                }
            } else if joint_translation >= self.upper_translation {
                if self.limit_state != LimitState::AtUpper {
                    self.limit_state = LimitState::AtUpper;
                    self.impulse.z = 0.0;
                }
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
            self.impulse.z = 0.0;
        }

        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if conf.warm_starting {
            self.impulse *= conf.dt_ratio;
            self.motor_impulse *= conf.dt_ratio;

            let p = s.perp * self.impulse.x + s.axis * (self.motor_impulse + self.impulse.z);
            let l_a =
                self.impulse.x * s.s1 + self.impulse.y + (self.motor_impulse + self.impulse.z) * s.a1;
            let l_b =
                self.impulse.x * s.s2 + self.impulse.y + (self.motor_impulse + self.impulse.z) * s.a2;

            v_a.linear -= p * m_a;
            v_a.angular -= i_a * l_a;
            v_b.linear += p * m_b;
            v_b.angular += i_b * l_b;
        } else {
            self.impulse = Vec3::zeros();
            self.motor_impulse = 0.0;
        }

        velocities[s.index_a] = v_a;
        velocities[s.index_b] = v_b;
    }

    pub(crate) fn solve_velocity_constraints(
        &mut self,
        velocities: &mut [Velocity],
        conf: &JointStepConf,
    ) {
        let s = &self.state;
        let mut v_a = velocities[s.index_a];
        let mut v_b = velocities[s.index_b];
        let (m_a, m_b) = (s.inv_mass_a, s.inv_mass_b);
        let (i_a, i_b) = (s.inv_i_a, s.inv_i_b);

        // Motor.
        if self.enable_motor && self.limit_state != LimitState::Equal {
            let cdot = s.axis.dot(&(v_b.linear - v_a.linear)) + s.a2 * v_b.angular
                - s.a1 * v_a.angular;
            let impulse = s.motor_mass * (self.motor_speed - cdot);
            let old_impulse = self.motor_impulse;
            let max_impulse = conf.dt * self.max_motor_force;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            let p = s.axis * impulse;
            v_a.linear -= p * m_a;
            v_a.angular -= i_a * impulse * s.a1;
            v_b.linear += p * m_b;
            v_b.angular += i_b * impulse * s.a2;
        }

        let cdot1 = Vec2::new(
            s.perp.dot(&(v_b.linear - v_a.linear)) + s.s2 * v_b.angular - s.s1 * v_a.angular,
            v_b.angular - v_a.angular,
        );

        if self.enable_limit && self.limit_state != LimitState::Inactive {
            // Solve the slider and limit rows as one block.
            let cdot2 = s.axis.dot(&(v_b.linear - v_a.linear)) + s.a2 * v_b.angular
                - s.a1 * v_a.angular;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let f1 = self.impulse;
            self.impulse += solve33(&s.k, -cdot);

            match self.limit_state {
                LimitState::AtLower => self.impulse.z = self.impulse.z.max(0.0),
                LimitState::AtUpper => self.impulse.z = self.impulse.z.min(0.0),
                _ => {}
            }

            // Fold the clamped limit impulse back into the 2x2 system:
            // f2(1:2) = invK(1:2,1:2) * (-Cdot(1:2) - K(1:2,3) * (f2(3) - f1(3))) + f1(1:2)
            let b = -cdot1 - Vec2::new(s.k[(0, 2)], s.k[(1, 2)]) * (self.impulse.z - f1.z);
            let f2r = solve33_22(&s.k, b) + Vec2::new(f1.x, f1.y);
            self.impulse.x = f2r.x;
            self.impulse.y = f2r.y;

            let df = self.impulse - f1;
            let p = s.perp * df.x + s.axis * df.z;
            let l_a = df.x * s.s1 + df.y + df.z * s.a1;
            let l_b = df.x * s.s2 + df.y + df.z * s.a2;

            v_a.linear -= p * m_a;
            v_a.angular -= i_a * l_a;
            v_b.linear += p * m_b;
            v_b.angular += i_b * l_b;
        } else {
            // Limit inactive: solve only the slider rows.
            let df = solve33_22(&s.k, -cdot1);
            self.impulse.x += df.x;
            self.impulse.y += df.y;

            let p = s.perp * df.x;
            let l_a = df.x * s.s1 + df.y;
            let l_b = df.x * s.s2 + df.y;

            v_a.linear -= p * m_a;
            v_a.angular -= i_a * l_a;
            v_b.linear += p * m_b;
            v_b.angular += i_b * l_b;
        }

        velocities[s.index_a] = v_a;
        velocities[s.index_b] = v_b;
    }

    pub(crate) fn solve_position_constraints(
        &mut self,
        positions: &mut [Position],
        conf: &JointStepConf,
    ) -> bool {
        let s = &self.state;
        let mut pos_a = positions[s.index_a];
        let mut pos_b = positions[s.index_b];
        let (m_a, m_b) = (s.inv_mass_a, s.inv_mass_b);
        let (i_a, i_b) = (s.inv_i_a, s.inv_i_b);

        let q_a = Rot::new(pos_a.angular);
        let q_b = Rot::new(pos_b.angular);

        // Fresh Jacobians; the stored ones are stale after integration.
        let r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        let r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);
        let d = pos_b.linear + r_b - pos_a.linear - r_a;

        let axis = q_a.rotate(self.local_axis_a);
        let a1 = cross(d + r_a, axis);
        let a2 = cross(r_b, axis);
        let perp_axis = q_a.rotate(perp(self.local_axis_a));
        let s1 = cross(d + r_a, perp_axis);
        let s2 = cross(r_b, perp_axis);

        let c1 = Vec2::new(
            perp_axis.dot(&d),
            pos_b.angular - pos_a.angular - self.reference_angle,
        );
        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let mut active = false;
        let mut c2 = 0.0;
        if self.enable_limit {
            let translation = axis.dot(&d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * conf.linear_slop {
                // Equal limits: prevent large corrections.
                c2 = translation.clamp(-conf.max_linear_correction, conf.max_linear_correction);
                linear_error = linear_error.max(translation.abs());
                active = true;
            } else if translation <= self.lower_translation {
                c2 = (translation - self.lower_translation + conf.linear_slop)
                    .clamp(-conf.max_linear_correction, 0.0);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = (translation - self.upper_translation - conf.linear_slop)
                    .clamp(0.0, conf.max_linear_correction);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let impulse = if active {
            let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
            let k12 = i_a * s1 + i_b * s2;
            let k13 = i_a * s1 * a1 + i_b * s2 * a2;
            let mut k22 = i_a + i_b;
            if k22 == 0.0 {
                k22 = 1.0;
            }
            let k23 = i_a * a1 + i_b * a2;
            let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
            let k = Mat33::new(k11, k12, k13, k12, k22, k23, k13, k23, k33);
            solve33(&k, -Vec3::new(c1.x, c1.y, c2))
        } else {
            let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
            let k12 = i_a * s1 + i_b * s2;
            let mut k22 = i_a + i_b;
            if k22 == 0.0 {
                k22 = 1.0;
            }
            let k = Mat33::new(k11, k12, 0.0, k12, k22, 0.0, 0.0, 0.0, 1.0);
            let xy = solve33_22(&k, -c1);
            Vec3::new(xy.x, xy.y, 0.0)
        };

        let p = perp_axis * impulse.x + axis * impulse.z;
        let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

        pos_a.linear -= p * m_a;
        pos_a.angular -= i_a * l_a;
        pos_b.linear += p * m_b;
        pos_b.angular += i_b * l_b;

        positions[s.index_a] = pos_a;
        positions[s.index_b] = pos_b;

        linear_error <= conf.linear_slop && angular_error <= conf.angular_slop
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::test_support::{rig, run_joint};
    use crate::Joint;
    use planar_types::Pose2;

    fn x_slider(lower: f64, upper: f64) -> Joint {
        Joint::Prismatic(
            PrismaticJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
            )
            .with_limit(lower, upper),
        )
    }

    #[test]
    fn test_off_axis_motion_is_removed() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.5, 0.0));
        let mut joint = x_slider(-10.0, 10.0);
        velocities[1].linear = Vec2::new(1.0, 2.0);
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 30);
        assert!(
            velocities[1].linear.y.abs() < 1e-6,
            "motion perpendicular to the axis must vanish"
        );
        assert!(positions[1].linear.y.abs() < 0.01);
        assert!(positions[1].angular.abs() < 0.01);
    }

    #[test]
    fn test_translation_respects_limits() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let mut joint = x_slider(-1.0, 1.0);
        let conf = JointStepConf::default();

        // Drag the body hard along +x; the limit must hold.
        for _ in 0..240 {
            velocities[1].linear.x += 1.0;
            joint.init_velocity_constraints(&metas, &mut positions, &mut velocities, &conf);
            for _ in 0..8 {
                joint.solve_velocity_constraints(&mut velocities, &conf);
            }
            for i in 0..2 {
                positions[i].linear += velocities[i].linear * conf.dt;
                positions[i].angular += velocities[i].angular * conf.dt;
            }
            for _ in 0..3 {
                if joint.solve_position_constraints(&mut positions, &conf) {
                    break;
                }
            }
            let translation = match &joint {
                Joint::Prismatic(p) => p.translation(
                    &Pose2::new(positions[0].linear, positions[0].angular),
                    &Pose2::new(positions[1].linear, positions[1].angular),
                ),
                _ => unreachable!(),
            };
            assert!(
                (-1.0 - conf.linear_slop..=1.0 + conf.linear_slop).contains(&translation),
                "translation {translation} escaped the limits"
            );
        }
    }

    #[test]
    fn test_motor_reaches_speed() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let mut joint = Joint::Prismatic(
            PrismaticJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
            )
            .with_motor(1.5, 1000.0),
        );
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 30);
        assert!((velocities[1].linear.x - 1.5).abs() < 1e-6);
    }
}
