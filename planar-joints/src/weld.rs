//! Weld joint: locks the relative pose of two bodies, optionally softened
//! into a rotational spring.

use planar_types::{
    cross, cross_sv, solve22, solve33, sym_inverse33, BodyId, Mat22, Mat33, Position, Rot, Vec2,
    Vec3, Velocity,
};

use crate::{BodyMetaMap, JointBodyMeta, JointStepConf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

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
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat33,
    gamma: f64,
    bias: f64,
}

/// A weld joint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeldJoint {
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
    /// `angleB - angleA` at rig time.
    pub reference_angle: f64,
    /// Rotational spring frequency in Hz; zero welds rigidly.
    pub frequency_hz: f64,
    /// Rotational spring damping ratio.
    pub damping_ratio: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    impulse: Vec3,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: SolverState,
}

impl WeldJoint {
    /// Create a rigid weld joint with the given local anchors.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a,
            local_anchor_b,
            reference_angle: 0.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            impulse: Vec3::zeros(),
            state: SolverState::default(),
        }
    }

    /// Soften the angular lock into a damped spring.
    #[must_use]
    pub fn with_spring(mut self, frequency_hz: f64, damping_ratio: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
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

        let a_a = positions[s.index_a].angular;
        let a_b = positions[s.index_b].angular;
        let mut v_a = velocities[s.index_a];
        let mut v_b = velocities[s.index_b];

        let q_a = Rot::new(a_a);
        let q_b = Rot::new(a_b);

        s.r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        s.r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);

        let (m_a, m_b) = (s.inv_mass_a, s.inv_mass_b);
        let (i_a, i_b) = (s.inv_i_a, s.inv_i_b);

        let k11 = m_a + m_b + i_a * s.r_a.y * s.r_a.y + i_b * s.r_b.y * s.r_b.y;
        let k12 = -i_a * s.r_a.y * s.r_a.x - i_b * s.r_b.y * s.r_b.x;
        let k13 = -i_a * s.r_a.y - i_b * s.r_b.y;
        let k22 = m_a + m_b + i_a * s.r_a.x * s.r_a.x + i_b * s.r_b.x * s.r_b.x;
        let k23 = i_a * s.r_a.x + i_b * s.r_b.x;
        let k33 = i_a + i_b;
        let k = Mat33::new(k11, k12, k13, k12, k22, k23, k13, k23, k33);

        if self.frequency_hz > 0.0 {
            // Soft angular row: invert only the linear block, then derive
            // the angular effective mass with the spring's gamma folded in.
            let linear = planar_types::inverse22(&Mat22::new(k11, k12, k12, k22));
            s.mass = Mat33::new(
                linear[(0, 0)],
                linear[(0, 1)],
                0.0,
                linear[(1, 0)],
                linear[(1, 1)],
                0.0,
                0.0,
                0.0,
                0.0,
            );

            let inv_m = i_a + i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };
            let c = a_b - a_a - self.reference_angle;
            let omega = 2.0 * std::f64::consts::PI * self.frequency_hz;
            let damp = 2.0 * m * self.damping_ratio * omega;
            let stiffness = m * omega * omega;

            let h = conf.dt;
            s.gamma = h * (damp + h * stiffness);
            s.gamma = if s.gamma != 0.0 { 1.0 / s.gamma } else { 0.0 };
            s.bias = c * h * stiffness * s.gamma;

            let inv_m = inv_m + s.gamma;
            s.mass[(2, 2)] = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else {
            s.mass = sym_inverse33(&k);
            s.gamma = 0.0;
            s.bias = 0.0;
        }

        if conf.warm_starting {
            self.impulse *= conf.dt_ratio;
            let p = Vec2::new(self.impulse.x, self.impulse.y);
            v_a.linear -= p * m_a;
            v_a.angular -= i_a * (cross(s.r_a, p) + self.impulse.z);
            v_b.linear += p * m_b;
            v_b.angular += i_b * (cross(s.r_b, p) + self.impulse.z);
        } else {
            self.impulse = Vec3::zeros();
        }

        velocities[s.index_a] = v_a;
        velocities[s.index_b] = v_b;
    }

    pub(crate) fn solve_velocity_constraints(
        &mut self,
        velocities: &mut [Velocity],
        _conf: &JointStepConf,
    ) {
        let s = &self.state;
        let mut v_a = velocities[s.index_a];
        let mut v_b = velocities[s.index_b];
        let (m_a, m_b) = (s.inv_mass_a, s.inv_mass_b);
        let (i_a, i_b) = (s.inv_i_a, s.inv_i_b);

        if self.frequency_hz > 0.0 {
            // Angular row first.
            let cdot2 = v_b.angular - v_a.angular;
            let impulse2 = -s.mass[(2, 2)] * (cdot2 + s.bias + s.gamma * self.impulse.z);
            self.impulse.z += impulse2;
            v_a.angular -= i_a * impulse2;
            v_b.angular += i_b * impulse2;

            // Then the linear block.
            let cdot1 = v_b.linear + cross_sv(v_b.angular, s.r_b)
                - v_a.linear
                - cross_sv(v_a.angular, s.r_a);
            let impulse1 = -Vec2::new(
                s.mass[(0, 0)] * cdot1.x + s.mass[(0, 1)] * cdot1.y,
                s.mass[(1, 0)] * cdot1.x + s.mass[(1, 1)] * cdot1.y,
            );
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            v_a.linear -= impulse1 * m_a;
            v_a.angular -= i_a * cross(s.r_a, impulse1);
            v_b.linear += impulse1 * m_b;
            v_b.angular += i_b * cross(s.r_b, impulse1);
        } else {
            let cdot1 = v_b.linear + cross_sv(v_b.angular, s.r_b)
                - v_a.linear
                - cross_sv(v_a.angular, s.r_a);
            let cdot2 = v_b.angular - v_a.angular;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let impulse = -(s.mass * cdot);
            self.impulse += impulse;

            let p = Vec2::new(impulse.x, impulse.y);
            v_a.linear -= p * m_a;
            v_a.angular -= i_a * (cross(s.r_a, p) + impulse.z);
            v_b.linear += p * m_b;
            v_b.angular += i_b * (cross(s.r_b, p) + impulse.z);
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
        let r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        let r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);

        let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
        let k12 = -i_a * r_a.y * r_a.x - i_b * r_b.y * r_b.x;
        let k13 = -i_a * r_a.y - i_b * r_b.y;
        let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
        let k23 = i_a * r_a.x + i_b * r_b.x;
        let k33 = i_a + i_b;
        let k = Mat33::new(k11, k12, k13, k12, k22, k23, k13, k23, k33);

        let (position_error, angular_error);
        if self.frequency_hz > 0.0 {
            let c1 = pos_b.linear + r_b - pos_a.linear - r_a;
            position_error = c1.norm();
            angular_error = 0.0;

            let p = -solve22(&Mat22::new(k11, k12, k12, k22), c1);
            pos_a.linear -= p * m_a;
            pos_a.angular -= i_a * cross(r_a, p);
            pos_b.linear += p * m_b;
            pos_b.angular += i_b * cross(r_b, p);
        } else {
            let c1 = pos_b.linear + r_b - pos_a.linear - r_a;
            let c2 = pos_b.angular - pos_a.angular - self.reference_angle;
            position_error = c1.norm();
            angular_error = c2.abs();

            let impulse = -solve33(&k, Vec3::new(c1.x, c1.y, c2));
            let p = Vec2::new(impulse.x, impulse.y);

            pos_a.linear -= p * m_a;
            pos_a.angular -= i_a * (cross(r_a, p) + impulse.z);
            pos_b.linear += p * m_b;
            pos_b.angular += i_b * (cross(r_b, p) + impulse.z);
        }

        positions[s.index_a] = pos_a;
        positions[s.index_b] = pos_b;

        position_error <= conf.linear_slop && angular_error <= conf.angular_slop
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::test_support::{rig, run_joint};
    use crate::Joint;
    use approx::assert_relative_eq;

    #[test]
    fn test_weld_locks_relative_pose() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(1.0, 0.0));
        let mut joint = Joint::Weld(WeldJoint::new(
            BodyId::new(0),
            BodyId::new(1),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ));
        velocities[1] = Velocity::new(Vec2::new(0.0, 2.0), 3.0);
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 60);
        assert_relative_eq!(positions[1].linear.x, 1.0, epsilon = 0.01);
        assert_relative_eq!(positions[1].linear.y, 0.0, epsilon = 0.01);
        assert_relative_eq!(positions[1].angular, 0.0, epsilon = 0.01);
    }

    #[test]
    fn test_spring_weld_keeps_anchor_but_flexes() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(1.0, 0.0));
        let mut joint = Joint::Weld(
            WeldJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 0.0),
            )
            .with_spring(1.0, 0.5),
        );
        velocities[1].angular = 3.0;
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 600);
        // The damped spring eventually re-aligns the angle too.
        assert_relative_eq!(positions[1].angular, 0.0, epsilon = 0.05);
        assert_relative_eq!(positions[1].linear.x, 1.0, epsilon = 0.02);
    }
}
