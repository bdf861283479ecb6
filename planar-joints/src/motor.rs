//! Motor joint: drives a body toward a relative pose offset from another
//! body under force and torque caps. Useful for kinematic character control
//! with physical pushback.

use planar_types::{cross, cross_sv, inverse22, BodyId, Mat22, Position, Rot, Vec2, Velocity};

use crate::{BodyMetaMap, JointStepConf};

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
    linear_error: Vec2,
    angular_error: f64,
    linear_mass: Mat22,
    angular_mass: f64,
}

/// A motor joint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotorJoint {
    /// Reference body.
    pub body_a: BodyId,
    /// Driven body.
    pub body_b: BodyId,
    /// Whether the connected bodies may still collide.
    pub collide_connected: bool,

    /// Target position of body B's origin in body A's frame.
    pub linear_offset: Vec2,
    /// Target angle of body B relative to body A.
    pub angular_offset: f64,
    /// Maximum driving force, N.
    pub max_force: f64,
    /// Maximum driving torque, N*m.
    pub max_torque: f64,
    /// Fraction of the position error corrected per step, in `[0, 1]`.
    pub correction_factor: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    linear_impulse: Vec2,
    #[cfg_attr(feature = "serde", serde(skip))]
    angular_impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: SolverState,
}

impl MotorJoint {
    /// Create a motor joint holding body B at its current offset.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            linear_offset: Vec2::new(0.0, 0.0),
            angular_offset: 0.0,
            max_force: 1.0,
            max_torque: 1.0,
            correction_factor: 0.3,
            linear_impulse: Vec2::new(0.0, 0.0),
            angular_impulse: 0.0,
            state: SolverState::default(),
        }
    }

    /// Set the target offsets.
    #[must_use]
    pub fn with_offsets(mut self, linear: Vec2, angular: f64) -> Self {
        self.linear_offset = linear;
        self.angular_offset = angular;
        self
    }

    /// Set the force and torque caps.
    #[must_use]
    pub fn with_limits(mut self, max_force: f64, max_torque: f64) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
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

        let c_a = positions[s.index_a].linear;
        let a_a = positions[s.index_a].angular;
        let c_b = positions[s.index_b].linear;
        let a_b = positions[s.index_b].angular;
        let mut v_a = velocities[s.index_a];
        let mut v_b = velocities[s.index_b];

        let q_a = Rot::new(a_a);
        let q_b = Rot::new(a_b);

        s.r_a = q_a.rotate(-s.local_center_a);
        s.r_b = q_b.rotate(-s.local_center_b);

        let (m_a, m_b) = (s.inv_mass_a, s.inv_mass_b);
        let (i_a, i_b) = (s.inv_i_a, s.inv_i_b);

        let k = Mat22::new(
            m_a + m_b + i_a * s.r_a.y * s.r_a.y + i_b * s.r_b.y * s.r_b.y,
            -i_a * s.r_a.x * s.r_a.y - i_b * s.r_b.x * s.r_b.y,
            -i_a * s.r_a.x * s.r_a.y - i_b * s.r_b.x * s.r_b.y,
            m_a + m_b + i_a * s.r_a.x * s.r_a.x + i_b * s.r_b.x * s.r_b.x,
        );
        s.linear_mass = inverse22(&k);

        s.angular_mass = i_a + i_b;
        if s.angular_mass > 0.0 {
            s.angular_mass = 1.0 / s.angular_mass;
        }

        s.linear_error = c_b + s.r_b - c_a - s.r_a - q_a.rotate(self.linear_offset);
        s.angular_error = a_b - a_a - self.angular_offset;

        if conf.warm_starting {
            self.linear_impulse *= conf.dt_ratio;
            self.angular_impulse *= conf.dt_ratio;
            let p = self.linear_impulse;
            v_a.linear -= p * m_a;
            v_a.angular -= i_a * (cross(s.r_a, p) + self.angular_impulse);
            v_b.linear += p * m_b;
            v_b.angular += i_b * (cross(s.r_b, p) + self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::new(0.0, 0.0);
            self.angular_impulse = 0.0;
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
        let h = conf.dt;
        let inv_h = conf.inv_dt;

        // Angular drive.
        {
            let cdot = v_b.angular - v_a.angular
                + inv_h * self.correction_factor * s.angular_error;
            let mut impulse = -s.angular_mass * cdot;

            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse =
                (self.angular_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.angular_impulse - old_impulse;

            v_a.angular -= i_a * impulse;
            v_b.angular += i_b * impulse;
        }

        // Linear drive.
        {
            let cdot = v_b.linear + cross_sv(v_b.angular, s.r_b)
                - v_a.linear
                - cross_sv(v_a.angular, s.r_a)
                + s.linear_error * (inv_h * self.correction_factor);

            let mut impulse = -(s.linear_mass * cdot);
            let old_impulse = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = h * self.max_force;
            if self.linear_impulse.norm_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize() * max_impulse;
            }
            impulse = self.linear_impulse - old_impulse;

            v_a.linear -= impulse * m_a;
            v_a.angular -= i_a * cross(s.r_a, impulse);
            v_b.linear += impulse * m_b;
            v_b.angular += i_b * cross(s.r_b, impulse);
        }

        velocities[s.index_a] = v_a;
        velocities[s.index_b] = v_b;
    }

    pub(crate) fn solve_position_constraints(
        &mut self,
        _positions: &mut [Position],
        _conf: &JointStepConf,
    ) -> bool {
        // The drive corrects position error through velocity bias.
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::test_support::{rig, run_joint};
    use crate::Joint;

    #[test]
    fn test_body_tracks_offset() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let mut joint = Joint::Motor(
            MotorJoint::new(BodyId::new(0), BodyId::new(1))
                .with_offsets(Vec2::new(2.0, 0.0), 0.5)
                .with_limits(100.0, 100.0),
        );
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 300);
        assert!(
            (positions[1].linear - Vec2::new(2.0, 0.0)).norm() < 0.05,
            "position {:?} missed the offset",
            positions[1].linear
        );
        assert!((positions[1].angular - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_weak_motor_cannot_reach() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let mut joint = Joint::Motor(
            MotorJoint::new(BodyId::new(0), BodyId::new(1))
                .with_offsets(Vec2::new(100.0, 0.0), 0.0)
                .with_limits(0.01, 0.01),
        );
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 60);
        assert!(positions[1].linear.x < 1.0, "capped force crawls");
    }
}
