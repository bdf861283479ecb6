//! Friction joint: resists relative linear and angular motion under force
//! and torque caps. Gives top-down scenes their table friction.

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
    linear_mass: Mat22,
    angular_mass: f64,
}

/// A friction joint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrictionJoint {
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
    /// Maximum friction force, N.
    pub max_force: f64,
    /// Maximum friction torque, N*m.
    pub max_torque: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    linear_impulse: Vec2,
    #[cfg_attr(feature = "serde", serde(skip))]
    angular_impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: SolverState,
}

impl FrictionJoint {
    /// Create a friction joint with the given local anchors.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a,
            local_anchor_b,
            max_force: 0.0,
            max_torque: 0.0,
            linear_impulse: Vec2::new(0.0, 0.0),
            angular_impulse: 0.0,
            state: SolverState::default(),
        }
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

        // Angular friction.
        {
            let cdot = v_b.angular - v_a.angular;
            let mut impulse = -s.angular_mass * cdot;

            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse =
                (self.angular_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.angular_impulse - old_impulse;

            v_a.angular -= i_a * impulse;
            v_b.angular += i_b * impulse;
        }

        // Linear friction.
        {
            let cdot = v_b.linear + cross_sv(v_b.angular, s.r_b)
                - v_a.linear
                - cross_sv(v_a.angular, s.r_a);

            let mut impulse = -(s.linear_mass * cdot);
            let old_impulse = self.linear_impulse;
            self.linear_impulse += impulse;

            // Clamp the accumulated impulse to the friction disk.
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
        // Friction has no positional target.
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
    fn test_friction_stops_sliding_body() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let mut joint = Joint::Friction(
            FrictionJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
            )
            .with_limits(10.0, 10.0),
        );
        velocities[1] = Velocity::new(Vec2::new(2.0, 0.0), 1.0);
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 60);
        assert!(velocities[1].linear.norm() < 1e-6, "linear motion damped out");
        assert!(velocities[1].angular.abs() < 1e-6, "spin damped out");
    }

    #[test]
    fn test_weak_friction_only_slows() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let mut joint = Joint::Friction(
            FrictionJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
            )
            .with_limits(0.5, 0.0),
        );
        velocities[1] = Velocity::new(Vec2::new(10.0, 0.0), 0.0);
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 10);
        let speed = velocities[1].linear.norm();
        assert!(speed < 10.0, "friction must slow the body");
        assert!(speed > 5.0, "capped friction cannot stop it outright");
    }
}
