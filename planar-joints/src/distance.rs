//! Distance joint: keeps two local anchor points a fixed distance apart,
//! optionally softened into a damped spring.

use planar_types::{cross, cross_sv, BodyId, Position, Rot, Vec2, Velocity};

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
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f64,
    gamma: f64,
    bias: f64,
}

/// A fixed-distance joint, optionally a damped spring.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistanceJoint {
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
    /// Rest length between the anchors.
    pub length: f64,
    /// Spring frequency in Hz; zero makes the joint rigid.
    pub frequency_hz: f64,
    /// Spring damping ratio; 1 is critical damping.
    pub damping_ratio: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: SolverState,
}

impl DistanceJoint {
    /// Create a rigid distance joint with the given local anchors and rest
    /// length.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        length: f64,
    ) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a,
            local_anchor_b,
            length,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            impulse: 0.0,
            state: SolverState::default(),
        }
    }

    /// Soften the joint into a damped spring.
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

        let c_a = positions[s.index_a].linear;
        let a_a = positions[s.index_a].angular;
        let c_b = positions[s.index_b].linear;
        let a_b = positions[s.index_b].angular;
        let mut v_a = velocities[s.index_a];
        let mut v_b = velocities[s.index_b];

        let q_a = Rot::new(a_a);
        let q_b = Rot::new(a_b);

        s.r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        s.r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);
        s.u = c_b + s.r_b - c_a - s.r_a;

        let current_length = s.u.norm();
        if current_length > conf.linear_slop {
            s.u /= current_length;
        } else {
            s.u = Vec2::new(0.0, 0.0);
        }

        let cr_a = cross(s.r_a, s.u);
        let cr_b = cross(s.r_b, s.u);
        let mut inv_mass = s.inv_mass_a
            + s.inv_i_a * cr_a * cr_a
            + s.inv_mass_b
            + s.inv_i_b * cr_b * cr_b;
        s.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = current_length - self.length;
            let omega = 2.0 * std::f64::consts::PI * self.frequency_hz;
            let damp = 2.0 * s.mass * self.damping_ratio * omega;
            let stiffness = s.mass * omega * omega;

            let h = conf.dt;
            s.gamma = h * (damp + h * stiffness);
            s.gamma = if s.gamma != 0.0 { 1.0 / s.gamma } else { 0.0 };
            s.bias = c * h * stiffness * s.gamma;

            inv_mass += s.gamma;
            s.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            s.gamma = 0.0;
            s.bias = 0.0;
        }

        if conf.warm_starting {
            self.impulse *= conf.dt_ratio;
            let p = s.u * self.impulse;
            v_a.linear -= p * s.inv_mass_a;
            v_a.angular -= s.inv_i_a * cross(s.r_a, p);
            v_b.linear += p * s.inv_mass_b;
            v_b.angular += s.inv_i_b * cross(s.r_b, p);
        } else {
            self.impulse = 0.0;
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

        let vp_a = v_a.linear + cross_sv(v_a.angular, s.r_a);
        let vp_b = v_b.linear + cross_sv(v_b.angular, s.r_b);
        let cdot = s.u.dot(&(vp_b - vp_a));

        let impulse = -s.mass * (cdot + s.bias + s.gamma * self.impulse);
        self.impulse += impulse;

        let p = s.u * impulse;
        v_a.linear -= p * s.inv_mass_a;
        v_a.angular -= s.inv_i_a * cross(s.r_a, p);
        v_b.linear += p * s.inv_mass_b;
        v_b.angular += s.inv_i_b * cross(s.r_b, p);

        velocities[s.index_a] = v_a;
        velocities[s.index_b] = v_b;
    }

    pub(crate) fn solve_position_constraints(
        &mut self,
        positions: &mut [Position],
        conf: &JointStepConf,
    ) -> bool {
        // A spring never fights integration error at position level.
        if self.frequency_hz > 0.0 {
            return true;
        }
        let s = &self.state;
        let mut pos_a = positions[s.index_a];
        let mut pos_b = positions[s.index_b];

        let q_a = Rot::new(pos_a.angular);
        let q_b = Rot::new(pos_b.angular);
        let r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        let r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);
        let mut u = pos_b.linear + r_b - pos_a.linear - r_a;

        let current_length = u.norm();
        if current_length > f64::EPSILON {
            u /= current_length;
        }
        let c = (current_length - self.length)
            .clamp(-conf.max_linear_correction, conf.max_linear_correction);

        let impulse = -s.mass * c;
        let p = u * impulse;

        pos_a.linear -= p * s.inv_mass_a;
        pos_a.angular -= s.inv_i_a * cross(r_a, p);
        pos_b.linear += p * s.inv_mass_b;
        pos_b.angular += s.inv_i_b * cross(r_b, p);

        positions[s.index_a] = pos_a;
        positions[s.index_b] = pos_b;

        c.abs() < conf.linear_slop
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
    fn test_rigid_joint_restores_length() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(3.0, 0.0));
        let mut joint = Joint::Distance(DistanceJoint::new(
            BodyId::new(0),
            BodyId::new(1),
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0),
            2.0,
        ));
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 60);
        assert_relative_eq!(positions[1].linear.norm(), 2.0, epsilon = 0.01);
    }

    #[test]
    fn test_spring_oscillates_and_decays() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(3.0, 0.0));
        let mut joint = Joint::Distance(
            DistanceJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
                2.0,
            )
            .with_spring(2.0, 0.7),
        );
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 600);
        // Under-damped spring settles at the rest length.
        assert_relative_eq!(positions[1].linear.norm(), 2.0, epsilon = 0.05);
    }
}
