//! Mouse joint: a soft, critically-dampable spring pulling a body anchor
//! toward a world-space target point. Used for interactive dragging.

use planar_types::{cross, cross_sv, inverse22, BodyId, Mat22, Position, Rot, Vec2, Velocity};

use crate::{BodyMetaMap, JointStepConf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
struct SolverState {
    index_b: usize,
    local_center_b: Vec2,
    inv_mass_b: f64,
    inv_i_b: f64,
    r_b: Vec2,
    mass: Mat22,
    c: Vec2,
    gamma: f64,
    beta: f64,
}

/// A mouse (target) joint.
///
/// Body A serves only as the reference frame owner; all impulses act on
/// body B. The constraint is always soft so a dragged body cannot be used
/// to apply unbounded forces through a rigid attachment.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MouseJoint {
    /// Reference body (receives no impulses).
    pub body_a: BodyId,
    /// Driven body.
    pub body_b: BodyId,
    /// Whether the connected bodies may still collide.
    pub collide_connected: bool,

    /// Grab point in body B's local frame.
    pub local_anchor_b: Vec2,
    /// Target point in world coordinates; update while dragging.
    pub target: Vec2,
    /// Maximum applied force, N. Scale with the body's weight.
    pub max_force: f64,
    /// Response frequency in Hz.
    pub frequency_hz: f64,
    /// Damping ratio; 1 is critical damping.
    pub damping_ratio: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    impulse: Vec2,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: SolverState,
}

impl MouseJoint {
    /// Create a mouse joint grabbing `local_anchor_b` on body B and pulling
    /// it toward `target`.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, local_anchor_b: Vec2, target: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_b,
            target,
            max_force: 0.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
            impulse: Vec2::new(0.0, 0.0),
            state: SolverState::default(),
        }
    }

    /// Set the force cap.
    #[must_use]
    pub fn with_max_force(mut self, max_force: f64) -> Self {
        self.max_force = max_force;
        self
    }

    /// Set the spring response.
    #[must_use]
    pub fn with_response(mut self, frequency_hz: f64, damping_ratio: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    /// Move the drag target.
    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        metas: &BodyMetaMap,
        positions: &mut [Position],
        velocities: &mut [Velocity],
        conf: &JointStepConf,
    ) {
        let Some(meta_b) = metas.get(&self.body_b).copied() else {
            return;
        };
        let s = &mut self.state;
        s.index_b = meta_b.index;
        s.local_center_b = meta_b.local_center;
        s.inv_mass_b = meta_b.inv_mass;
        s.inv_i_b = meta_b.inv_inertia;

        let c_b = positions[s.index_b].linear;
        let a_b = positions[s.index_b].angular;
        let mut v_b = velocities[s.index_b];

        let q_b = Rot::new(a_b);

        let mass = if s.inv_mass_b > 0.0 { 1.0 / s.inv_mass_b } else { 0.0 };
        let omega = 2.0 * std::f64::consts::PI * self.frequency_hz;
        let damp = 2.0 * mass * self.damping_ratio * omega;
        let stiffness = mass * omega * omega;

        let h = conf.dt;
        s.gamma = h * (damp + h * stiffness);
        if s.gamma != 0.0 {
            s.gamma = 1.0 / s.gamma;
        }
        s.beta = h * stiffness * s.gamma;

        s.r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);

        let (i_b, m_b) = (s.inv_i_b, s.inv_mass_b);
        let k = Mat22::new(
            m_b + i_b * s.r_b.y * s.r_b.y + s.gamma,
            -i_b * s.r_b.x * s.r_b.y,
            -i_b * s.r_b.x * s.r_b.y,
            m_b + i_b * s.r_b.x * s.r_b.x + s.gamma,
        );
        s.mass = inverse22(&k);

        s.c = (c_b + s.r_b - self.target) * s.beta;

        // Dragging works better with a little velocity damping.
        v_b = v_b * 0.98;

        if conf.warm_starting {
            self.impulse *= conf.dt_ratio;
            v_b.linear += self.impulse * m_b;
            v_b.angular += i_b * cross(s.r_b, self.impulse);
        } else {
            self.impulse = Vec2::new(0.0, 0.0);
        }

        velocities[s.index_b] = v_b;
    }

    pub(crate) fn solve_velocity_constraints(
        &mut self,
        velocities: &mut [Velocity],
        conf: &JointStepConf,
    ) {
        let s = &self.state;
        let mut v_b = velocities[s.index_b];

        let cdot = v_b.linear + cross_sv(v_b.angular, s.r_b);
        let mut impulse = -(s.mass * (cdot + s.c + self.impulse * s.gamma));

        let old_impulse = self.impulse;
        self.impulse += impulse;
        let max_impulse = conf.dt * self.max_force;
        if self.impulse.norm_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.norm();
        }
        impulse = self.impulse - old_impulse;

        v_b.linear += impulse * s.inv_mass_b;
        v_b.angular += s.inv_i_b * cross(s.r_b, impulse);

        velocities[s.index_b] = v_b;
    }

    pub(crate) fn solve_position_constraints(
        &mut self,
        _positions: &mut [Position],
        _conf: &JointStepConf,
    ) -> bool {
        // Soft constraint: position error is the spring's business.
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
    fn test_body_converges_to_target() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let mut joint = Joint::Mouse(
            MouseJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(2.0, 1.0),
            )
            .with_max_force(1000.0),
        );
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 300);
        assert!(
            (positions[1].linear - Vec2::new(2.0, 1.0)).norm() < 0.05,
            "body at {:?} did not reach the target",
            positions[1].linear
        );
    }

    #[test]
    fn test_force_cap_limits_acceleration() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let mut joint = Joint::Mouse(
            MouseJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(100.0, 0.0),
            )
            .with_max_force(1.0),
        );
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 10);
        // One newton on one kilogram cannot exceed ~1.7 m/s in ten steps.
        assert!(velocities[1].linear.norm() < 2.0);
    }
}
