//! Rope joint: caps the distance between two local anchors from above.

use planar_types::{cross, cross_sv, BodyId, Position, Rot, Vec2, Velocity};

use crate::{BodyMetaMap, JointStepConf, LimitState};

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
    length: f64,
}

/// A maximum-distance (rope) joint.
///
/// The constraint is one-sided: the rope goes taut at `max_length` and is
/// slack below it. Taut-rope impulses only ever pull the anchors together.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RopeJoint {
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
    /// Maximum anchor distance.
    pub max_length: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    limit_state: LimitState,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: SolverState,
}

impl RopeJoint {
    /// Create a rope joint with the given local anchors and maximum length.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        max_length: f64,
    ) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a,
            local_anchor_b,
            max_length,
            impulse: 0.0,
            limit_state: LimitState::Inactive,
            state: SolverState::default(),
        }
    }

    /// The rope's state after the last solve.
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

        s.r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        s.r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);
        s.u = c_b + s.r_b - c_a - s.r_a;

        s.length = s.u.norm();
        self.limit_state = if s.length - self.max_length > 0.0 {
            LimitState::AtUpper
        } else {
            LimitState::Inactive
        };

        if s.length > conf.linear_slop {
            s.u /= s.length;
        } else {
            s.u = Vec2::new(0.0, 0.0);
            s.mass = 0.0;
            self.impulse = 0.0;
            return;
        }

        let cr_a = cross(s.r_a, s.u);
        let cr_b = cross(s.r_b, s.u);
        let inv_mass =
            s.inv_mass_a + s.inv_i_a * cr_a * cr_a + s.inv_mass_b + s.inv_i_b * cr_b * cr_b;
        s.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

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
        conf: &JointStepConf,
    ) {
        let s = &self.state;
        let mut v_a = velocities[s.index_a];
        let mut v_b = velocities[s.index_b];

        let vp_a = v_a.linear + cross_sv(v_a.angular, s.r_a);
        let vp_b = v_b.linear + cross_sv(v_b.angular, s.r_b);

        let c = s.length - self.max_length;
        let mut cdot = s.u.dot(&(vp_b - vp_a));
        // Predictive: bleed off approach speed before the rope goes taut.
        if c < 0.0 {
            cdot += conf.inv_dt * c;
        }

        let mut impulse = -s.mass * cdot;
        let old_impulse = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        impulse = self.impulse - old_impulse;

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
        let s = &self.state;
        let mut pos_a = positions[s.index_a];
        let mut pos_b = positions[s.index_b];

        let q_a = Rot::new(pos_a.angular);
        let q_b = Rot::new(pos_b.angular);
        let r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        let r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);
        let mut u = pos_b.linear + r_b - pos_a.linear - r_a;

        let length = u.norm();
        if length > f64::EPSILON {
            u /= length;
        }
        let c = (length - self.max_length).clamp(0.0, conf.max_linear_correction);

        let impulse = -s.mass * c;
        let p = u * impulse;

        pos_a.linear -= p * s.inv_mass_a;
        pos_a.angular -= s.inv_i_a * cross(r_a, p);
        pos_b.linear += p * s.inv_mass_b;
        pos_b.angular += s.inv_i_b * cross(r_b, p);

        positions[s.index_a] = pos_a;
        positions[s.index_b] = pos_b;

        length - self.max_length < conf.linear_slop
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::test_support::{rig, run_joint};
    use crate::Joint;

    #[test]
    fn test_rope_is_slack_inside_length() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(1.0, 0.0));
        let mut joint = Joint::Rope(RopeJoint::new(
            BodyId::new(0),
            BodyId::new(1),
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0),
            3.0,
        ));
        velocities[1].linear = Vec2::new(0.5, 0.0);
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 10);
        // Well inside the rope length nothing restrains the motion.
        assert!(velocities[1].linear.x > 0.4);
    }

    #[test]
    fn test_rope_goes_taut() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(1.0, 0.0));
        let mut joint = Joint::Rope(RopeJoint::new(
            BodyId::new(0),
            BodyId::new(1),
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0),
            2.0,
        ));
        velocities[1].linear = Vec2::new(5.0, 0.0);
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 120);
        let conf = JointStepConf::default();
        assert!(
            positions[1].linear.norm() <= 2.0 + 2.0 * conf.linear_slop,
            "rope length {} exceeded the cap",
            positions[1].linear.norm()
        );
    }
}
