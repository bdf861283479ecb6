//! Pulley joint: holds `lengthA + ratio * lengthB` constant, where the
//! lengths run from fixed ground anchors to body anchors.

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
    u_a: Vec2,
    u_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f64,
}

/// A pulley joint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulleyJoint {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Whether the connected bodies may still collide.
    pub collide_connected: bool,

    /// World-space ground anchor on side A.
    pub ground_anchor_a: Vec2,
    /// World-space ground anchor on side B.
    pub ground_anchor_b: Vec2,
    /// Anchor in body A's local frame.
    pub local_anchor_a: Vec2,
    /// Anchor in body B's local frame.
    pub local_anchor_b: Vec2,
    /// Rest length of side A's rope segment.
    pub length_a: f64,
    /// Rest length of side B's rope segment.
    pub length_b: f64,
    /// Mechanical advantage; side B's length counts `ratio` times.
    pub ratio: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: SolverState,
}

impl PulleyJoint {
    /// Create a pulley joint. `ratio` must be positive.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        ground_anchor_a: Vec2,
        ground_anchor_b: Vec2,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        length_a: f64,
        length_b: f64,
        ratio: f64,
    ) -> Self {
        debug_assert!(ratio > f64::EPSILON);
        Self {
            body_a,
            body_b,
            collide_connected: false,
            ground_anchor_a,
            ground_anchor_b,
            local_anchor_a,
            local_anchor_b,
            length_a,
            length_b,
            ratio,
            impulse: 0.0,
            state: SolverState::default(),
        }
    }

    /// The total rope-length invariant `lengthA + ratio * lengthB`.
    #[must_use]
    pub fn constant(&self) -> f64 {
        self.length_a + self.ratio * self.length_b
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

        s.u_a = c_a + s.r_a - self.ground_anchor_a;
        s.u_b = c_b + s.r_b - self.ground_anchor_b;

        let length_a = s.u_a.norm();
        let length_b = s.u_b.norm();

        // A slack side transmits no impulse.
        if length_a > 10.0 * conf.linear_slop {
            s.u_a /= length_a;
        } else {
            s.u_a = Vec2::new(0.0, 0.0);
        }
        if length_b > 10.0 * conf.linear_slop {
            s.u_b /= length_b;
        } else {
            s.u_b = Vec2::new(0.0, 0.0);
        }

        let ru_a = cross(s.r_a, s.u_a);
        let ru_b = cross(s.r_b, s.u_b);

        let mass_a = s.inv_mass_a + s.inv_i_a * ru_a * ru_a;
        let mass_b = s.inv_mass_b + s.inv_i_b * ru_b * ru_b;
        s.mass = mass_a + self.ratio * self.ratio * mass_b;
        if s.mass > 0.0 {
            s.mass = 1.0 / s.mass;
        }

        if conf.warm_starting {
            self.impulse *= conf.dt_ratio;
            let p_a = s.u_a * -self.impulse;
            let p_b = s.u_b * (-self.ratio * self.impulse);

            v_a.linear += p_a * s.inv_mass_a;
            v_a.angular += s.inv_i_a * cross(s.r_a, p_a);
            v_b.linear += p_b * s.inv_mass_b;
            v_b.angular += s.inv_i_b * cross(s.r_b, p_b);
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

        let cdot = -s.u_a.dot(&vp_a) - self.ratio * s.u_b.dot(&vp_b);
        let impulse = -s.mass * cdot;
        self.impulse += impulse;

        let p_a = s.u_a * -impulse;
        let p_b = s.u_b * (-self.ratio * impulse);
        v_a.linear += p_a * s.inv_mass_a;
        v_a.angular += s.inv_i_a * cross(s.r_a, p_a);
        v_b.linear += p_b * s.inv_mass_b;
        v_b.angular += s.inv_i_b * cross(s.r_b, p_b);

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

        let mut u_a = pos_a.linear + r_a - self.ground_anchor_a;
        let mut u_b = pos_b.linear + r_b - self.ground_anchor_b;

        let length_a = u_a.norm();
        let length_b = u_b.norm();

        if length_a > 10.0 * conf.linear_slop {
            u_a /= length_a;
        } else {
            u_a = Vec2::new(0.0, 0.0);
        }
        if length_b > 10.0 * conf.linear_slop {
            u_b /= length_b;
        } else {
            u_b = Vec2::new(0.0, 0.0);
        }

        let ru_a = cross(r_a, u_a);
        let ru_b = cross(r_b, u_b);

        let mass_a = s.inv_mass_a + s.inv_i_a * ru_a * ru_a;
        let mass_b = s.inv_mass_b + s.inv_i_b * ru_b * ru_b;
        let mut mass = mass_a + self.ratio * self.ratio * mass_b;
        if mass > 0.0 {
            mass = 1.0 / mass;
        }

        let c = self.constant() - length_a - self.ratio * length_b;
        let linear_error = c.abs();

        let impulse = -mass * c;
        let p_a = u_a * -impulse;
        let p_b = u_b * (-self.ratio * impulse);

        pos_a.linear += p_a * s.inv_mass_a;
        pos_a.angular += s.inv_i_a * cross(r_a, p_a);
        pos_b.linear += p_b * s.inv_mass_b;
        pos_b.angular += s.inv_i_b * cross(r_b, p_b);

        positions[s.index_a] = pos_a;
        positions[s.index_b] = pos_b;

        linear_error < conf.linear_slop
    }
}
