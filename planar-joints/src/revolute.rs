//! Revolute joint: two bodies share a point and rotate freely about it,
//! optionally within an angle limit and driven by a motor.

use planar_types::{
    cross, cross_sv, solve22, solve33, solve33_22, BodyId, Mat22, Mat33, Position, Rot, Vec2,
    Vec3, Velocity,
};

use crate::{BodyMetaMap, JointStepConf, LimitState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A revolute (hinge) joint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RevoluteJoint {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Whether the connected bodies may still collide.
    pub collide_connected: bool,

    /// Hinge point in body A's local frame.
    pub local_anchor_a: Vec2,
    /// Hinge point in body B's local frame.
    pub local_anchor_b: Vec2,
    /// `angleB - angleA` at rig time; the joint angle is measured from it.
    pub reference_angle: f64,

    /// Whether the angle limit is active.
    pub enable_limit: bool,
    /// Lower joint angle, radians.
    pub lower_angle: f64,
    /// Upper joint angle, radians.
    pub upper_angle: f64,
    /// Whether the motor is active.
    pub enable_motor: bool,
    /// Motor target angular speed, rad/s.
    pub motor_speed: f64,
    /// Motor torque cap, N*m.
    pub max_motor_torque: f64,

    // Solver state.
    #[cfg_attr(feature = "serde", serde(skip))]
    impulse: Vec3,
    #[cfg_attr(feature = "serde", serde(skip))]
    motor_impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip, default = "LimitState::default"))]
    limit_state: LimitState,
    #[cfg_attr(feature = "serde", serde(skip))]
    index_a: usize,
    #[cfg_attr(feature = "serde", serde(skip))]
    index_b: usize,
    #[cfg_attr(feature = "serde", serde(skip))]
    r_a: Vec2,
    #[cfg_attr(feature = "serde", serde(skip))]
    r_b: Vec2,
    #[cfg_attr(feature = "serde", serde(skip))]
    local_center_a: Vec2,
    #[cfg_attr(feature = "serde", serde(skip))]
    local_center_b: Vec2,
    #[cfg_attr(feature = "serde", serde(skip))]
    inv_mass_a: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    inv_mass_b: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    inv_i_a: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    inv_i_b: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    mass: Mat33,
    #[cfg_attr(feature = "serde", serde(skip))]
    motor_mass: f64,
}

impl RevoluteJoint {
    /// Create a revolute joint with the given local anchors.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a,
            local_anchor_b,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            impulse: Vec3::zeros(),
            motor_impulse: 0.0,
            limit_state: LimitState::Inactive,
            index_a: 0,
            index_b: 0,
            r_a: Vec2::new(0.0, 0.0),
            r_b: Vec2::new(0.0, 0.0),
            local_center_a: Vec2::new(0.0, 0.0),
            local_center_b: Vec2::new(0.0, 0.0),
            inv_mass_a: 0.0,
            inv_mass_b: 0.0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            mass: Mat33::zeros(),
            motor_mass: 0.0,
        }
    }

    /// Enable the angle limit.
    #[must_use]
    pub fn with_limit(mut self, lower: f64, upper: f64) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    /// Enable the motor.
    #[must_use]
    pub fn with_motor(mut self, speed: f64, max_torque: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    /// The joint angle `angleB - angleA - reference`, given body angles.
    #[must_use]
    pub fn joint_angle(&self, angle_a: f64, angle_b: f64) -> f64 {
        angle_b - angle_a - self.reference_angle
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
        self.index_a = meta_a.index;
        self.index_b = meta_b.index;
        self.local_center_a = meta_a.local_center;
        self.local_center_b = meta_b.local_center;
        self.inv_mass_a = meta_a.inv_mass;
        self.inv_mass_b = meta_b.inv_mass;
        self.inv_i_a = meta_a.inv_inertia;
        self.inv_i_b = meta_b.inv_inertia;

        let a_a = positions[self.index_a].angular;
        let a_b = positions[self.index_b].angular;
        let mut v_a = velocities[self.index_a];
        let mut v_b = velocities[self.index_b];

        let q_a = Rot::new(a_a);
        let q_b = Rot::new(a_b);

        self.r_a = q_a.rotate(self.local_anchor_a - self.local_center_a);
        self.r_b = q_b.rotate(self.local_anchor_b - self.local_center_b);

        let (m_a, m_b) = (self.inv_mass_a, self.inv_mass_b);
        let (i_a, i_b) = (self.inv_i_a, self.inv_i_b);
        let fixed_rotation = i_a + i_b == 0.0;

        let k11 = m_a + m_b + i_a * self.r_a.y * self.r_a.y + i_b * self.r_b.y * self.r_b.y;
        let k12 = -i_a * self.r_a.y * self.r_a.x - i_b * self.r_b.y * self.r_b.x;
        let k13 = -i_a * self.r_a.y - i_b * self.r_b.y;
        let k22 = m_a + m_b + i_a * self.r_a.x * self.r_a.x + i_b * self.r_b.x * self.r_b.x;
        let k23 = i_a * self.r_a.x + i_b * self.r_b.x;
        let k33 = i_a + i_b;
        self.mass = Mat33::new(k11, k12, k13, k12, k22, k23, k13, k23, k33);

        self.motor_mass = if k33 > 0.0 { 1.0 / k33 } else { 0.0 };

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = self.joint_angle(a_a, a_b);
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * conf.angular_slop {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if conf.warm_starting {
            self.impulse *= conf.dt_ratio;
            self.motor_impulse *= conf.dt_ratio;

            let p = Vec2::new(self.impulse.x, self.impulse.y);
            v_a.linear -= p * m_a;
            v_a.angular -= i_a * (cross(self.r_a, p) + self.motor_impulse + self.impulse.z);
            v_b.linear += p * m_b;
            v_b.angular += i_b * (cross(self.r_b, p) + self.motor_impulse + self.impulse.z);
        } else {
            self.impulse = Vec3::zeros();
            self.motor_impulse = 0.0;
        }

        velocities[self.index_a] = v_a;
        velocities[self.index_b] = v_b;
    }

    pub(crate) fn solve_velocity_constraints(
        &mut self,
        velocities: &mut [Velocity],
        conf: &JointStepConf,
    ) {
        let mut v_a = velocities[self.index_a];
        let mut v_b = velocities[self.index_b];
        let (m_a, m_b) = (self.inv_mass_a, self.inv_mass_b);
        let (i_a, i_b) = (self.inv_i_a, self.inv_i_b);
        let fixed_rotation = i_a + i_b == 0.0;

        // Motor.
        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let cdot = v_b.angular - v_a.angular - self.motor_speed;
            let impulse = -self.motor_mass * cdot;
            let old_impulse = self.motor_impulse;
            let max_impulse = conf.dt * self.max_motor_torque;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            v_a.angular -= i_a * impulse;
            v_b.angular += i_b * impulse;
        }

        // Limit plus point-to-point, solved as a block.
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let cdot1 = v_b.linear + cross_sv(v_b.angular, self.r_b)
                - v_a.linear
                - cross_sv(v_a.angular, self.r_a);
            let cdot2 = v_b.angular - v_a.angular;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);
            let mut impulse = -solve33(&self.mass, cdot);

            match self.limit_state {
                LimitState::Equal => {
                    self.impulse += impulse;
                }
                LimitState::AtLower => {
                    let new_impulse = self.impulse.z + impulse.z;
                    if new_impulse < 0.0 {
                        let rhs = -cdot1
                            + Vec2::new(self.mass[(0, 2)], self.mass[(1, 2)]) * self.impulse.z;
                        let reduced = solve33_22(&self.mass, rhs);
                        impulse.x = reduced.x;
                        impulse.y = reduced.y;
                        impulse.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::AtUpper => {
                    let new_impulse = self.impulse.z + impulse.z;
                    if new_impulse > 0.0 {
                        let rhs = -cdot1
                            + Vec2::new(self.mass[(0, 2)], self.mass[(1, 2)]) * self.impulse.z;
                        let reduced = solve33_22(&self.mass, rhs);
                        impulse.x = reduced.x;
                        impulse.y = reduced.y;
                        impulse.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::Inactive => unreachable!(),
            }

            let p = Vec2::new(impulse.x, impulse.y);
            v_a.linear -= p * m_a;
            v_a.angular -= i_a * (cross(self.r_a, p) + impulse.z);
            v_b.linear += p * m_b;
            v_b.angular += i_b * (cross(self.r_b, p) + impulse.z);
        } else {
            // Point-to-point only.
            let cdot = v_b.linear + cross_sv(v_b.angular, self.r_b)
                - v_a.linear
                - cross_sv(v_a.angular, self.r_a);
            let impulse = solve33_22(&self.mass, -cdot);

            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;

            v_a.linear -= impulse * m_a;
            v_a.angular -= i_a * cross(self.r_a, impulse);
            v_b.linear += impulse * m_b;
            v_b.angular += i_b * cross(self.r_b, impulse);
        }

        velocities[self.index_a] = v_a;
        velocities[self.index_b] = v_b;
    }

    pub(crate) fn solve_position_constraints(
        &mut self,
        positions: &mut [Position],
        conf: &JointStepConf,
    ) -> bool {
        let mut pos_a = positions[self.index_a];
        let mut pos_b = positions[self.index_b];
        let (m_a, m_b) = (self.inv_mass_a, self.inv_mass_b);
        let (i_a, i_b) = (self.inv_i_a, self.inv_i_b);
        let fixed_rotation = i_a + i_b == 0.0;

        let mut angular_error = 0.0;

        // Angle limit correction.
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = self.joint_angle(pos_a.angular, pos_b.angular);
            let mut limit_impulse = 0.0;

            match self.limit_state {
                LimitState::Equal => {
                    let c = (angle - self.lower_angle)
                        .clamp(-conf.max_angular_correction, conf.max_angular_correction);
                    limit_impulse = -self.motor_mass * c;
                    angular_error = c.abs();
                }
                LimitState::AtLower => {
                    let mut c = angle - self.lower_angle;
                    angular_error = -c;
                    c = (c + conf.angular_slop).clamp(-conf.max_angular_correction, 0.0);
                    limit_impulse = -self.motor_mass * c;
                }
                LimitState::AtUpper => {
                    let mut c = angle - self.upper_angle;
                    angular_error = c;
                    c = (c - conf.angular_slop).clamp(0.0, conf.max_angular_correction);
                    limit_impulse = -self.motor_mass * c;
                }
                LimitState::Inactive => {}
            }

            pos_a.angular -= i_a * limit_impulse;
            pos_b.angular += i_b * limit_impulse;
        }

        // Point-to-point correction.
        let q_a = Rot::new(pos_a.angular);
        let q_b = Rot::new(pos_b.angular);
        let r_a = q_a.rotate(self.local_anchor_a - self.local_center_a);
        let r_b = q_b.rotate(self.local_anchor_b - self.local_center_b);

        let c = pos_b.linear + r_b - pos_a.linear - r_a;
        let position_error = c.norm();

        let k = Mat22::new(
            m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
            -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
        );
        let impulse = -solve22(&k, c);

        pos_a.linear -= impulse * m_a;
        pos_a.angular -= i_a * cross(r_a, impulse);
        pos_b.linear += impulse * m_b;
        pos_b.angular += i_b * cross(r_b, impulse);

        positions[self.index_a] = pos_a;
        positions[self.index_b] = pos_b;

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
    fn test_pendulum_holds_anchor() {
        // Body 1 hangs from the static body at the origin via its local
        // point (-1, 0); after settling, that point stays at the origin.
        let (metas, mut positions, mut velocities) = rig(Vec2::new(1.0, 0.0));
        let mut joint = Joint::Revolute(RevoluteJoint::new(
            BodyId::new(0),
            BodyId::new(1),
            Vec2::new(0.0, 0.0),
            Vec2::new(-1.0, 0.0),
        ));

        // Push the body off-constraint and let the joint pull it back.
        velocities[1].linear = Vec2::new(0.0, 3.0);
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 60);

        let q = Rot::new(positions[1].angular);
        let anchor_world = positions[1].linear + q.rotate(Vec2::new(-1.0, 0.0));
        assert_relative_eq!(anchor_world.x, 0.0, epsilon = 0.01);
        assert_relative_eq!(anchor_world.y, 0.0, epsilon = 0.01);
    }

    #[test]
    fn test_motor_spins_body() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let mut joint = Joint::Revolute(
            RevoluteJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
            )
            .with_motor(2.0, 100.0),
        );
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 30);
        assert_relative_eq!(velocities[1].angular, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_limit_clamps_angle() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, 0.0));
        let lower = -0.25;
        let upper = 0.25;
        let mut joint = Joint::Revolute(
            RevoluteJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
            )
            .with_limit(lower, upper)
            .with_motor(5.0, 1000.0),
        );
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 120);
        let conf = JointStepConf::default();
        assert!(
            positions[1].angular <= upper + conf.angular_slop,
            "angle {} exceeded the upper limit",
            positions[1].angular
        );
    }
}
