//! Wheel joint: constrains a body to an axis on another body, with a
//! damped suspension spring along the axis and an optional rotary motor.

use planar_types::{cross, perp, BodyId, Position, Rot, Vec2, Velocity};

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
    ax: Vec2,
    ay: Vec2,
    s_ax: f64,
    s_bx: f64,
    s_ay: f64,
    s_by: f64,
    mass: f64,
    motor_mass: f64,
    spring_mass: f64,
    gamma: f64,
    bias: f64,
}

/// A wheel (suspension) joint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WheelJoint {
    /// Chassis body.
    pub body_a: BodyId,
    /// Wheel body.
    pub body_b: BodyId,
    /// Whether the connected bodies may still collide.
    pub collide_connected: bool,

    /// Anchor in body A's local frame.
    pub local_anchor_a: Vec2,
    /// Anchor in body B's local frame.
    pub local_anchor_b: Vec2,
    /// Suspension axis in body A's local frame, unit length.
    pub local_axis_a: Vec2,

    /// Suspension frequency in Hz; zero locks the axis rigidly.
    pub frequency_hz: f64,
    /// Suspension damping ratio.
    pub damping_ratio: f64,
    /// Whether the wheel motor is active.
    pub enable_motor: bool,
    /// Motor target angular speed, rad/s.
    pub motor_speed: f64,
    /// Motor torque cap, N*m.
    pub max_motor_torque: f64,

    #[cfg_attr(feature = "serde", serde(skip))]
    impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    spring_impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    motor_impulse: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: SolverState,
}

impl WheelJoint {
    /// Create a wheel joint with the given local anchors and axis.
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
            Vec2::new(0.0, 1.0)
        };
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a,
            local_anchor_b,
            local_axis_a,
            frequency_hz: 2.0,
            damping_ratio: 0.7,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            impulse: 0.0,
            spring_impulse: 0.0,
            motor_impulse: 0.0,
            state: SolverState::default(),
        }
    }

    /// Set the suspension response.
    #[must_use]
    pub fn with_suspension(mut self, frequency_hz: f64, damping_ratio: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    /// Enable the wheel motor.
    #[must_use]
    pub fn with_motor(mut self, speed: f64, max_torque: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
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

        let r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        let r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);
        let d = c_b + r_b - c_a - r_a;

        let (m_a, m_b) = (s.inv_mass_a, s.inv_mass_b);
        let (i_a, i_b) = (s.inv_i_a, s.inv_i_b);

        // Point-on-line constraint perpendicular to the axis.
        s.ay = q_a.rotate(perp(self.local_axis_a));
        s.s_ay = cross(d + r_a, s.ay);
        s.s_by = cross(r_b, s.ay);
        s.mass = m_a + m_b + i_a * s.s_ay * s.s_ay + i_b * s.s_by * s.s_by;
        if s.mass > 0.0 {
            s.mass = 1.0 / s.mass;
        }

        // Suspension spring along the axis.
        s.spring_mass = 0.0;
        s.gamma = 0.0;
        s.bias = 0.0;
        if self.frequency_hz > 0.0 {
            s.ax = q_a.rotate(self.local_axis_a);
            s.s_ax = cross(d + r_a, s.ax);
            s.s_bx = cross(r_b, s.ax);

            let inv_mass = m_a + m_b + i_a * s.s_ax * s.s_ax + i_b * s.s_bx * s.s_bx;
            if inv_mass > 0.0 {
                s.spring_mass = 1.0 / inv_mass;

                let c = d.dot(&s.ax);
                let omega = 2.0 * std::f64::consts::PI * self.frequency_hz;
                let damp = 2.0 * s.spring_mass * self.damping_ratio * omega;
                let stiffness = s.spring_mass * omega * omega;

                let h = conf.dt;
                s.gamma = h * (damp + h * stiffness);
                if s.gamma > 0.0 {
                    s.gamma = 1.0 / s.gamma;
                }
                s.bias = c * h * stiffness * s.gamma;

                s.spring_mass = inv_mass + s.gamma;
                if s.spring_mass > 0.0 {
                    s.spring_mass = 1.0 / s.spring_mass;
                }
            }
        } else {
            self.spring_impulse = 0.0;
        }

        // Rotary motor.
        if self.enable_motor {
            s.motor_mass = i_a + i_b;
            if s.motor_mass > 0.0 {
                s.motor_mass = 1.0 / s.motor_mass;
            }
        } else {
            s.motor_mass = 0.0;
            self.motor_impulse = 0.0;
        }

        if conf.warm_starting {
            self.impulse *= conf.dt_ratio;
            self.spring_impulse *= conf.dt_ratio;
            self.motor_impulse *= conf.dt_ratio;

            let p = s.ay * self.impulse + s.ax * self.spring_impulse;
            let l_a = self.impulse * s.s_ay + self.spring_impulse * s.s_ax + self.motor_impulse;
            let l_b = self.impulse * s.s_by + self.spring_impulse * s.s_bx + self.motor_impulse;

            v_a.linear -= p * m_a;
            v_a.angular -= i_a * l_a;
            v_b.linear += p * m_b;
            v_b.angular += i_b * l_b;
        } else {
            self.impulse = 0.0;
            self.spring_impulse = 0.0;
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

        // Suspension spring.
        if self.frequency_hz > 0.0 {
            let cdot = s.ax.dot(&(v_b.linear - v_a.linear)) + s.s_bx * v_b.angular
                - s.s_ax * v_a.angular;
            let impulse = -s.spring_mass * (cdot + s.bias + s.gamma * self.spring_impulse);
            self.spring_impulse += impulse;

            let p = s.ax * impulse;
            v_a.linear -= p * m_a;
            v_a.angular -= i_a * impulse * s.s_ax;
            v_b.linear += p * m_b;
            v_b.angular += i_b * impulse * s.s_bx;
        }

        // Motor.
        if self.enable_motor {
            let cdot = v_b.angular - v_a.angular - self.motor_speed;
            let mut impulse = -s.motor_mass * cdot;

            let old_impulse = self.motor_impulse;
            let max_impulse = conf.dt * self.max_motor_torque;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            v_a.angular -= i_a * impulse;
            v_b.angular += i_b * impulse;
        }

        // Point-on-line.
        {
            let cdot = s.ay.dot(&(v_b.linear - v_a.linear)) + s.s_by * v_b.angular
                - s.s_ay * v_a.angular;
            let impulse = -s.mass * cdot;
            self.impulse += impulse;

            let p = s.ay * impulse;
            v_a.linear -= p * m_a;
            v_a.angular -= i_a * impulse * s.s_ay;
            v_b.linear += p * m_b;
            v_b.angular += i_b * impulse * s.s_by;
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

        let q_a = Rot::new(pos_a.angular);
        let q_b = Rot::new(pos_b.angular);
        let r_a = q_a.rotate(self.local_anchor_a - s.local_center_a);
        let r_b = q_b.rotate(self.local_anchor_b - s.local_center_b);
        let d = pos_b.linear + r_b - pos_a.linear - r_a;

        let ay = q_a.rotate(perp(self.local_axis_a));
        let s_ay = cross(d + r_a, ay);
        let s_by = cross(r_b, ay);

        let c = d.dot(&ay);
        let k = s.inv_mass_a
            + s.inv_mass_b
            + s.inv_i_a * s_ay * s_ay
            + s.inv_i_b * s_by * s_by;
        let impulse = if k != 0.0 { -c / k } else { 0.0 };

        let p = ay * impulse;
        pos_a.linear -= p * s.inv_mass_a;
        pos_a.angular -= s.inv_i_a * impulse * s_ay;
        pos_b.linear += p * s.inv_mass_b;
        pos_b.angular += s.inv_i_b * impulse * s_by;

        positions[s.index_a] = pos_a;
        positions[s.index_b] = pos_b;

        c.abs() <= conf.linear_slop
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::test_support::{rig, run_joint};
    use crate::Joint;

    #[test]
    fn test_wheel_stays_on_axis() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, -1.0));
        let mut joint = Joint::Wheel(WheelJoint::new(
            BodyId::new(0),
            BodyId::new(1),
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
        ));
        velocities[1].linear = Vec2::new(3.0, 0.0);
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 60);
        // The vertical axis forbids horizontal drift of the anchor.
        assert!(positions[1].linear.x.abs() < 0.02, "x = {}", positions[1].linear.x);
    }

    #[test]
    fn test_motor_spins_wheel() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, -1.0));
        let mut joint = Joint::Wheel(
            WheelJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 1.0),
            )
            .with_motor(4.0, 50.0),
        );
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 60);
        assert!((velocities[1].angular - 4.0).abs() < 0.01);
    }

    #[test]
    fn test_suspension_settles() {
        let (metas, mut positions, mut velocities) = rig(Vec2::new(0.0, -1.0));
        let mut joint = Joint::Wheel(
            WheelJoint::new(
                BodyId::new(0),
                BodyId::new(1),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 1.0),
            )
            .with_suspension(3.0, 0.9),
        );
        velocities[1].linear = Vec2::new(0.0, 2.0);
        run_joint(&mut joint, &metas, &mut positions, &mut velocities, 600);
        // The damped spring pulls the wheel back to the anchor height.
        assert!(positions[1].linear.y.abs() < 0.1, "y = {}", positions[1].linear.y);
    }
}
