//! Rigid bodies.

use planar_collision::MassData;
use planar_contact::ContactKey;
use planar_types::{BodyId, ContactId, FixtureId, JointId, Pose2, Position, Sweep, Vec2, Velocity};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The motion class of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BodyType {
    /// Never moves; infinite mass.
    #[default]
    Static,
    /// Moves under its own velocity; infinite mass to the solver.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Construction-time configuration of a body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyConf {
    /// Motion class.
    pub body_type: BodyType,
    /// Initial world position of the body origin.
    pub position: Vec2,
    /// Initial angle in radians.
    pub angle: f64,
    /// Initial linear velocity.
    pub linear_velocity: Vec2,
    /// Initial angular velocity.
    pub angular_velocity: f64,
    /// Linear velocity decay rate, 1/s.
    pub linear_damping: f64,
    /// Angular velocity decay rate, 1/s.
    pub angular_damping: f64,
    /// Whether the body may fall asleep.
    pub allow_sleep: bool,
    /// Whether the body starts awake.
    pub awake: bool,
    /// Whether rotation is locked.
    pub fixed_rotation: bool,
    /// Whether the body opts into continuous collision.
    pub bullet: bool,
    /// Whether the body participates in simulation at all.
    pub enabled: bool,
    /// Multiplier on the world's gravity for this body.
    pub gravity_scale: f64,
}

impl Default for BodyConf {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::new(0.0, 0.0),
            angle: 0.0,
            linear_velocity: Vec2::new(0.0, 0.0),
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            enabled: true,
            gravity_scale: 1.0,
        }
    }
}

impl BodyConf {
    /// A dynamic body at the given position.
    #[must_use]
    pub fn dynamic_at(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position,
            ..Self::default()
        }
    }

    /// A static body at the given position.
    #[must_use]
    pub fn static_at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Set the motion class.
    #[must_use]
    pub fn body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self
    }

    /// Set the initial angle.
    #[must_use]
    pub fn angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    /// Set the initial linear velocity.
    #[must_use]
    pub fn linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    /// Mark the body as a bullet.
    #[must_use]
    pub fn bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    /// Lock the body's rotation.
    #[must_use]
    pub fn fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    /// Allow or forbid sleeping.
    #[must_use]
    pub fn allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    /// Whether the inputs are all finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.x.is_finite()
            && self.position.y.is_finite()
            && self.angle.is_finite()
            && self.linear_velocity.x.is_finite()
            && self.linear_velocity.y.is_finite()
            && self.angular_velocity.is_finite()
            && self.linear_damping.is_finite()
            && self.angular_damping.is_finite()
            && self.gravity_scale.is_finite()
    }
}

/// A rigid body.
///
/// Owned by the world; host code reads and mutates it through the world's
/// accessors, which enforce the locking discipline.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    /// Motion class.
    pub(crate) body_type: BodyType,
    /// Body-origin transform, kept in sync with `sweep.pos1`.
    pub(crate) transform: Pose2,
    /// Motion of the center of mass over the current step.
    pub(crate) sweep: Sweep,
    /// Linear and angular velocity.
    pub(crate) velocity: Velocity,

    /// Accumulated force, cleared after each step.
    pub(crate) force: Vec2,
    /// Accumulated torque, cleared after each step.
    pub(crate) torque: f64,

    pub(crate) mass: f64,
    pub(crate) inv_mass: f64,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f64,
    pub(crate) inv_inertia: f64,

    pub(crate) linear_damping: f64,
    pub(crate) angular_damping: f64,
    pub(crate) gravity_scale: f64,

    pub(crate) awake: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) enabled: bool,
    pub(crate) islanded: bool,
    pub(crate) sleep_time: f64,

    /// Island-local index during a solve.
    pub(crate) island_index: usize,

    /// Fixtures attached to this body, in attachment order.
    pub(crate) fixtures: Vec<FixtureId>,
    /// Contacts this body participates in, in creation order.
    pub(crate) contacts: Vec<(ContactKey, ContactId)>,
    /// Joints attached to this body, paired with the other body.
    pub(crate) joints: Vec<(BodyId, JointId)>,
}

impl Body {
    pub(crate) fn new(conf: &BodyConf) -> Self {
        let position = Position::new(conf.position, conf.angle);
        let (mass, inv_mass) = match conf.body_type {
            BodyType::Dynamic => (1.0, 1.0),
            _ => (0.0, 0.0),
        };
        Self {
            body_type: conf.body_type,
            transform: Pose2::new(conf.position, conf.angle),
            sweep: Sweep::new(Vec2::new(0.0, 0.0), position),
            velocity: Velocity::new(conf.linear_velocity, conf.angular_velocity),
            force: Vec2::new(0.0, 0.0),
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: conf.linear_damping,
            angular_damping: conf.angular_damping,
            gravity_scale: conf.gravity_scale,
            awake: conf.awake && conf.body_type != BodyType::Static,
            allow_sleep: conf.allow_sleep,
            bullet: conf.bullet,
            fixed_rotation: conf.fixed_rotation,
            enabled: conf.enabled,
            islanded: false,
            sleep_time: 0.0,
            island_index: 0,
            fixtures: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
        }
    }

    /// Motion class.
    #[must_use]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Whether the body may move under the solver.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Whether the body can move at all (dynamic or kinematic).
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.body_type != BodyType::Static
    }

    /// Body-origin transform.
    #[must_use]
    pub fn transform(&self) -> &Pose2 {
        &self.transform
    }

    /// World position of the body origin.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.transform.p
    }

    /// Orientation angle (not normalized; accumulates across revolutions).
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.sweep.pos1.angular
    }

    /// World position of the center of mass.
    #[must_use]
    pub fn world_center(&self) -> Vec2 {
        self.sweep.pos1.linear
    }

    /// Linear and angular velocity.
    #[must_use]
    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Mass in kilograms (zero for static and kinematic bodies).
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Whether the body is awake.
    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Whether the body participates in simulation.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the body opted into continuous collision.
    #[must_use]
    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    /// Fixtures attached to this body.
    #[must_use]
    pub fn fixtures(&self) -> &[FixtureId] {
        &self.fixtures
    }

    /// Contacts this body participates in.
    #[must_use]
    pub fn contacts(&self) -> &[(ContactKey, ContactId)] {
        &self.contacts
    }

    /// Joints attached to this body, paired with the other body.
    #[must_use]
    pub fn joints(&self) -> &[(BodyId, JointId)] {
        &self.joints
    }

    /// Wake the body, resetting its sleep timer.
    pub(crate) fn set_awake(&mut self) {
        if self.body_type != BodyType::Static {
            self.awake = true;
            self.sleep_time = 0.0;
        }
    }

    /// Put the body to sleep, zeroing its motion.
    pub(crate) fn set_asleep(&mut self) {
        self.awake = false;
        self.sleep_time = 0.0;
        self.velocity = Velocity::zero();
        self.force = Vec2::new(0.0, 0.0);
        self.torque = 0.0;
    }

    /// Rebuild `transform` from the sweep's end position.
    pub(crate) fn synchronize_transform(&mut self) {
        self.transform = self.sweep.pose_at(1.0);
    }

    /// Advance the sweep start to `alpha` and set the transform there.
    pub(crate) fn advance(&mut self, alpha: f64) {
        self.sweep.advance0(alpha);
        self.sweep.pos1 = self.sweep.pos0;
        self.transform = self.sweep.pose_at(1.0);
    }

    /// Update mass properties from summed fixture mass data.
    ///
    /// Static and kinematic bodies get zero mass; a dynamic body with no
    /// density gets unit mass so it still falls.
    pub(crate) fn set_mass_data(&mut self, data: &MassData) {
        if self.body_type != BodyType::Dynamic {
            self.sweep.local_center = Vec2::new(0.0, 0.0);
            self.sweep.pos0 = Position::new(self.transform.p, self.sweep.pos0.angular);
            self.sweep.pos1 = self.sweep.pos0;
            self.mass = 0.0;
            self.inv_mass = 0.0;
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
            return;
        }

        self.mass = if data.mass > 0.0 { data.mass } else { 1.0 };
        self.inv_mass = 1.0 / self.mass;

        if data.rotational_inertia > 0.0 && !self.fixed_rotation {
            // Shift the origin-relative inertia to the center of mass.
            self.inertia =
                data.rotational_inertia - self.mass * data.center.dot(&data.center);
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        // Move the sweep to the new center of mass, preserving velocity of
        // the center.
        let old_center = self.sweep.pos1.linear;
        self.sweep.local_center = data.center;
        let new_center = self.transform.transform_point(data.center);
        self.sweep.pos0 = Position::new(new_center, self.sweep.pos0.angular);
        self.sweep.pos1 = Position::new(new_center, self.sweep.pos1.angular);
        self.velocity.linear +=
            planar_types::cross_sv(self.velocity.angular, new_center - old_center);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_static_body_has_no_mass() {
        let body = Body::new(&BodyConf::default());
        assert_eq!(body.mass(), 0.0);
        assert_eq!(body.inv_mass, 0.0);
        assert!(!body.is_awake(), "static bodies are never awake");
    }

    #[test]
    fn test_mass_data_shifts_center() {
        let mut body = Body::new(&BodyConf::dynamic_at(Vec2::new(1.0, 0.0)));
        body.set_mass_data(&MassData {
            mass: 2.0,
            center: Vec2::new(0.5, 0.0),
            rotational_inertia: 2.0 * (0.5 + 0.25),
        });
        assert_eq!(body.mass(), 2.0);
        // COM-relative inertia: origin inertia minus m |c|^2.
        assert_relative_eq!(body.inertia, 2.0 * 0.5, epsilon = 1e-12);
        assert_eq!(body.world_center(), Vec2::new(1.5, 0.0));
        // The origin is untouched.
        assert_eq!(body.position(), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_fixed_rotation_zeroes_inertia() {
        let mut body = Body::new(&BodyConf {
            body_type: BodyType::Dynamic,
            fixed_rotation: true,
            ..BodyConf::default()
        });
        body.set_mass_data(&MassData {
            mass: 1.0,
            center: Vec2::new(0.0, 0.0),
            rotational_inertia: 5.0,
        });
        assert_eq!(body.inv_inertia, 0.0);
    }

    #[test]
    fn test_massless_dynamic_body_gets_unit_mass() {
        let mut body = Body::new(&BodyConf::dynamic_at(Vec2::new(0.0, 0.0)));
        body.set_mass_data(&MassData::default());
        assert_eq!(body.mass(), 1.0);
    }

    #[test]
    fn test_sleep_clears_motion() {
        let mut body = Body::new(&BodyConf::dynamic_at(Vec2::new(0.0, 0.0)));
        body.velocity = Velocity::new(Vec2::new(1.0, 0.0), 2.0);
        body.force = Vec2::new(3.0, 0.0);
        body.set_asleep();
        assert!(!body.is_awake());
        assert_eq!(body.velocity(), Velocity::zero());
        assert_eq!(body.force, Vec2::new(0.0, 0.0));
    }
}
