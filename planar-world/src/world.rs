//! The `World` type: entity lifecycle, accessors, and queries.
//!
//! The step pipeline itself lives in the `step` module; this file owns the
//! pools, the locking discipline, and everything callable between steps.

use std::cell::Cell;
use std::rc::Rc;

use planar_collision::{Aabb, DynamicTree, Manifold, ProxyId, RayCastInput, Shape, TreeLeaf};
use planar_contact::{mix_friction, mix_restitution, Contact, ContactKey, Contactable};
use planar_joints::Joint;
use planar_types::{
    BodyId, ContactId, EntityKind, FixtureId, JointId, PhysicsError, Position, Result, ShapeId,
    Vec2, Velocity, WorldConf,
};

use crate::body::{Body, BodyConf, BodyType};
use crate::events::{
    ContactEventBuffer, ContactFilter, ContactImpulses, ContactListener, FixtureListener,
    JointListener, Listeners, PostSolveListener, PreSolveListener, ShapeListener,
};
use crate::fixture::{Fixture, FixtureConf};
use crate::island::Island;
use crate::pool::ObjectPool;

/// Fat-AABB padding used for proxies created or refit outside a step, where
/// no `StepConf` is in scope. Steps use their own configured extension.
pub(crate) const CREATION_AABB_EXTENSION: f64 = 0.1;

/// Clears the world's locked flag when dropped, on every exit path.
pub(crate) struct LockGuard {
    flag: Rc<Cell<bool>>,
}

impl LockGuard {
    pub(crate) fn acquire(flag: &Rc<Cell<bool>>) -> Self {
        flag.set(true);
        Self {
            flag: Rc::clone(flag),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// A 2-D physics world.
///
/// See the [crate documentation](crate) for the stepping pipeline and an
/// end-to-end example.
pub struct World {
    pub(crate) conf: WorldConf,
    pub(crate) tree: DynamicTree,

    pub(crate) bodies: ObjectPool<Body>,
    pub(crate) shapes: ObjectPool<Shape>,
    pub(crate) fixtures: ObjectPool<Fixture>,
    pub(crate) joints: ObjectPool<Joint>,
    pub(crate) contacts: ObjectPool<Contact>,

    /// Bodies in creation order; the deterministic island seed order.
    pub(crate) body_list: Vec<BodyId>,
    /// Joints in creation order.
    pub(crate) joint_list: Vec<JointId>,
    /// Contacts in creation order; the deterministic event/solve order.
    pub(crate) contact_list: Vec<ContactId>,

    /// Islanded flags for joints, indexed by raw joint id. Bodies and
    /// contacts carry their own flags.
    pub(crate) joint_islanded: Vec<bool>,

    /// Proxies whose fat AABB moved since the last new-contact search.
    pub(crate) moved_proxies: Vec<ProxyId>,

    pub(crate) locked: Rc<Cell<bool>>,
    pub(crate) step_complete: bool,
    pub(crate) sub_stepping: bool,
    pub(crate) needs_contact_filtering: bool,
    pub(crate) inv_dt0: f64,

    pub(crate) listeners: Listeners,
    pub(crate) events: ContactEventBuffer,

    // Per-step scratch, reused across steps.
    pub(crate) island: Island,
    pub(crate) positions: Vec<Position>,
    pub(crate) velocities: Vec<Velocity>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("bodies", &self.bodies.len())
            .field("joints", &self.joints.len())
            .field("contacts", &self.contacts.len())
            .field("locked", &self.is_locked())
            .field("step_complete", &self.step_complete)
            .finish_non_exhaustive()
    }
}

impl World {
    /// Create a world with the given configuration.
    pub fn new(conf: WorldConf) -> Result<Self> {
        conf.validate()?;
        let tree = DynamicTree::new(conf.initial_tree_capacity);
        Ok(Self {
            conf,
            tree,
            bodies: ObjectPool::new(),
            shapes: ObjectPool::new(),
            fixtures: ObjectPool::new(),
            joints: ObjectPool::new(),
            contacts: ObjectPool::new(),
            body_list: Vec::new(),
            joint_list: Vec::new(),
            contact_list: Vec::new(),
            joint_islanded: Vec::new(),
            moved_proxies: Vec::new(),
            locked: Rc::new(Cell::new(false)),
            step_complete: true,
            sub_stepping: false,
            needs_contact_filtering: false,
            inv_dt0: 0.0,
            listeners: Listeners::default(),
            events: ContactEventBuffer::default(),
            island: Island::default(),
            positions: Vec::new(),
            velocities: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // State queries
    // ------------------------------------------------------------------

    /// Whether the world is mid-step and rejecting mutation.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// Whether the previous step ran out of TOI sub-steps.
    #[must_use]
    pub fn is_step_complete(&self) -> bool {
        self.step_complete
    }

    /// Whether single-sub-step continuous mode is on.
    #[must_use]
    pub fn sub_stepping(&self) -> bool {
        self.sub_stepping
    }

    /// Enable or disable single-sub-step continuous mode.
    ///
    /// Fails with `WrongState` while locked or while a step is incomplete.
    pub fn set_sub_stepping(&mut self, flag: bool) -> Result<()> {
        self.check_unlocked("set_sub_stepping")?;
        if !self.step_complete {
            return Err(PhysicsError::wrong_state("set_sub_stepping"));
        }
        self.sub_stepping = flag;
        Ok(())
    }

    /// The inverse delta time of the previous step, zero before the first.
    #[must_use]
    pub fn inv_delta_time(&self) -> f64 {
        self.inv_dt0
    }

    /// The world construction configuration.
    #[must_use]
    pub fn conf(&self) -> &WorldConf {
        &self.conf
    }

    /// Bodies in creation order.
    #[must_use]
    pub fn body_ids(&self) -> &[BodyId] {
        &self.body_list
    }

    /// Joints in creation order.
    #[must_use]
    pub fn joint_ids(&self) -> &[JointId] {
        &self.joint_list
    }

    /// Contacts in storage order.
    #[must_use]
    pub fn contact_ids(&self) -> &[ContactId] {
        &self.contact_list
    }

    pub(crate) fn check_unlocked(&self, operation: &'static str) -> Result<()> {
        if self.is_locked() {
            return Err(PhysicsError::wrong_state(operation));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register the begin-contact listener.
    pub fn set_begin_contact_listener(&mut self, listener: ContactListener) {
        self.listeners.begin_contact = Some(listener);
    }

    /// Register the end-contact listener.
    pub fn set_end_contact_listener(&mut self, listener: ContactListener) {
        self.listeners.end_contact = Some(listener);
    }

    /// Register the pre-solve listener.
    pub fn set_pre_solve_listener(&mut self, listener: PreSolveListener) {
        self.listeners.pre_solve = Some(listener);
    }

    /// Register the post-solve listener.
    pub fn set_post_solve_listener(&mut self, listener: PostSolveListener) {
        self.listeners.post_solve = Some(listener);
    }

    /// Register the joint destruction listener.
    pub fn set_joint_destruction_listener(&mut self, listener: JointListener) {
        self.listeners.joint_destruction = Some(listener);
    }

    /// Register the shape destruction listener.
    pub fn set_shape_destruction_listener(&mut self, listener: ShapeListener) {
        self.listeners.shape_destruction = Some(listener);
    }

    /// Register the fixture detach listener.
    pub fn set_fixture_destruction_listener(&mut self, listener: FixtureListener) {
        self.listeners.fixture_destruction = Some(listener);
    }

    /// Register the contact pre-filter.
    pub fn set_contact_filter(&mut self, filter: ContactFilter) {
        self.listeners.contact_filter = Some(filter);
    }

    // ------------------------------------------------------------------
    // Infallible internal accessors (world-owned ids only)
    // ------------------------------------------------------------------

    pub(crate) fn body_ref(&self, id: BodyId) -> &Body {
        match self.bodies.get(id.raw()) {
            Some(body) => body,
            None => unreachable!("stale internal body id {id}"),
        }
    }

    pub(crate) fn body_mut_ref(&mut self, id: BodyId) -> &mut Body {
        match self.bodies.get_mut(id.raw()) {
            Some(body) => body,
            None => unreachable!("stale internal body id {id}"),
        }
    }

    pub(crate) fn fixture_ref(&self, id: FixtureId) -> &Fixture {
        match self.fixtures.get(id.raw()) {
            Some(fixture) => fixture,
            None => unreachable!("stale internal fixture id {id}"),
        }
    }

    pub(crate) fn shape_ref(&self, id: ShapeId) -> &Shape {
        match self.shapes.get(id.raw()) {
            Some(shape) => shape,
            None => unreachable!("stale internal shape id {id}"),
        }
    }

    pub(crate) fn contact_ref(&self, id: ContactId) -> &Contact {
        match self.contacts.get(id.raw()) {
            Some(contact) => contact,
            None => unreachable!("stale internal contact id {id}"),
        }
    }

    pub(crate) fn contact_mut_ref(&mut self, id: ContactId) -> &mut Contact {
        match self.contacts.get_mut(id.raw()) {
            Some(contact) => contact,
            None => unreachable!("stale internal contact id {id}"),
        }
    }

    pub(crate) fn joint_ref(&self, id: JointId) -> &Joint {
        match self.joints.get(id.raw()) {
            Some(joint) => joint,
            None => unreachable!("stale internal joint id {id}"),
        }
    }

    pub(crate) fn joint_mut_ref(&mut self, id: JointId) -> &mut Joint {
        match self.joints.get_mut(id.raw()) {
            Some(joint) => joint,
            None => unreachable!("stale internal joint id {id}"),
        }
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// Create a body.
    pub fn create_body(&mut self, conf: BodyConf) -> Result<BodyId> {
        self.check_unlocked("create_body")?;
        if !conf.is_finite() {
            return Err(PhysicsError::invalid_argument(
                "body configuration contains non-finite values",
            ));
        }
        if self.bodies.len() as u32 >= crate::MAX_BODIES {
            return Err(PhysicsError::length_error(EntityKind::Body));
        }
        let id = BodyId::new(self.bodies.allocate(Body::new(&conf)));
        self.body_list.push(id);
        Ok(id)
    }

    /// Read a body.
    pub fn body(&self, id: BodyId) -> Result<&Body> {
        self.bodies
            .get(id.raw())
            .ok_or(PhysicsError::out_of_range(EntityKind::Body, id.raw()))
    }

    /// Whether a body handle refers to a destroyed or never-created body.
    #[must_use]
    pub fn is_body_destroyed(&self, id: BodyId) -> bool {
        self.bodies.is_free(id.raw())
    }

    /// Destroy a body, its fixtures, and its joints.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<()> {
        self.check_unlocked("destroy_body")?;
        self.body(id)?;

        // Joints first; each destruction fires the joint listener.
        let joint_ids: Vec<JointId> = self.body_ref(id).joints.iter().map(|&(_, j)| j).collect();
        for joint in joint_ids {
            if !self.joints.is_free(joint.raw()) {
                self.destroy_joint(joint)?;
            }
        }

        // Contacts go with the fixtures.
        let fixture_ids = self.body_ref(id).fixtures.clone();
        for fixture in fixture_ids {
            self.destroy_fixture_internal(fixture, false);
        }

        self.body_list.retain(|&b| b != id);
        self.bodies.free(id.raw());
        Ok(())
    }

    /// Set a body's transform; its fixtures are refit immediately and new
    /// contact pairs are found on the next step.
    pub fn set_transform(&mut self, id: BodyId, position: Vec2, angle: f64) -> Result<()> {
        self.check_unlocked("set_transform")?;
        self.body(id)?;
        if !(position.x.is_finite() && position.y.is_finite() && angle.is_finite()) {
            return Err(PhysicsError::invalid_argument("non-finite transform"));
        }
        let body = self.body_mut_ref(id);
        body.transform = planar_types::Pose2::new(position, angle);
        let center = body.transform.transform_point(body.sweep.local_center);
        body.sweep.pos0 = Position::new(center, angle);
        body.sweep.pos1 = body.sweep.pos0;
        self.synchronize_fixtures_of(id, CREATION_AABB_EXTENSION, 0.0);
        Ok(())
    }

    /// Set a body's velocity, waking it when the velocity is non-zero.
    pub fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> Result<()> {
        self.check_unlocked("set_velocity")?;
        self.body(id)?;
        if !velocity.is_finite() {
            return Err(PhysicsError::invalid_argument("non-finite velocity"));
        }
        let body = self.body_mut_ref(id);
        if body.body_type == BodyType::Static {
            return Ok(());
        }
        if velocity != Velocity::zero() {
            body.set_awake();
        }
        body.velocity = velocity;
        Ok(())
    }

    /// Accumulate a force at the center of mass, waking the body.
    pub fn apply_force(&mut self, id: BodyId, force: Vec2) -> Result<()> {
        self.check_unlocked("apply_force")?;
        self.body(id)?;
        let body = self.body_mut_ref(id);
        if body.is_dynamic() {
            body.set_awake();
            body.force += force;
        }
        Ok(())
    }

    /// Accumulate a torque, waking the body.
    pub fn apply_torque(&mut self, id: BodyId, torque: f64) -> Result<()> {
        self.check_unlocked("apply_torque")?;
        self.body(id)?;
        let body = self.body_mut_ref(id);
        if body.is_dynamic() {
            body.set_awake();
            body.torque += torque;
        }
        Ok(())
    }

    /// Apply a linear impulse at a world point, waking the body.
    pub fn apply_linear_impulse(&mut self, id: BodyId, impulse: Vec2, point: Vec2) -> Result<()> {
        self.check_unlocked("apply_linear_impulse")?;
        self.body(id)?;
        let body = self.body_mut_ref(id);
        if body.is_dynamic() {
            body.set_awake();
            body.velocity.linear += impulse * body.inv_mass;
            body.velocity.angular +=
                body.inv_inertia * planar_types::cross(point - body.sweep.pos1.linear, impulse);
        }
        Ok(())
    }

    /// Wake or sleep a body explicitly.
    pub fn set_awake(&mut self, id: BodyId, awake: bool) -> Result<()> {
        self.check_unlocked("set_awake")?;
        self.body(id)?;
        let body = self.body_mut_ref(id);
        if awake {
            body.set_awake();
        } else {
            body.set_asleep();
        }
        Ok(())
    }

    /// Set the bullet (continuous collision) flag.
    pub fn set_bullet(&mut self, id: BodyId, bullet: bool) -> Result<()> {
        self.check_unlocked("set_bullet")?;
        self.body(id)?;
        self.body_mut_ref(id).bullet = bullet;
        Ok(())
    }

    /// Enable or disable a body. Disabling removes its proxies and contacts.
    pub fn set_enabled(&mut self, id: BodyId, enabled: bool) -> Result<()> {
        self.check_unlocked("set_enabled")?;
        self.body(id)?;
        if self.body_ref(id).enabled == enabled {
            return Ok(());
        }
        self.body_mut_ref(id).enabled = enabled;

        let fixtures = self.body_ref(id).fixtures.clone();
        if enabled {
            for fixture in fixtures {
                self.create_proxies_for(fixture);
            }
        } else {
            for fixture in fixtures {
                self.destroy_proxies_for(fixture);
            }
            let contact_ids: Vec<ContactId> =
                self.body_ref(id).contacts.iter().map(|&(_, c)| c).collect();
            for contact in contact_ids {
                self.destroy_contact(contact, true);
            }
        }
        Ok(())
    }

    /// Lock or unlock a body's rotation; locking zeroes angular velocity.
    pub fn set_fixed_rotation(&mut self, id: BodyId, fixed: bool) -> Result<()> {
        self.check_unlocked("set_fixed_rotation")?;
        self.body(id)?;
        let body = self.body_mut_ref(id);
        if body.fixed_rotation == fixed {
            return Ok(());
        }
        body.fixed_rotation = fixed;
        body.velocity.angular = 0.0;
        self.reset_mass_data(id)
    }

    /// Set the per-body gravity multiplier.
    pub fn set_gravity_scale(&mut self, id: BodyId, scale: f64) -> Result<()> {
        self.check_unlocked("set_gravity_scale")?;
        self.body(id)?;
        if !scale.is_finite() {
            return Err(PhysicsError::invalid_argument("non-finite gravity scale"));
        }
        self.body_mut_ref(id).gravity_scale = scale;
        Ok(())
    }

    /// Recompute a body's mass data from its fixtures.
    pub fn reset_mass_data(&mut self, id: BodyId) -> Result<()> {
        self.check_unlocked("reset_mass_data")?;
        self.body(id)?;
        let mut total = planar_collision::MassData::default();
        for &fixture_id in &self.body_ref(id).fixtures.clone() {
            let fixture = self.fixture_ref(fixture_id);
            if fixture.density == 0.0 {
                continue;
            }
            let data = self.shape_ref(fixture.shape).compute_mass(fixture.density);
            let combined_mass = total.mass + data.mass;
            if combined_mass > 0.0 {
                total.center = (total.center * total.mass + data.center * data.mass)
                    / combined_mass;
            }
            total.mass = combined_mass;
            total.rotational_inertia += data.rotational_inertia;
        }
        self.body_mut_ref(id).set_mass_data(&total);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shapes
    // ------------------------------------------------------------------

    /// Register a shape with the world.
    ///
    /// The shape's vertex radius must lie inside the world's configured
    /// interval.
    pub fn create_shape(&mut self, shape: Shape) -> Result<ShapeId> {
        self.check_unlocked("create_shape")?;
        let radius = shape.vertex_radius();
        if !radius.is_finite()
            || radius < self.conf.min_vertex_radius
            || radius > self.conf.max_vertex_radius
        {
            return Err(PhysicsError::invalid_argument(
                "shape vertex radius outside the world's interval",
            ));
        }
        if self.shapes.len() as u32 >= crate::MAX_SHAPES {
            return Err(PhysicsError::length_error(EntityKind::Shape));
        }
        Ok(ShapeId::new(self.shapes.allocate(shape)))
    }

    /// Read a shape.
    pub fn shape(&self, id: ShapeId) -> Result<&Shape> {
        self.shapes
            .get(id.raw())
            .ok_or(PhysicsError::out_of_range(EntityKind::Shape, id.raw()))
    }

    /// Whether a shape handle refers to a destroyed or never-created shape.
    #[must_use]
    pub fn is_shape_destroyed(&self, id: ShapeId) -> bool {
        self.shapes.is_free(id.raw())
    }

    /// Destroy a shape, detaching (and destroying) any fixtures using it.
    /// Fires the shape destruction listener.
    pub fn destroy_shape(&mut self, id: ShapeId) -> Result<()> {
        self.check_unlocked("destroy_shape")?;
        self.shape(id)?;

        let users: Vec<FixtureId> = (0..self.fixtures.range())
            .map(FixtureId::new)
            .filter(|&f| {
                self.fixtures
                    .get(f.raw())
                    .is_some_and(|fixture| fixture.shape == id)
            })
            .collect();
        for fixture in users {
            self.destroy_fixture_internal(fixture, true);
        }

        self.shapes.free(id.raw());
        if let Some(mut listener) = self.listeners.shape_destruction.take() {
            listener(id);
            self.listeners.shape_destruction = Some(listener);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    /// Attach a shape instance to a body.
    pub fn create_fixture(&mut self, conf: FixtureConf) -> Result<FixtureId> {
        self.check_unlocked("create_fixture")?;
        self.body(conf.body)?;
        self.shape(conf.shape)?;
        if !conf.is_valid() {
            return Err(PhysicsError::invalid_argument(
                "fixture material values are not finite and non-negative",
            ));
        }
        if self.fixtures.len() as u32 >= crate::MAX_FIXTURES {
            return Err(PhysicsError::length_error(EntityKind::Fixture));
        }

        let id = FixtureId::new(self.fixtures.allocate(Fixture::new(&conf)));
        self.body_mut_ref(conf.body).fixtures.push(id);
        if self.body_ref(conf.body).enabled {
            self.create_proxies_for(id);
        }
        if conf.density > 0.0 {
            self.reset_mass_data(conf.body)?;
        }
        Ok(id)
    }

    /// Read a fixture.
    pub fn fixture(&self, id: FixtureId) -> Result<&Fixture> {
        self.fixtures
            .get(id.raw())
            .ok_or(PhysicsError::out_of_range(EntityKind::Fixture, id.raw()))
    }

    /// Whether a fixture handle refers to a destroyed fixture.
    #[must_use]
    pub fn is_fixture_destroyed(&self, id: FixtureId) -> bool {
        self.fixtures.is_free(id.raw())
    }

    /// Destroy a fixture, its proxies, and its contacts.
    pub fn destroy_fixture(&mut self, id: FixtureId) -> Result<()> {
        self.check_unlocked("destroy_fixture")?;
        self.fixture(id)?;
        let body = self.fixture_ref(id).body;
        self.destroy_fixture_internal(id, true);
        self.reset_mass_data(body)
    }

    pub(crate) fn destroy_fixture_internal(&mut self, id: FixtureId, fire_listener: bool) {
        let body = self.fixture_ref(id).body;

        // Contacts referencing this fixture die with it.
        let contact_ids: Vec<ContactId> = self
            .body_ref(body)
            .contacts
            .iter()
            .filter(|(key, _)| key.a.fixture == id || key.b.fixture == id)
            .map(|&(_, c)| c)
            .collect();
        for contact in contact_ids {
            self.destroy_contact(contact, true);
        }

        self.destroy_proxies_for(id);
        self.body_mut_ref(body).fixtures.retain(|&f| f != id);
        self.fixtures.free(id.raw());
        if fire_listener {
            if let Some(mut listener) = self.listeners.fixture_destruction.take() {
                listener(id);
                self.listeners.fixture_destruction = Some(listener);
            }
        }
    }

    /// Replace a fixture's collision filter and re-evaluate its contacts at
    /// the start of the next step.
    pub fn set_filter(&mut self, id: FixtureId, filter: planar_types::Filter) -> Result<()> {
        self.check_unlocked("set_filter")?;
        self.fixture(id)?;
        match self.fixtures.get_mut(id.raw()) {
            Some(fixture) => fixture.filter = filter,
            None => unreachable!(),
        }
        self.refilter_fixture(id);
        Ok(())
    }

    /// Change a fixture's sensor flag; affected contacts update immediately.
    pub fn set_sensor(&mut self, id: FixtureId, is_sensor: bool) -> Result<()> {
        self.check_unlocked("set_sensor")?;
        self.fixture(id)?;
        let body = self.fixture_ref(id).body;
        match self.fixtures.get_mut(id.raw()) {
            Some(fixture) => fixture.is_sensor = is_sensor,
            None => unreachable!(),
        }
        let contact_ids: Vec<ContactId> = self
            .body_ref(body)
            .contacts
            .iter()
            .filter(|(key, _)| key.a.fixture == id || key.b.fixture == id)
            .map(|&(_, c)| c)
            .collect();
        for contact_id in contact_ids {
            let (fa, fb) = {
                let contact = self.contact_ref(contact_id);
                (contact.a.fixture, contact.b.fixture)
            };
            let sensor =
                self.fixture_ref(fa).is_sensor || self.fixture_ref(fb).is_sensor;
            self.contact_mut_ref(contact_id).is_sensor = sensor;
        }
        Ok(())
    }

    /// Set a fixture's density. Call [`World::reset_mass_data`] to apply.
    pub fn set_density(&mut self, id: FixtureId, density: f64) -> Result<()> {
        self.check_unlocked("set_density")?;
        self.fixture(id)?;
        if !density.is_finite() || density < 0.0 {
            return Err(PhysicsError::invalid_argument(
                "density must be finite and non-negative",
            ));
        }
        match self.fixtures.get_mut(id.raw()) {
            Some(fixture) => fixture.density = density,
            None => unreachable!(),
        }
        Ok(())
    }

    /// Mark every contact of this fixture for re-filtering next step.
    pub(crate) fn refilter_fixture(&mut self, id: FixtureId) {
        let body = self.fixture_ref(id).body;
        let contact_ids: Vec<ContactId> = self
            .body_ref(body)
            .contacts
            .iter()
            .filter(|(key, _)| key.a.fixture == id || key.b.fixture == id)
            .map(|&(_, c)| c)
            .collect();
        for contact in contact_ids {
            self.contact_mut_ref(contact).flag_for_filtering(true);
        }
        self.needs_contact_filtering = true;
    }

    // ------------------------------------------------------------------
    // Joints
    // ------------------------------------------------------------------

    /// Create a joint. Gear joints are calibrated against the current body
    /// poses here.
    pub fn create_joint(&mut self, mut joint: Joint) -> Result<JointId> {
        self.check_unlocked("create_joint")?;
        let body_a = joint.body_a();
        let body_b = joint.body_b();
        if body_a == body_b {
            return Err(PhysicsError::invalid_argument(
                "a joint may not join a body to itself",
            ));
        }
        self.body(body_a)?;
        self.body(body_b)?;
        if self.joints.len() as u32 >= crate::MAX_JOINTS {
            return Err(PhysicsError::length_error(EntityKind::Joint));
        }

        if let Joint::Gear(gear) = &mut joint {
            let [out_a, out_b, reference_a, reference_b] = gear.bodies();
            let pose_angle = |id: BodyId| -> Result<(planar_types::Pose2, f64)> {
                let body = self
                    .bodies
                    .get(id.raw())
                    .ok_or(PhysicsError::out_of_range(EntityKind::Body, id.raw()))?;
                Ok((*body.transform(), body.angle()))
            };
            let (xf_ref_a, a_ref_a) = pose_angle(reference_a)?;
            let (xf_out_a, a_out_a) = pose_angle(out_a)?;
            let (xf_ref_b, a_ref_b) = pose_angle(reference_b)?;
            let (xf_out_b, a_out_b) = pose_angle(out_b)?;
            gear.calibrate(
                &xf_ref_a, &xf_out_a, a_ref_a, a_out_a, &xf_ref_b, &xf_out_b, a_ref_b, a_out_b,
            );
        }

        let collide_connected = joint.collide_connected();
        let id = JointId::new(self.joints.allocate(joint));
        if self.joint_islanded.len() <= id.index() {
            self.joint_islanded.resize(id.index() + 1, false);
        }
        self.joint_list.push(id);
        self.body_mut_ref(body_a).joints.push((body_b, id));
        self.body_mut_ref(body_b).joints.push((body_a, id));

        // Existing contacts between the pair may now be forbidden.
        if !collide_connected {
            let contact_ids: Vec<ContactId> = self
                .body_ref(body_a)
                .contacts
                .iter()
                .filter(|(key, _)| key.a.body == body_b || key.b.body == body_b)
                .map(|&(_, c)| c)
                .collect();
            for contact in contact_ids {
                self.contact_mut_ref(contact).flag_for_filtering(true);
            }
            self.needs_contact_filtering = true;
        }
        Ok(id)
    }

    /// Read a joint.
    pub fn joint(&self, id: JointId) -> Result<&Joint> {
        self.joints
            .get(id.raw())
            .ok_or(PhysicsError::out_of_range(EntityKind::Joint, id.raw()))
    }

    /// Whether a joint handle refers to a destroyed joint.
    #[must_use]
    pub fn is_joint_destroyed(&self, id: JointId) -> bool {
        self.joints.is_free(id.raw())
    }

    /// Destroy a joint, waking its bodies and firing the joint listener.
    pub fn destroy_joint(&mut self, id: JointId) -> Result<()> {
        self.check_unlocked("destroy_joint")?;
        self.joint(id)?;
        let body_a = self.joint_ref(id).body_a();
        let body_b = self.joint_ref(id).body_b();
        let collide_connected = self.joint_ref(id).collide_connected();

        self.body_mut_ref(body_a).joints.retain(|&(_, j)| j != id);
        self.body_mut_ref(body_b).joints.retain(|&(_, j)| j != id);
        self.body_mut_ref(body_a).set_awake();
        self.body_mut_ref(body_b).set_awake();

        self.joint_list.retain(|&j| j != id);
        self.joints.free(id.raw());

        // The pair may begin colliding now.
        if !collide_connected {
            let contact_ids: Vec<ContactId> = self
                .body_ref(body_a)
                .contacts
                .iter()
                .filter(|(key, _)| key.a.body == body_b || key.b.body == body_b)
                .map(|&(_, c)| c)
                .collect();
            for contact in contact_ids {
                self.contact_mut_ref(contact).flag_for_filtering(true);
            }
            self.needs_contact_filtering = true;
        }

        if let Some(mut listener) = self.listeners.joint_destruction.take() {
            listener(id);
            self.listeners.joint_destruction = Some(listener);
        }
        Ok(())
    }

    /// Current translation of a prismatic joint along its axis.
    pub fn joint_translation(&self, id: JointId) -> Result<f64> {
        match self.joint(id)? {
            Joint::Prismatic(prismatic) => {
                let xf_a = self.body(prismatic.body_a)?.transform();
                let xf_b = self.body(prismatic.body_b)?.transform();
                Ok(prismatic.translation(xf_a, xf_b))
            }
            _ => Err(PhysicsError::invalid_argument(
                "joint translation is defined for prismatic joints",
            )),
        }
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    /// Read a contact.
    pub fn contact(&self, id: ContactId) -> Result<&Contact> {
        self.contacts
            .get(id.raw())
            .ok_or(PhysicsError::out_of_range(EntityKind::Contact, id.raw()))
    }

    /// Whether a contact handle refers to a destroyed contact.
    #[must_use]
    pub fn is_contact_destroyed(&self, id: ContactId) -> bool {
        self.contacts.is_free(id.raw())
    }

    /// Read a contact's manifold.
    pub fn manifold(&self, id: ContactId) -> Result<&Manifold> {
        Ok(&self.contact(id)?.manifold)
    }

    /// Override a contact's surface tangent speed (conveyor belts).
    pub fn set_tangent_speed(&mut self, id: ContactId, speed: f64) -> Result<()> {
        self.contact(id)?;
        if !speed.is_finite() {
            return Err(PhysicsError::invalid_argument("non-finite tangent speed"));
        }
        self.contact_mut_ref(id).tangent_speed = speed;
        Ok(())
    }

    /// Disable a contact for the current step; re-enabled at next update.
    /// Unlike most mutators, this is allowed while locked so pre-solve
    /// listeners can use it.
    pub fn set_contact_enabled(&mut self, id: ContactId, enabled: bool) -> Result<()> {
        self.contact(id)?;
        self.contact_mut_ref(id).set_enabled(enabled);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Broad-phase plumbing
    // ------------------------------------------------------------------

    pub(crate) fn create_proxies_for(&mut self, fixture_id: FixtureId) {
        let (body_id, shape_id) = {
            let fixture = self.fixture_ref(fixture_id);
            (fixture.body, fixture.shape)
        };
        let xf = *self.body_ref(body_id).transform();
        let child_count = self.shape_ref(shape_id).child_count();

        let mut proxies = Vec::with_capacity(child_count);
        for child in 0..child_count {
            let aabb = self
                .shape_ref(shape_id)
                .compute_aabb(child, &xf)
                .expanded(CREATION_AABB_EXTENSION);
            let proxy = self.tree.create_proxy(
                aabb,
                TreeLeaf {
                    body: body_id,
                    fixture: fixture_id,
                    child: child as u32,
                },
            );
            proxies.push(proxy);
            self.moved_proxies.push(proxy);
        }
        match self.fixtures.get_mut(fixture_id.raw()) {
            Some(fixture) => fixture.proxies = proxies,
            None => unreachable!(),
        }
    }

    pub(crate) fn destroy_proxies_for(&mut self, fixture_id: FixtureId) {
        let proxies = match self.fixtures.get_mut(fixture_id.raw()) {
            Some(fixture) => std::mem::take(&mut fixture.proxies),
            None => unreachable!(),
        };
        for proxy in proxies {
            self.moved_proxies.retain(|&p| p != proxy);
            self.tree.destroy_proxy(proxy);
        }
    }

    /// Refit a body's proxies after its transform changed.
    pub(crate) fn synchronize_fixtures_of(
        &mut self,
        body_id: BodyId,
        extension: f64,
        multiplier: f64,
    ) -> u32 {
        let xf0 = self.body_ref(body_id).sweep.pose_at(0.0);
        let xf1 = *self.body_ref(body_id).transform();
        let displacement = xf1.p - xf0.p;
        let mut moved = 0;

        for fixture_id in self.body_ref(body_id).fixtures.clone() {
            let shape_id = self.fixture_ref(fixture_id).shape;
            let proxies = self.fixture_ref(fixture_id).proxies.clone();
            for (child, proxy) in proxies.into_iter().enumerate() {
                // The swept box covers the child at both endpoint poses.
                let aabb0 = self.shape_ref(shape_id).compute_aabb(child, &xf0);
                let aabb1 = self.shape_ref(shape_id).compute_aabb(child, &xf1);
                let swept = aabb0.combined(&aabb1);
                if self
                    .tree
                    .move_proxy(proxy, swept, displacement, extension, multiplier)
                {
                    self.moved_proxies.push(proxy);
                    moved += 1;
                }
            }
        }
        moved
    }

    /// The full collision predicate for a prospective pair, minus the user
    /// pre-filter (which is consulted once at creation).
    pub(crate) fn should_collide(&self, a: &Contactable, b: &Contactable) -> bool {
        if a.body == b.body {
            return false;
        }
        let body_a = self.body_ref(a.body);
        let body_b = self.body_ref(b.body);
        if !(body_a.enabled && body_b.enabled) {
            return false;
        }
        if !(body_a.is_dynamic() || body_b.is_dynamic()) {
            return false;
        }
        // A joint with collide_connected == false suppresses the pair.
        for &(other, joint_id) in &body_a.joints {
            if other == b.body && !self.joint_ref(joint_id).collide_connected() {
                return false;
            }
        }
        let fixture_a = self.fixture_ref(a.fixture);
        let fixture_b = self.fixture_ref(b.fixture);
        fixture_a.filter.should_collide(&fixture_b.filter)
    }

    /// Create a contact for a validated key.
    pub(crate) fn create_contact(&mut self, key: ContactKey) -> Option<ContactId> {
        if self.contacts.len() as u32 >= crate::MAX_CONTACTS {
            tracing::warn!("contact pool exhausted; pair dropped");
            return None;
        }
        let fixture_a = self.fixture_ref(key.a.fixture);
        let fixture_b = self.fixture_ref(key.b.fixture);
        let friction = mix_friction(fixture_a.friction, fixture_b.friction);
        let restitution = mix_restitution(fixture_a.restitution, fixture_b.restitution);
        let is_sensor = fixture_a.is_sensor || fixture_b.is_sensor;

        let id = ContactId::new(
            self.contacts
                .allocate(Contact::new(key, friction, restitution, is_sensor)),
        );
        self.contact_list.push(id);
        self.body_mut_ref(key.a.body).contacts.push((key, id));
        self.body_mut_ref(key.b.body).contacts.push((key, id));
        Some(id)
    }

    /// Destroy a contact, optionally firing end-contact if it was touching.
    pub(crate) fn destroy_contact(&mut self, id: ContactId, fire_end: bool) {
        let (key, was_touching) = {
            let contact = self.contact_ref(id);
            (contact.key(), contact.is_touching())
        };

        if fire_end && was_touching {
            // Fire before the storage dies so the id is still answerable,
            // and wake the pair: losing a support changes their dynamics.
            if let Some(mut listener) = self.listeners.end_contact.take() {
                listener(id);
                self.listeners.end_contact = Some(listener);
            }
            self.body_mut_ref(key.a.body).set_awake();
            self.body_mut_ref(key.b.body).set_awake();
        }

        self.body_mut_ref(key.a.body).contacts.retain(|&(_, c)| c != id);
        self.body_mut_ref(key.b.body).contacts.retain(|&(_, c)| c != id);
        self.contact_list.retain(|&c| c != id);
        self.contacts.free(id.raw());
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Call `callback` for every fixture child whose fat AABB overlaps the
    /// query box. Return false from the callback to stop early.
    pub fn query_aabb(&self, aabb: &Aabb, mut callback: impl FnMut(FixtureId, u32) -> bool) {
        self.tree.query(aabb, |proxy| {
            let leaf = self.tree.leaf(proxy);
            callback(leaf.fixture, leaf.child)
        });
    }

    /// Cast a ray through the world.
    ///
    /// For every fixture child actually hit, the callback receives the
    /// fixture, child, hit point, surface normal, and fraction, and returns
    /// a new maximum fraction: 0 terminates, the reported fraction finds the
    /// closest hit, 1 keeps scanning everything, and a negative value
    /// ignores this hit.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        mut callback: impl FnMut(FixtureId, u32, Vec2, Vec2, f64) -> f64,
    ) {
        self.tree.ray_cast(input, |sub_input, proxy| {
            let leaf = self.tree.leaf(proxy);
            let fixture = self.fixture_ref(leaf.fixture);
            let body = self.body_ref(fixture.body);
            let shape = self.shape_ref(fixture.shape);
            let output = shape.ray_cast(sub_input, body.transform(), leaf.child as usize);
            match output {
                Some(hit) => {
                    let point = sub_input.p1 + (sub_input.p2 - sub_input.p1) * hit.fraction;
                    callback(leaf.fixture, leaf.child, point, hit.normal, hit.fraction)
                }
                // Fat-AABB hit only; keep scanning at the current fraction.
                None => -1.0,
            }
        });
    }

    /// Shift the world origin: every position becomes `position - offset`.
    pub fn shift_origin(&mut self, offset: Vec2) -> Result<()> {
        self.check_unlocked("shift_origin")?;
        for &body_id in &self.body_list.clone() {
            let body = self.body_mut_ref(body_id);
            body.transform.p -= offset;
            body.sweep.pos0.linear -= offset;
            body.sweep.pos1.linear -= offset;
        }
        for &joint_id in &self.joint_list.clone() {
            if let Joint::Pulley(pulley) = self.joint_mut_ref(joint_id) {
                pulley.ground_anchor_a -= offset;
                pulley.ground_anchor_b -= offset;
            }
            if let Joint::Mouse(mouse) = self.joint_mut_ref(joint_id) {
                mouse.target -= offset;
            }
        }
        self.tree.shift_origin(offset);
        Ok(())
    }

    /// Fire the post-solve listener for one contact.
    pub(crate) fn dispatch_post_solve(&mut self, id: ContactId, impulses: &ContactImpulses) {
        if let Some(mut listener) = self.listeners.post_solve.take() {
            listener(id, impulses);
            self.listeners.post_solve = Some(listener);
        }
    }
}
