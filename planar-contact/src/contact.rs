//! Persistent contacts between fixture children.

use planar_collision::{collide_shapes, distance, Manifold, Shape};
use planar_types::{BodyId, FixtureId, Pose2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Friction mixing: the geometric mean, so that one slippery surface makes
/// the pair slippery.
#[must_use]
pub fn mix_friction(friction_a: f64, friction_b: f64) -> f64 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing: the maximum, so that one bouncy surface makes the
/// pair bouncy (an inelastic floor still lets a rubber ball bounce).
#[must_use]
pub fn mix_restitution(restitution_a: f64, restitution_b: f64) -> f64 {
    restitution_a.max(restitution_b)
}

/// One side of a contact: the (body, fixture, child) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Contactable {
    /// The owning body.
    pub body: BodyId,
    /// The fixture.
    pub fixture: FixtureId,
    /// Child index within the fixture's shape.
    pub child: u32,
}

/// Ordered pair of contactables, the de-duplication key for contacts.
///
/// The lesser side (lexicographically by body, fixture, child) is always
/// side A, so a pair discovered twice by the broad phase maps to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactKey {
    /// The lexicographically lesser side.
    pub a: Contactable,
    /// The lexicographically greater side.
    pub b: Contactable,
}

impl ContactKey {
    /// Create a key from two contactables in either order.
    #[must_use]
    pub fn new(x: Contactable, y: Contactable) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

/// Configuration for a contact update.
#[derive(Debug, Clone, Copy)]
pub struct ContactUpdateConf {
    /// GJK iteration cap for sensor overlap queries.
    pub max_distance_iters: u32,
    /// When false, carried impulses are zeroed instead of preserved.
    pub warm_starting: bool,
}

impl Default for ContactUpdateConf {
    fn default() -> Self {
        Self {
            max_distance_iters: 20,
            warm_starting: true,
        }
    }
}

/// The touching transition reported by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchingChange {
    /// The pair was touching before the update.
    pub was_touching: bool,
    /// The pair is touching after the update.
    pub is_touching: bool,
}

impl TouchingChange {
    /// A begin-contact event should fire.
    #[must_use]
    pub fn began(&self) -> bool {
        !self.was_touching && self.is_touching
    }

    /// An end-contact event should fire.
    #[must_use]
    pub fn ended(&self) -> bool {
        self.was_touching && !self.is_touching
    }
}

/// A persistent contact between two fixture children.
///
/// Contacts are created by the world when broad-phase AABBs begin to
/// overlap and destroyed when they separate or filtering forbids the pair;
/// user code never constructs one. Side A precedes side B in
/// [`ContactKey`] order.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Contact {
    /// Side A (the lexicographically lesser contactable).
    pub a: Contactable,
    /// Side B.
    pub b: Contactable,
    /// The current manifold, carrying accumulated impulses.
    pub manifold: Manifold,

    /// Mixed friction coefficient; reset via [`Contact::set_friction`].
    pub friction: f64,
    /// Mixed restitution coefficient.
    pub restitution: f64,
    /// Surface translation speed along the tangent, for conveyor belts.
    pub tangent_speed: f64,

    /// Cached time of impact for the current step, when valid.
    pub toi: Option<f64>,
    /// Number of TOI sub-steps this contact has consumed this step.
    pub toi_count: u32,

    /// Whether either fixture is a sensor; sensors skip the solver.
    pub is_sensor: bool,

    touching: bool,
    enabled: bool,
    islanded: bool,
    needs_filtering: bool,
}

impl Contact {
    /// Create a fresh contact for an ordered pair with mixed materials.
    #[must_use]
    pub fn new(
        key: ContactKey,
        friction: f64,
        restitution: f64,
        is_sensor: bool,
    ) -> Self {
        Self {
            a: key.a,
            b: key.b,
            manifold: Manifold::empty(),
            friction,
            restitution,
            tangent_speed: 0.0,
            toi: None,
            toi_count: 0,
            is_sensor,
            touching: false,
            enabled: true,
            islanded: false,
            needs_filtering: false,
        }
    }

    /// The contact's de-duplication key.
    #[must_use]
    pub fn key(&self) -> ContactKey {
        ContactKey { a: self.a, b: self.b }
    }

    /// Whether the manifold had points after the last update.
    #[must_use]
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    /// Whether the solver may use this contact. Listeners may disable a
    /// contact in pre-solve; the flag resets on the next update.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the contact for the current step.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether this contact is already part of the current island.
    #[must_use]
    pub fn is_islanded(&self) -> bool {
        self.islanded
    }

    /// Set the islanded flag.
    pub fn set_islanded(&mut self, islanded: bool) {
        self.islanded = islanded;
    }

    /// Whether a filter change requested re-evaluation of this pair.
    #[must_use]
    pub fn needs_filtering(&self) -> bool {
        self.needs_filtering
    }

    /// Mark or clear the filter-dirty flag.
    pub fn flag_for_filtering(&mut self, flag: bool) {
        self.needs_filtering = flag;
    }

    /// Override the mixed friction coefficient.
    pub fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    /// Override the mixed restitution coefficient.
    pub fn set_restitution(&mut self, restitution: f64) {
        self.restitution = restitution;
    }

    /// Recompute the manifold and the touching state.
    ///
    /// Accumulated impulses carry over to new manifold points whose contact
    /// features match the old manifold (zeroed when warm starting is off).
    /// The enabled flag resets to true; a pre-solve listener may clear it
    /// again afterwards.
    pub fn update(
        &mut self,
        shape_a: &Shape,
        xf_a: &Pose2,
        shape_b: &Shape,
        xf_b: &Pose2,
        conf: &ContactUpdateConf,
    ) -> TouchingChange {
        let was_touching = self.touching;
        self.enabled = true;

        let is_touching = if self.is_sensor {
            // Sensors need only an overlap verdict, not manifold points.
            let mut cache = planar_collision::distance::SimplexCache::default();
            let out = distance::distance(
                &mut cache,
                &distance::DistanceInput {
                    proxy_a: shape_a.distance_proxy(self.a.child as usize),
                    proxy_b: shape_b.distance_proxy(self.b.child as usize),
                    xf_a: *xf_a,
                    xf_b: *xf_b,
                    use_radii: true,
                    max_iterations: conf.max_distance_iters,
                },
            );
            self.manifold = Manifold::empty();
            out.distance < 10.0 * f64::EPSILON
        } else {
            let old_manifold = self.manifold;
            let mut new_manifold = collide_shapes(
                shape_a,
                self.a.child as usize,
                xf_a,
                shape_b,
                self.b.child as usize,
                xf_b,
            );
            if conf.warm_starting {
                new_manifold.carry_impulses_from(&old_manifold);
            }
            self.manifold = new_manifold;
            !self.manifold.is_empty()
        };

        self.touching = is_touching;
        TouchingChange {
            was_touching,
            is_touching,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use planar_types::Vec2;

    fn contactable(body: u32, fixture: u32) -> Contactable {
        Contactable {
            body: BodyId::new(body),
            fixture: FixtureId::new(fixture),
            child: 0,
        }
    }

    #[test]
    fn test_mixing_rules() {
        assert_eq!(mix_friction(0.0, 0.9), 0.0);
        assert_eq!(mix_friction(0.25, 0.25), 0.25);
        assert_eq!(mix_restitution(0.1, 0.8), 0.8);
    }

    #[test]
    fn test_key_orders_sides() {
        let lo = contactable(1, 4);
        let hi = contactable(2, 3);
        assert_eq!(ContactKey::new(hi, lo), ContactKey::new(lo, hi));
        assert_eq!(ContactKey::new(hi, lo).a, lo);
    }

    #[test]
    fn test_key_orders_by_fixture_within_body() {
        let lo = contactable(1, 3);
        let hi = contactable(1, 4);
        assert_eq!(ContactKey::new(hi, lo).a, lo);
    }

    fn circle_contact() -> (Contact, Shape, Shape) {
        let key = ContactKey::new(contactable(0, 0), contactable(1, 1));
        (
            Contact::new(key, 0.5, 0.0, false),
            Shape::circle(1.0),
            Shape::circle(1.0),
        )
    }

    #[test]
    fn test_update_touching_transitions() {
        let (mut contact, shape_a, shape_b) = circle_contact();
        let conf = ContactUpdateConf::default();

        let near = Pose2::new(Vec2::new(1.5, 0.0), 0.0);
        let change = contact.update(&shape_a, &Pose2::identity(), &shape_b, &near, &conf);
        assert!(change.began());
        assert!(contact.is_touching());

        let far = Pose2::new(Vec2::new(5.0, 0.0), 0.0);
        let change = contact.update(&shape_a, &Pose2::identity(), &shape_b, &far, &conf);
        assert!(change.ended());
        assert!(!contact.is_touching());
    }

    #[test]
    fn test_update_preserves_impulses_on_feature_match() {
        let (mut contact, shape_a, shape_b) = circle_contact();
        let conf = ContactUpdateConf::default();
        let near = Pose2::new(Vec2::new(1.5, 0.0), 0.0);

        contact.update(&shape_a, &Pose2::identity(), &shape_b, &near, &conf);
        contact.manifold.points_mut()[0].normal_impulse = 3.0;

        let nearer = Pose2::new(Vec2::new(1.4, 0.0), 0.0);
        contact.update(&shape_a, &Pose2::identity(), &shape_b, &nearer, &conf);
        assert_eq!(contact.manifold.points()[0].normal_impulse, 3.0);

        // With warm starting off the impulse resets.
        let cold = ContactUpdateConf {
            warm_starting: false,
            ..conf
        };
        contact.update(&shape_a, &Pose2::identity(), &shape_b, &near, &cold);
        assert_eq!(contact.manifold.points()[0].normal_impulse, 0.0);
    }

    #[test]
    fn test_sensor_touching_without_manifold() {
        let key = ContactKey::new(contactable(0, 0), contactable(1, 1));
        let mut contact = Contact::new(key, 0.5, 0.0, true);
        let shape = Shape::circle(1.0);
        let conf = ContactUpdateConf::default();

        let change = contact.update(
            &shape,
            &Pose2::identity(),
            &shape,
            &Pose2::new(Vec2::new(1.0, 0.0), 0.0),
            &conf,
        );
        assert!(change.began());
        assert!(contact.manifold.is_empty(), "sensors keep no manifold");
    }
}
