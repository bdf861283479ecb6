//! Fixtures: shape instances bound to bodies with material properties.

use planar_collision::ProxyId;
use planar_types::{BodyId, Filter, ShapeId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction-time configuration of a fixture.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FixtureConf {
    /// The body to attach to.
    pub body: BodyId,
    /// The registered shape to instance.
    pub shape: ShapeId,
    /// Mass density, kg/m^2.
    pub density: f64,
    /// Coulomb friction coefficient.
    pub friction: f64,
    /// Restitution (bounciness) in `[0, 1]`.
    pub restitution: f64,
    /// Collision filter.
    pub filter: Filter,
    /// Sensors detect contacts but produce no impulses.
    pub is_sensor: bool,
}

impl FixtureConf {
    /// A solid fixture with default material on the given body and shape.
    #[must_use]
    pub fn new(body: BodyId, shape: ShapeId) -> Self {
        Self {
            body,
            shape,
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
            filter: Filter::default(),
            is_sensor: false,
        }
    }

    /// Set the density.
    #[must_use]
    pub fn density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    /// Set the restitution.
    #[must_use]
    pub fn restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    /// Set the collision filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Mark the fixture as a sensor.
    #[must_use]
    pub fn sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    /// Whether the numeric inputs are finite and sane.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.density.is_finite()
            && self.density >= 0.0
            && self.friction.is_finite()
            && self.friction >= 0.0
            && self.restitution.is_finite()
    }
}

/// A fixture: one shape instance on one body.
///
/// While its body is enabled, a fixture owns exactly one broad-phase proxy
/// per shape child.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fixture {
    /// The owning body.
    pub(crate) body: BodyId,
    /// The instanced shape.
    pub(crate) shape: ShapeId,
    /// Mass density.
    pub(crate) density: f64,
    /// Friction coefficient.
    pub(crate) friction: f64,
    /// Restitution.
    pub(crate) restitution: f64,
    /// Collision filter.
    pub(crate) filter: Filter,
    /// Sensor flag.
    pub(crate) is_sensor: bool,
    /// One broad-phase proxy per shape child (empty while disabled).
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) proxies: Vec<ProxyId>,
}

impl Fixture {
    pub(crate) fn new(conf: &FixtureConf) -> Self {
        Self {
            body: conf.body,
            shape: conf.shape,
            density: conf.density,
            friction: conf.friction,
            restitution: conf.restitution,
            filter: conf.filter,
            is_sensor: conf.is_sensor,
            proxies: Vec::new(),
        }
    }

    /// The owning body.
    #[must_use]
    pub fn body(&self) -> BodyId {
        self.body
    }

    /// The instanced shape.
    #[must_use]
    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    /// Mass density.
    #[must_use]
    pub fn density(&self) -> f64 {
        self.density
    }

    /// Friction coefficient.
    #[must_use]
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Restitution.
    #[must_use]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// Collision filter.
    #[must_use]
    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Whether this fixture is a sensor.
    #[must_use]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }
}
