//! Configuration types for world construction and stepping.
//!
//! [`WorldConf`] fixes the properties a world is built with; [`StepConf`]
//! travels with every call to `step` so that all tunable solver behavior is
//! explicit per step. There is no hidden global configuration.

use crate::math::Vec2;
use crate::{PhysicsError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default linear slop: allowed penetration overlap in meters.
pub const DEFAULT_LINEAR_SLOP: f64 = 0.005;

/// Default angular slop in radians (two degrees).
pub const DEFAULT_ANGULAR_SLOP: f64 = 2.0 / 180.0 * std::f64::consts::PI;

/// Construction-time configuration of a world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConf {
    /// Smallest vertex radius any shape registered with the world may have.
    pub min_vertex_radius: f64,
    /// Largest vertex radius any shape registered with the world may have.
    pub max_vertex_radius: f64,
    /// Number of broad-phase tree nodes to pre-allocate.
    pub initial_tree_capacity: u32,
    /// Uniform gravity applied to dynamic bodies, scaled per body.
    pub gravity: Vec2,
}

impl Default for WorldConf {
    fn default() -> Self {
        Self {
            min_vertex_radius: DEFAULT_LINEAR_SLOP / 5.0,
            max_vertex_radius: 255.0,
            initial_tree_capacity: 4096,
            gravity: Vec2::new(0.0, -9.8),
        }
    }
}

impl WorldConf {
    /// Set the vertex radius interval.
    #[must_use]
    pub fn with_vertex_radius_interval(mut self, min: f64, max: f64) -> Self {
        self.min_vertex_radius = min;
        self.max_vertex_radius = max;
        self
    }

    /// Set the initial broad-phase tree capacity.
    #[must_use]
    pub fn with_tree_capacity(mut self, capacity: u32) -> Self {
        self.initial_tree_capacity = capacity;
        self
    }

    /// Set the gravity vector.
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.min_vertex_radius.is_finite() || self.min_vertex_radius <= 0.0 {
            return Err(PhysicsError::invalid_argument(
                "minimum vertex radius must be positive and finite",
            ));
        }
        if !self.max_vertex_radius.is_finite() || self.max_vertex_radius < self.min_vertex_radius {
            return Err(PhysicsError::invalid_argument(
                "maximum vertex radius must be at least the minimum",
            ));
        }
        if !(self.gravity.x.is_finite() && self.gravity.y.is_finite()) {
            return Err(PhysicsError::invalid_argument("gravity must be finite"));
        }
        Ok(())
    }
}

/// Per-step configuration of the simulation.
///
/// All solver tolerances, iteration budgets, and continuous-collision knobs
/// live here so a world carries no step state of its own between calls.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepConf {
    /// Integration period in seconds. Zero performs only queued proxy
    /// handling; no physics.
    pub dt: f64,

    /// Velocity iteration cap for the regular solver. Zero disables the pass.
    pub velocity_iterations: u32,
    /// Position iteration cap for the regular solver. Zero disables the pass.
    pub position_iterations: u32,
    /// Velocity iteration cap for TOI sub-step solving.
    pub toi_velocity_iterations: u32,
    /// Position iteration cap for TOI sub-step solving.
    pub toi_position_iterations: u32,

    /// Allowed linear penetration before position correction engages, meters.
    pub linear_slop: f64,
    /// Allowed angular error before position correction engages, radians.
    pub angular_slop: f64,
    /// Per-iteration clamp on linear position corrections, meters.
    pub max_linear_correction: f64,
    /// Per-iteration clamp on angular position corrections, radians.
    pub max_angular_correction: f64,

    /// Relative normal speed below which restitution is ignored, m/s.
    pub velocity_threshold: f64,
    /// Cap on per-step translation applied after integration, meters.
    pub max_translation: f64,
    /// Cap on per-step rotation applied after integration, radians.
    pub max_rotation: f64,

    /// Position-bias factor for the regular position solver, in `(0, 1]`.
    pub reg_baumgarte: f64,
    /// Position-bias factor for the TOI position solver, in `(0, 1]`.
    pub toi_baumgarte: f64,

    /// Maximum number of TOI sub-steps per step.
    pub max_sub_steps: u32,
    /// Maximum iterations of the conservative-advancement outer loop.
    pub max_toi_iters: u32,
    /// Maximum GJK iterations per distance query.
    pub max_distance_iters: u32,
    /// Maximum root-finder iterations per separating axis.
    pub max_toi_root_iters: u32,
    /// Penetration depth the TOI advancement targets, meters. Slightly more
    /// than `linear_slop` so sub-steps do not fight the position solver.
    pub toi_target_depth: f64,
    /// Half-width of the acceptance band around the TOI target, meters.
    pub toi_tolerance: f64,

    /// When false, accumulated contact and joint impulses reset every step.
    pub warm_starting: bool,
    /// When false, two-point manifolds are solved point-by-point instead of
    /// through the coupled 2x2 block.
    pub block_solve: bool,

    /// Constant padding added to broad-phase fat AABBs, meters.
    pub aabb_extension: f64,
    /// Fraction of a proxy's displacement added to its fat AABB.
    pub displacement_multiplier: f64,

    /// Linear speed below which a body accrues sleep time, m/s.
    pub linear_sleep_tolerance: f64,
    /// Angular speed below which a body accrues sleep time, rad/s.
    pub angular_sleep_tolerance: f64,
    /// Continuous below-threshold time required before an island sleeps,
    /// seconds.
    pub time_to_sleep: f64,
}

impl Default for StepConf {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            velocity_iterations: 8,
            position_iterations: 3,
            toi_velocity_iterations: 8,
            toi_position_iterations: 20,
            linear_slop: DEFAULT_LINEAR_SLOP,
            angular_slop: DEFAULT_ANGULAR_SLOP,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 / 180.0 * std::f64::consts::PI,
            velocity_threshold: 1.0,
            max_translation: 2.0,
            max_rotation: 0.5 * std::f64::consts::PI,
            reg_baumgarte: 0.2,
            toi_baumgarte: 0.75,
            max_sub_steps: 8,
            max_toi_iters: 20,
            max_distance_iters: 20,
            max_toi_root_iters: 30,
            toi_target_depth: DEFAULT_LINEAR_SLOP * 3.0,
            toi_tolerance: DEFAULT_LINEAR_SLOP / 4.0,
            warm_starting: true,
            block_solve: true,
            aabb_extension: 0.1,
            displacement_multiplier: 2.0,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 / 180.0 * std::f64::consts::PI,
            time_to_sleep: 0.5,
        }
    }
}

impl StepConf {
    /// Create a configuration with the given integration period.
    #[must_use]
    pub fn with_dt(dt: f64) -> Self {
        Self {
            dt,
            ..Self::default()
        }
    }

    /// Set the integration period.
    #[must_use]
    pub fn dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Set the regular velocity and position iteration caps.
    #[must_use]
    pub fn iterations(mut self, velocity: u32, position: u32) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    /// Enable or disable warm starting.
    #[must_use]
    pub fn warm_starting(mut self, enabled: bool) -> Self {
        self.warm_starting = enabled;
        self
    }

    /// Enable or disable the two-point block solver.
    #[must_use]
    pub fn block_solve(mut self, enabled: bool) -> Self {
        self.block_solve = enabled;
        self
    }

    /// Set the maximum number of TOI sub-steps.
    #[must_use]
    pub fn max_sub_steps(mut self, count: u32) -> Self {
        self.max_sub_steps = count;
        self
    }

    /// The inverse integration period, or zero when `dt` is zero.
    #[must_use]
    pub fn inv_dt(&self) -> f64 {
        if self.dt != 0.0 {
            1.0 / self.dt
        } else {
            0.0
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.dt.is_finite() || self.dt < 0.0 {
            return Err(PhysicsError::invalid_argument(
                "step period must be non-negative and finite",
            ));
        }
        if self.linear_slop <= 0.0 || self.angular_slop <= 0.0 {
            return Err(PhysicsError::invalid_argument("slop values must be positive"));
        }
        if !(0.0..=1.0).contains(&self.reg_baumgarte) || !(0.0..=1.0).contains(&self.toi_baumgarte)
        {
            return Err(PhysicsError::invalid_argument(
                "baumgarte factors must be in [0, 1]",
            ));
        }
        if self.toi_target_depth < self.linear_slop {
            return Err(PhysicsError::invalid_argument(
                "TOI target depth must be at least the linear slop",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        WorldConf::default().validate().unwrap();
        StepConf::default().validate().unwrap();
    }

    #[test]
    fn test_world_conf_rejects_inverted_interval() {
        let conf = WorldConf::default().with_vertex_radius_interval(1.0, 0.5);
        assert!(conf.validate().is_err());
    }

    #[test]
    fn test_step_conf_builder() {
        let conf = StepConf::with_dt(1.0 / 120.0)
            .iterations(4, 2)
            .warm_starting(false)
            .max_sub_steps(0);
        assert_eq!(conf.dt, 1.0 / 120.0);
        assert_eq!(conf.velocity_iterations, 4);
        assert_eq!(conf.position_iterations, 2);
        assert!(!conf.warm_starting);
        assert_eq!(conf.max_sub_steps, 0);
    }

    #[test]
    fn test_inv_dt() {
        assert_eq!(StepConf::with_dt(0.0).inv_dt(), 0.0);
        assert_eq!(StepConf::with_dt(0.5).inv_dt(), 2.0);
    }

    #[test]
    fn test_rejects_negative_dt() {
        assert!(StepConf::with_dt(-1.0).validate().is_err());
        assert!(StepConf::with_dt(f64::NAN).validate().is_err());
    }
}
