//! Per-step statistics returned by the world's step method.
//!
//! The step never fails for numerical reasons; non-convergence and
//! degeneracy are reported here instead. Hosts that care about solver health
//! watch `reg.min_separation` and `reg.degenerate_constraints` over time.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Statistics of the pre-solve phases: proxy handling, contact discovery,
/// contact destruction, and manifold updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PreStepStats {
    /// Broad-phase proxies re-fit from queued moves.
    pub proxies_moved: u32,
    /// Contacts destroyed because their fat AABBs stopped overlapping.
    pub contacts_destroyed_overlap: u32,
    /// Contacts destroyed because a filter change forbade them.
    pub contacts_destroyed_filter: u32,
    /// New contacts created from broad-phase overlaps.
    pub contacts_added: u32,
    /// Contacts whose manifolds were recomputed.
    pub contacts_updated: u32,
    /// Contacts skipped because both bodies were asleep.
    pub contacts_ignored: u32,
}

/// Statistics of the regular (discrete) solve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegStepStats {
    /// Islands assembled.
    pub islands_found: u32,
    /// Islands solved (equals `islands_found` unless iteration caps are 0).
    pub islands_solved: u32,
    /// Bodies put to sleep at the end of island solving.
    pub bodies_slept: u32,
    /// Contacts added by post-solve broad-phase synchronization.
    pub contacts_added: u32,
    /// Sum of bodies over all solved islands.
    pub body_sums: u32,
    /// Velocity iterations actually used, summed over islands.
    pub velocity_iterations: u32,
    /// Position iterations actually used, summed over islands.
    pub position_iterations: u32,
    /// Smallest signed contact separation observed by the position solver.
    pub min_separation: f64,
    /// Largest incremental impulse applied by the velocity solver.
    pub max_incremental_impulse: f64,
    /// Constraint rows abandoned after producing non-finite terms.
    pub degenerate_constraints: u32,
}

impl RegStepStats {
    /// A value representing "no separations observed yet".
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min_separation: f64::INFINITY,
            ..Self::default()
        }
    }
}

/// Statistics of the continuous-collision (TOI) solve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ToiStepStats {
    /// Sub-islands assembled across all sub-steps.
    pub islands_found: u32,
    /// Sub-islands solved.
    pub islands_solved: u32,
    /// Contacts whose TOI was (re)computed.
    pub contacts_updated_toi: u32,
    /// Contacts added during sub-step synchronization.
    pub contacts_added: u32,
    /// Contacts checked for a TOI event.
    pub contacts_checked: u32,
    /// Sum of velocity iterations used across sub-steps.
    pub velocity_iterations: u32,
    /// Sum of position iterations used across sub-steps.
    pub position_iterations: u32,
    /// Number of TOI sub-steps taken.
    pub sub_steps: u32,
    /// Smallest signed separation observed by the TOI position solver.
    pub min_separation: f64,
    /// Largest distance-query iteration count observed.
    pub max_distance_iters: u32,
    /// Largest conservative-advancement iteration count observed.
    pub max_toi_iters: u32,
    /// Largest root-finder iteration count observed.
    pub max_root_iters: u32,
}

impl ToiStepStats {
    /// A value representing "no separations observed yet".
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min_separation: f64::INFINITY,
            ..Self::default()
        }
    }
}

/// Per-island solver results, aggregated into [`RegStepStats`] and
/// [`ToiStepStats`] by the world.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IslandStats {
    /// Velocity iterations used.
    pub velocity_iterations: u32,
    /// Position iterations used.
    pub position_iterations: u32,
    /// Smallest signed contact separation at exit.
    pub min_separation: f64,
    /// Largest incremental impulse applied.
    pub max_incremental_impulse: f64,
    /// Whether the position solver reported convergence.
    pub solved: bool,
    /// Bodies put to sleep.
    pub bodies_slept: u32,
    /// Constraint rows abandoned after producing non-finite terms.
    pub degenerate_constraints: u32,
}

/// Aggregate statistics for one world step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepStats {
    /// Pre-solve phase statistics.
    pub pre: PreStepStats,
    /// Regular solve statistics.
    pub reg: RegStepStats,
    /// Continuous-collision solve statistics.
    pub toi: ToiStepStats,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sentinels() {
        assert_eq!(RegStepStats::empty().min_separation, f64::INFINITY);
        assert_eq!(ToiStepStats::empty().min_separation, f64::INFINITY);
        assert_eq!(RegStepStats::empty().islands_found, 0);
    }
}
