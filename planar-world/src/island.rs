//! Step-local islands of interacting bodies.
//!
//! An island is one connected component of awake mobile bodies linked by
//! touching contacts or joints. Solving per island lets each group iterate
//! to convergence without wasting work on distant entities, and lets a whole
//! group fall asleep atomically.
//!
//! The island's vectors are flat id lists reused step to step; membership is
//! tracked by per-entity islanded flags, cleared between islands only for
//! static bodies (which may legitimately join several islands per step).

use planar_types::{BodyId, ContactId, JointId};

/// One island's worth of entity ids, gathered by flood fill.
#[derive(Debug, Clone, Default)]
pub(crate) struct Island {
    /// Bodies in discovery order; the solver indexes them by position.
    pub bodies: Vec<BodyId>,
    /// Touching, enabled, non-sensor contacts.
    pub contacts: Vec<ContactId>,
    /// Enabled joints.
    pub joints: Vec<JointId>,
}

impl Island {
    /// Empty the island, keeping capacity for the next one.
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_keeps_capacity() {
        let mut island = Island::default();
        island.bodies.extend((0..64).map(BodyId::new));
        let capacity = island.bodies.capacity();
        island.clear();
        assert!(island.bodies.is_empty());
        assert_eq!(island.bodies.capacity(), capacity);
    }
}
