//! Listener slots and buffered contact events.
//!
//! Listeners are function objects owned by the world. Because several fire
//! while the world is mid-step, begin/end transitions found during contact
//! updating are buffered and flushed afterwards: every begin of the phase
//! runs before any end, each group in contact storage order. Pre-solve and
//! post-solve run inline at their pipeline points, and destruction-driven
//! end-contact events run just before the contact's storage dies so the id
//! is still answerable.

use planar_collision::Manifold;
use planar_types::{ContactId, FixtureId, JointId, ShapeId};

/// Per-point impulses reported to the post-solve listener.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulses {
    /// Accumulated normal impulses, one per manifold point.
    pub normal: [f64; 2],
    /// Accumulated tangent impulses, one per manifold point.
    pub tangent: [f64; 2],
    /// Number of valid entries.
    pub count: usize,
}

/// Begin-contact listener.
pub type ContactListener = Box<dyn FnMut(ContactId)>;
/// Pre-solve listener: receives the previous manifold; returning false
/// disables the contact for this step's solver.
pub type PreSolveListener = Box<dyn FnMut(ContactId, &Manifold) -> bool>;
/// Post-solve listener: receives the impulses the solver applied.
pub type PostSolveListener = Box<dyn FnMut(ContactId, &ContactImpulses)>;
/// Joint destruction listener.
pub type JointListener = Box<dyn FnMut(JointId)>;
/// Shape destruction listener.
pub type ShapeListener = Box<dyn FnMut(ShapeId)>;
/// Fixture detach listener.
pub type FixtureListener = Box<dyn FnMut(FixtureId)>;
/// Contact pre-filter: returning false forbids the pair.
pub type ContactFilter = Box<dyn FnMut(FixtureId, FixtureId) -> bool>;

/// The world's listener slots.
#[derive(Default)]
pub(crate) struct Listeners {
    pub begin_contact: Option<ContactListener>,
    pub end_contact: Option<ContactListener>,
    pub pre_solve: Option<PreSolveListener>,
    pub post_solve: Option<PostSolveListener>,
    pub joint_destruction: Option<JointListener>,
    pub shape_destruction: Option<ShapeListener>,
    pub fixture_destruction: Option<FixtureListener>,
    pub contact_filter: Option<ContactFilter>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("begin_contact", &self.begin_contact.is_some())
            .field("end_contact", &self.end_contact.is_some())
            .field("pre_solve", &self.pre_solve.is_some())
            .field("post_solve", &self.post_solve.is_some())
            .field("joint_destruction", &self.joint_destruction.is_some())
            .field("shape_destruction", &self.shape_destruction.is_some())
            .field("fixture_destruction", &self.fixture_destruction.is_some())
            .field("contact_filter", &self.contact_filter.is_some())
            .finish()
    }
}

/// Buffered begin/end transitions from the contact update phase.
#[derive(Debug, Clone, Default)]
pub(crate) struct ContactEventBuffer {
    pub begins: Vec<ContactId>,
    pub ends: Vec<ContactId>,
}

impl ContactEventBuffer {
    pub fn clear(&mut self) {
        self.begins.clear();
        self.ends.clear();
    }
}
