//! Identifier types for world-owned entities.
//!
//! Entities live in free-list pools owned by the world and are referenced by
//! small dense indices rather than pointers. Cross-references between bodies,
//! fixtures, contacts, and joints are expressed through these handles, which
//! stay valid until the entity is destroyed. Handles to destroyed entities
//! are poisoned: the world answers `is_destroyed` queries for them and
//! rejects other uses with an out-of-range error.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $display:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(u32);

        impl $name {
            /// Create an identifier from a raw pool index.
            #[must_use]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Get the raw pool index.
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Get the raw pool index as a `usize` for direct indexing.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u32> for $name {
            fn from(index: u32) -> Self {
                Self(index)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($display, "({})"), self.0)
            }
        }
    };
}

entity_id! {
    /// Unique identifier for a rigid body within a world.
    BodyId, "Body"
}

entity_id! {
    /// Unique identifier for a fixture (a shape attached to a body) within a world.
    FixtureId, "Fixture"
}

entity_id! {
    /// Unique identifier for a shape registered with a world.
    ///
    /// Shapes are shared geometry: several fixtures may reference the same
    /// shape identifier.
    ShapeId, "Shape"
}

entity_id! {
    /// Unique identifier for a joint within a world.
    JointId, "Joint"
}

entity_id! {
    /// Unique identifier for a contact within a world.
    ///
    /// Contacts are created and destroyed by the world itself as broad-phase
    /// overlaps come and go; user code only ever observes them.
    ContactId, "Contact"
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        let id = BodyId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.index(), 42);
        assert_eq!(BodyId::from(42), id);
    }

    #[test]
    fn test_id_ordering() {
        assert!(ContactId::new(1) < ContactId::new(2));
        assert_eq!(JointId::new(7), JointId::new(7));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(BodyId::new(3).to_string(), "Body(3)");
        assert_eq!(FixtureId::new(0).to_string(), "Fixture(0)");
        assert_eq!(ShapeId::new(9).to_string(), "Shape(9)");
    }
}
