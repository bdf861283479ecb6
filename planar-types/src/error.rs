//! Error types for world operations.

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The kind of entity an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EntityKind {
    /// A rigid body.
    Body,
    /// A fixture binding a shape to a body.
    Fixture,
    /// A registered shape.
    Shape,
    /// A joint.
    Joint,
    /// A contact.
    Contact,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Body => "body",
            Self::Fixture => "fixture",
            Self::Shape => "shape",
            Self::Joint => "joint",
            Self::Contact => "contact",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the world API.
///
/// All variants are raised synchronously before any state is modified;
/// operations are transactional at the API boundary. Numeric degeneracy
/// inside a step is never an error: the affected constraint contributes zero
/// impulse and the step statistics record the event.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// A mutating call was attempted while the world is locked (inside a
    /// step callback), or an operation required the step to be complete.
    #[error("world is locked or step incomplete: {operation}")]
    WrongState {
        /// The operation that was rejected.
        operation: &'static str,
    },

    /// An identifier refers to a freed or never-allocated slot.
    #[error("{kind} identifier {index} is out of range or destroyed")]
    OutOfRange {
        /// The entity kind of the offending identifier.
        kind: EntityKind,
        /// The raw index of the offending identifier.
        index: u32,
    },

    /// A numeric or structural argument is not acceptable.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Description of what was wrong.
        reason: String,
    },

    /// Creating the entity would exceed the per-kind maximum count.
    #[error("too many {kind} entities")]
    LengthError {
        /// The entity kind whose pool is exhausted.
        kind: EntityKind,
    },
}

impl PhysicsError {
    /// Create a wrong-state error for the named operation.
    #[must_use]
    pub fn wrong_state(operation: &'static str) -> Self {
        Self::WrongState { operation }
    }

    /// Create an out-of-range error.
    #[must_use]
    pub fn out_of_range(kind: EntityKind, index: u32) -> Self {
        Self::OutOfRange { kind, index }
    }

    /// Create an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a length error.
    #[must_use]
    pub fn length_error(kind: EntityKind) -> Self {
        Self::LengthError { kind }
    }

    /// Check whether this is a wrong-state error.
    #[must_use]
    pub fn is_wrong_state(&self) -> bool {
        matches!(self, Self::WrongState { .. })
    }

    /// Check whether this is an out-of-range error.
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PhysicsError::out_of_range(EntityKind::Body, 42);
        assert!(err.to_string().contains("body"));
        assert!(err.to_string().contains("42"));

        let err = PhysicsError::wrong_state("create_body");
        assert!(err.to_string().contains("create_body"));

        let err = PhysicsError::invalid_argument("polygon needs 3 vertices");
        assert!(err.to_string().contains("3 vertices"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(PhysicsError::wrong_state("step").is_wrong_state());
        assert!(!PhysicsError::wrong_state("step").is_out_of_range());
        assert!(PhysicsError::out_of_range(EntityKind::Joint, 1).is_out_of_range());
    }
}
