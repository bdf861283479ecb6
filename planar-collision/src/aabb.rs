//! Axis-aligned bounding boxes for broad-phase collision detection.

use planar_types::Vec2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec2,
    /// Maximum corner.
    pub max: Vec2,
}

impl Aabb {
    /// Create an AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// An inverted AABB that any point or box will grow.
    #[must_use]
    pub fn inverted() -> Self {
        Self {
            min: Vec2::new(f64::INFINITY, f64::INFINITY),
            max: Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Perimeter of the box, the surface-area metric used by tree insertion.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        let d = self.max - self.min;
        2.0 * (d.x + d.y)
    }

    /// Check if this AABB overlaps another.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Check if this AABB fully contains another.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    /// The smallest AABB containing both operands.
    #[must_use]
    pub fn combined(&self, other: &Self) -> Self {
        Self {
            min: Vec2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Vec2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Grow the box by a constant margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vec2::new(margin, margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Grow the box into a broad-phase fat AABB: a constant `extension` on
    /// all sides plus `multiplier * displacement` applied in the direction of
    /// motion only.
    #[must_use]
    pub fn fattened(&self, extension: f64, displacement: Vec2, multiplier: f64) -> Self {
        let mut fat = self.expanded(extension);
        let d = displacement * multiplier;
        if d.x < 0.0 {
            fat.min.x += d.x;
        } else {
            fat.max.x += d.x;
        }
        if d.y < 0.0 {
            fat.min.y += d.y;
        } else {
            fat.max.y += d.y;
        }
        fat
    }

    /// Translate the box by an offset.
    #[must_use]
    pub fn translated(&self, offset: Vec2) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_overlaps() {
        let a = Aabb::from_center(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::from_center(Vec2::new(1.5, 0.0), Vec2::new(1.0, 1.0));
        let c = Aabb::from_center(Vec2::new(5.0, 0.0), Vec2::new(1.0, 1.0));

        assert!(a.overlaps(&b), "a and b should overlap");
        assert!(b.overlaps(&a), "overlap should be symmetric");
        assert!(!a.overlaps(&c), "a and c should not overlap");
    }

    #[test]
    fn test_contains() {
        let outer = Aabb::from_center(Vec2::new(0.0, 0.0), Vec2::new(2.0, 2.0));
        let inner = Aabb::from_center(Vec2::new(0.5, 0.5), Vec2::new(1.0, 1.0));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer), "containment is reflexive");
    }

    #[test]
    fn test_combined_and_perimeter() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(2.0, 2.0), Vec2::new(3.0, 3.0));
        let c = a.combined(&b);
        assert_eq!(c.min, Vec2::new(0.0, 0.0));
        assert_eq!(c.max, Vec2::new(3.0, 3.0));
        assert_eq!(c.perimeter(), 12.0);
    }

    #[test]
    fn test_fattened_directional() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let fat = a.fattened(0.1, Vec2::new(0.5, -0.25), 2.0);
        assert_eq!(fat.min.x, -0.1);
        assert_eq!(fat.max.x, 1.1 + 1.0);
        assert_eq!(fat.min.y, -0.1 - 0.5);
        assert_eq!(fat.max.y, 1.1);
    }

    #[test]
    fn test_inverted_grows() {
        let grown = Aabb::inverted().combined(&Aabb::new(Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0)));
        assert_eq!(grown.min, Vec2::new(1.0, 2.0));
        assert_eq!(grown.max, Vec2::new(3.0, 4.0));
    }
}
