//! Collision filtering data.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Category/mask/group collision filter carried by every fixture.
///
/// Two fixtures may generate contacts only when their filters agree:
///
/// - If both have the same non-zero `group_index`, they collide exactly when
///   that index is positive (negative groups never self-collide).
/// - Otherwise the category/mask rule applies: each side's category bits must
///   intersect the other side's mask bits.
///
/// The predicate is symmetric in its two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Filter {
    /// Category bits of this fixture. Usually a single bit is set.
    pub category_bits: u16,
    /// Mask of categories this fixture accepts collisions with.
    pub mask_bits: u16,
    /// Group override. Fixtures sharing a positive group always collide;
    /// fixtures sharing a negative group never collide; zero defers to the
    /// category/mask rule.
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    /// Whether two filters permit a collision between their fixtures.
    #[must_use]
    pub fn should_collide(&self, other: &Self) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.category_bits & other.mask_bits) != 0 && (other.category_bits & self.mask_bits) != 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collides_with_default() {
        let a = Filter::default();
        let b = Filter::default();
        assert!(a.should_collide(&b));
    }

    #[test]
    fn test_category_mask_rule() {
        let a = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0004,
            group_index: 0,
        };
        let b = Filter {
            category_bits: 0x0004,
            mask_bits: 0x0002,
            group_index: 0,
        };
        let c = Filter {
            category_bits: 0x0008,
            mask_bits: 0xFFFF,
            group_index: 0,
        };
        assert!(a.should_collide(&b));
        // a's mask does not accept c's category.
        assert!(!a.should_collide(&c));
    }

    #[test]
    fn test_group_overrides_mask() {
        let mut a = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0000,
            group_index: 3,
        };
        let mut b = Filter {
            category_bits: 0x0004,
            mask_bits: 0x0000,
            group_index: 3,
        };
        // Masks forbid it, but the shared positive group wins.
        assert!(a.should_collide(&b));

        a.group_index = -3;
        b.group_index = -3;
        a.mask_bits = 0xFFFF;
        b.mask_bits = 0xFFFF;
        // Masks allow it, but the shared negative group wins.
        assert!(!a.should_collide(&b));
    }

    #[test]
    fn test_symmetry() {
        let samples = [
            Filter::default(),
            Filter {
                category_bits: 0x0002,
                mask_bits: 0x0005,
                group_index: 0,
            },
            Filter {
                category_bits: 0x0010,
                mask_bits: 0xFFFF,
                group_index: -2,
            },
            Filter {
                category_bits: 0x0020,
                mask_bits: 0x0000,
                group_index: 2,
            },
        ];
        for a in &samples {
            for b in &samples {
                assert_eq!(a.should_collide(b), b.should_collide(a));
            }
        }
    }
}
