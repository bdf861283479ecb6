//! Planar math primitives.
//!
//! The engine works in two dimensions with `f64` throughout. Rotations are
//! stored as an explicit cosine/sine pair ([`Rot`]) rather than as an angle,
//! so that transforming points never re-evaluates trigonometric functions and
//! replays are bit-reproducible. Poses ([`Pose2`]) combine a translation with
//! a rotation; sweeps ([`Sweep`]) describe the motion of a body's center of
//! mass across a step for continuous collision.
//!
//! Vector and matrix storage comes from `nalgebra`; this module adds the
//! planar cross-product helpers and the small guarded linear solves that the
//! constraint solvers are built on.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Planar vector of two `f64` components.
pub type Vec2 = nalgebra::Vector2<f64>;

/// Three-component `f64` vector, used by 3x3 constraint blocks.
pub type Vec3 = nalgebra::Vector3<f64>;

/// 2x2 `f64` matrix.
pub type Mat22 = nalgebra::Matrix2<f64>;

/// 3x3 `f64` matrix.
pub type Mat33 = nalgebra::Matrix3<f64>;

/// Planar cross product: `a.x * b.y - a.y * b.x`.
#[must_use]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar (out-of-plane) and a vector: `s x v`.
#[must_use]
pub fn cross_sv(s: f64, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Cross product of a vector and a scalar (out-of-plane): `v x s`.
#[must_use]
pub fn cross_vs(v: Vec2, s: f64) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Counter-clockwise perpendicular of a vector.
#[must_use]
pub fn perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Normalize an angle into the half-open interval `(-pi, +pi]`.
///
/// The mapping is periodic: `normalize_angle(a + 2 * pi * k)` equals
/// `normalize_angle(a)` for any integer `k`.
#[must_use]
pub fn normalize_angle(angle: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let wrapped = angle - two_pi * (angle / two_pi).floor();
    if wrapped > std::f64::consts::PI {
        wrapped - two_pi
    } else {
        wrapped
    }
}

/// Solve `m * x = b` for a 2x2 system.
///
/// Returns the zero vector when the matrix is singular; the constraint
/// solvers treat that as a degenerate row contributing no impulse.
#[must_use]
pub fn solve22(m: &Mat22, b: Vec2) -> Vec2 {
    let mut det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(
        det * (m[(1, 1)] * b.x - m[(0, 1)] * b.y),
        det * (m[(0, 0)] * b.y - m[(1, 0)] * b.x),
    )
}

/// Solve `m * x = b` for a 3x3 system using Cramer's rule.
///
/// Returns the zero vector when the matrix is singular.
#[must_use]
pub fn solve33(m: &Mat33, b: Vec3) -> Vec3 {
    let ex = Vec3::new(m[(0, 0)], m[(1, 0)], m[(2, 0)]);
    let ey = Vec3::new(m[(0, 1)], m[(1, 1)], m[(2, 1)]);
    let ez = Vec3::new(m[(0, 2)], m[(1, 2)], m[(2, 2)]);
    let mut det = ex.dot(&ey.cross(&ez));
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec3::new(
        det * b.dot(&ey.cross(&ez)),
        det * ex.dot(&b.cross(&ez)),
        det * ex.dot(&ey.cross(&b)),
    )
}

/// Solve the upper-left 2x2 block of a 3x3 system.
///
/// Used by joint limit solvers that fold an inactive third row away.
#[must_use]
pub fn solve33_22(m: &Mat33, b: Vec2) -> Vec2 {
    let mut det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(
        det * (m[(1, 1)] * b.x - m[(0, 1)] * b.y),
        det * (m[(0, 0)] * b.y - m[(1, 0)] * b.x),
    )
}

/// Invert a 2x2 matrix, returning the zero matrix when singular.
#[must_use]
pub fn inverse22(m: &Mat22) -> Mat22 {
    let mut det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
    if det != 0.0 {
        det = 1.0 / det;
    }
    Mat22::new(
        det * m[(1, 1)],
        -det * m[(0, 1)],
        -det * m[(1, 0)],
        det * m[(0, 0)],
    )
}

/// Invert a symmetric 3x3 matrix, returning the zero matrix when singular.
///
/// Only the symmetric part of the input participates; the result is exactly
/// symmetric, which the weld joint relies on for its effective mass.
#[must_use]
pub fn sym_inverse33(m: &Mat33) -> Mat33 {
    let (a11, a12, a13) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (a22, a23, a33) = (m[(1, 1)], m[(1, 2)], m[(2, 2)]);
    let mut det = a11 * (a22 * a33 - a23 * a23) - a12 * (a12 * a33 - a13 * a23)
        + a13 * (a12 * a23 - a13 * a22);
    if det != 0.0 {
        det = 1.0 / det;
    }
    let b11 = det * (a22 * a33 - a23 * a23);
    let b12 = det * (a13 * a23 - a12 * a33);
    let b13 = det * (a12 * a23 - a13 * a22);
    let b22 = det * (a11 * a33 - a13 * a13);
    let b23 = det * (a12 * a13 - a11 * a23);
    let b33 = det * (a11 * a22 - a12 * a12);
    Mat33::new(b11, b12, b13, b12, b22, b23, b13, b23, b33)
}

/// A planar rotation stored as a unit cosine/sine pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rot {
    /// Cosine of the rotation angle.
    pub cos: f64,
    /// Sine of the rotation angle.
    pub sin: f64,
}

impl Rot {
    /// Create a rotation from an angle in radians.
    #[must_use]
    pub fn new(angle: f64) -> Self {
        Self {
            cos: angle.cos(),
            sin: angle.sin(),
        }
    }

    /// The identity rotation.
    #[must_use]
    pub const fn identity() -> Self {
        Self { cos: 1.0, sin: 0.0 }
    }

    /// Recover the rotation angle in `(-pi, +pi]`.
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.sin.atan2(self.cos)
    }

    /// The rotated X axis `(cos, sin)`.
    #[must_use]
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.cos, self.sin)
    }

    /// The rotated Y axis `(-sin, cos)`.
    #[must_use]
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.sin, self.cos)
    }

    /// Rotate a vector.
    #[must_use]
    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x - self.sin * v.y, self.sin * v.x + self.cos * v.y)
    }

    /// Rotate a vector by the inverse of this rotation.
    #[must_use]
    pub fn inv_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x + self.sin * v.y, -self.sin * v.x + self.cos * v.y)
    }

    /// Compose two rotations: `self` then `other` applied on top.
    #[must_use]
    pub fn mul(&self, other: Self) -> Self {
        Self {
            cos: self.cos * other.cos - self.sin * other.sin,
            sin: self.sin * other.cos + self.cos * other.sin,
        }
    }

    /// Compose the inverse of `self` with `other`.
    #[must_use]
    pub fn inv_mul(&self, other: Self) -> Self {
        Self {
            cos: self.cos * other.cos + self.sin * other.sin,
            sin: self.cos * other.sin - self.sin * other.cos,
        }
    }
}

impl Default for Rot {
    fn default() -> Self {
        Self::identity()
    }
}

/// A planar rigid transform: translation plus rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose2 {
    /// Translation component in world coordinates.
    pub p: Vec2,
    /// Rotation component.
    pub q: Rot,
}

impl Pose2 {
    /// Create a pose from a translation and an angle in radians.
    #[must_use]
    pub fn new(p: Vec2, angle: f64) -> Self {
        Self {
            p,
            q: Rot::new(angle),
        }
    }

    /// Create a pose from a translation and a rotation.
    #[must_use]
    pub const fn from_parts(p: Vec2, q: Rot) -> Self {
        Self { p, q }
    }

    /// The identity pose.
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            p: Vec2::new(0.0, 0.0),
            q: Rot::identity(),
        }
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, v: Vec2) -> Vec2 {
        self.q.rotate(v) + self.p
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, v: Vec2) -> Vec2 {
        self.q.inv_rotate(v - self.p)
    }

    /// Compose two poses: the result maps `other`-local points to world.
    #[must_use]
    pub fn mul(&self, other: Self) -> Self {
        Self {
            p: self.q.rotate(other.p) + self.p,
            q: self.q.mul(other.q),
        }
    }

    /// Compose the inverse of `self` with `other`: maps `other`-local points
    /// into `self`-local coordinates.
    #[must_use]
    pub fn inv_mul(&self, other: Self) -> Self {
        Self {
            p: self.q.inv_rotate(other.p - self.p),
            q: self.q.inv_mul(other.q),
        }
    }
}

impl Default for Pose2 {
    fn default() -> Self {
        Self::identity()
    }
}

/// Linear position plus angular orientation of a body's center of mass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    /// Center-of-mass location in world coordinates.
    pub linear: Vec2,
    /// Orientation angle in radians.
    pub angular: f64,
}

impl Position {
    /// Create a position from linear and angular parts.
    #[must_use]
    pub const fn new(linear: Vec2, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// Linear interpolation between two positions.
    #[must_use]
    pub fn lerp(&self, other: &Self, beta: f64) -> Self {
        Self {
            linear: self.linear * (1.0 - beta) + other.linear * beta,
            angular: self.angular * (1.0 - beta) + other.angular * beta,
        }
    }

    /// Whether both components are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.x.is_finite() && self.linear.y.is_finite() && self.angular.is_finite()
    }
}

impl std::ops::Add for Position {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            linear: self.linear + rhs.linear,
            angular: self.angular + rhs.angular,
        }
    }
}

impl std::ops::Sub for Position {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            linear: self.linear - rhs.linear,
            angular: self.angular - rhs.angular,
        }
    }
}

/// Linear plus angular velocity of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Velocity {
    /// Linear velocity of the center of mass, meters per second.
    pub linear: Vec2,
    /// Angular velocity, radians per second.
    pub angular: f64,
}

impl Velocity {
    /// Create a velocity from linear and angular parts.
    #[must_use]
    pub const fn new(linear: Vec2, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// The zero velocity.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            linear: Vec2::new(0.0, 0.0),
            angular: 0.0,
        }
    }

    /// Whether both components are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.x.is_finite() && self.linear.y.is_finite() && self.angular.is_finite()
    }
}

impl std::ops::Add for Velocity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            linear: self.linear + rhs.linear,
            angular: self.angular + rhs.angular,
        }
    }
}

impl std::ops::Mul<f64> for Velocity {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self {
            linear: self.linear * rhs,
            angular: self.angular * rhs,
        }
    }
}

/// Motion of a body's center of mass over a step, for continuous collision.
///
/// `pos0` is the pose at sub-step time `alpha0`, `pos1` the pose at the end
/// of the step. The stored positions locate the center of mass; the body
/// origin is recovered by shifting back through the rotated `local_center`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sweep {
    /// Center of mass in body-local coordinates.
    pub local_center: Vec2,
    /// Center-of-mass position at time `alpha0` of the step.
    pub pos0: Position,
    /// Center-of-mass position at the end of the step.
    pub pos1: Position,
    /// Fraction of the step already consumed by TOI advancement, in `[0, 1)`.
    pub alpha0: f64,
}

impl Sweep {
    /// Create a sweep at rest at the given position.
    #[must_use]
    pub fn new(local_center: Vec2, pos: Position) -> Self {
        Self {
            local_center,
            pos0: pos,
            pos1: pos,
            alpha0: 0.0,
        }
    }

    /// Interpolated body-origin pose at normalized time `beta` in `[0, 1]`,
    /// where 0 is `pos0` and 1 is `pos1`.
    #[must_use]
    pub fn pose_at(&self, beta: f64) -> Pose2 {
        let pos = self.pos0.lerp(&self.pos1, beta);
        let q = Rot::new(pos.angular);
        Pose2 {
            p: pos.linear - q.rotate(self.local_center),
            q,
        }
    }

    /// Advance `pos0` to the given absolute step fraction `alpha`.
    ///
    /// Requires `alpha0 <= alpha < 1`.
    pub fn advance0(&mut self, alpha: f64) {
        debug_assert!(self.alpha0 <= alpha && alpha < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.pos0 = self.pos0.lerp(&self.pos1, beta);
        self.alpha0 = alpha;
    }

    /// Remove whole rotations from the stored angles, keeping their
    /// difference intact.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * std::f64::consts::PI;
        let d = two_pi * (self.pos0.angular / two_pi).floor();
        self.pos0.angular -= d;
        self.pos1.angular -= d;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_cross_products() {
        let a = Vec2::new(1.0, 0.0);
        let b = Vec2::new(0.0, 1.0);
        assert_eq!(cross(a, b), 1.0);
        assert_eq!(cross(b, a), -1.0);
        assert_eq!(cross_sv(2.0, a), Vec2::new(0.0, 2.0));
        assert_eq!(cross_vs(a, 2.0), Vec2::new(0.0, -2.0));
    }

    #[test]
    fn test_normalize_angle_range() {
        for k in -4i32..=4 {
            for &a in &[0.0, 0.5, 1.5, PI - 1e-9, -0.5, -1.5, -PI + 1e-9] {
                let shifted = a + f64::from(k) * 2.0 * PI;
                let n = normalize_angle(shifted);
                assert!(n > -PI && n <= PI, "out of range: {n}");
                assert_relative_eq!(n, a, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_normalize_angle_boundaries() {
        assert_relative_eq!(normalize_angle(PI), PI);
        assert_relative_eq!(normalize_angle(-PI), PI);
        assert_relative_eq!(normalize_angle(3.0 * PI), PI, epsilon = 1e-9);
        assert_relative_eq!(normalize_angle(1.5 * PI), -0.5 * PI, epsilon = 1e-12);
        assert_eq!(normalize_angle(0.5 * PI), 0.5 * PI);
    }

    #[test]
    fn test_transform_round_trip() {
        let xf = Pose2::new(Vec2::new(-0.3, 0.7), 2.1);
        for &(x, y) in &[(1.0, 0.0), (0.0, -1.0), (0.6, 0.8), (-0.4, 0.2)] {
            let p = Vec2::new(x, y);
            let round = xf.transform_point(xf.inverse_transform_point(p));
            assert_relative_eq!(round.x, p.x, epsilon = 1e-5);
            assert_relative_eq!(round.y, p.y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_pose_composition() {
        let a = Pose2::new(Vec2::new(1.0, 0.0), PI / 2.0);
        let b = Pose2::new(Vec2::new(0.0, 1.0), 0.0);
        let ab = a.mul(b);
        let p = ab.transform_point(Vec2::new(0.0, 0.0));
        let q = a.transform_point(b.transform_point(Vec2::new(0.0, 0.0)));
        assert_relative_eq!(p.x, q.x, epsilon = 1e-12);
        assert_relative_eq!(p.y, q.y, epsilon = 1e-12);

        let rel = a.inv_mul(ab);
        assert_relative_eq!(rel.p.x, b.p.x, epsilon = 1e-12);
        assert_relative_eq!(rel.p.y, b.p.y, epsilon = 1e-12);
    }

    #[test]
    fn test_solve22_matches_inverse() {
        let m = Mat22::new(4.0, 1.0, 2.0, 3.0);
        let b = Vec2::new(1.0, -2.0);
        let x = solve22(&m, b);
        let back = m * x;
        assert_relative_eq!(back.x, b.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, b.y, epsilon = 1e-12);
    }

    #[test]
    fn test_solve22_singular_returns_zero() {
        let m = Mat22::new(1.0, 2.0, 2.0, 4.0);
        assert_eq!(solve22(&m, Vec2::new(1.0, 1.0)), Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_solve33_matches_inverse() {
        let m = Mat33::new(3.0, 1.0, 0.0, 1.0, 4.0, 1.0, 0.0, 1.0, 5.0);
        let b = Vec3::new(1.0, 2.0, 3.0);
        let x = solve33(&m, b);
        let back = m * x;
        for i in 0..3 {
            assert_relative_eq!(back[i], b[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sym_inverse33() {
        let m = Mat33::new(3.0, 1.0, 0.5, 1.0, 4.0, 1.0, 0.5, 1.0, 5.0);
        let inv = sym_inverse33(&m);
        let id = m * inv;
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(id[(i, j)], expect, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_sweep_pose_at() {
        let mut sweep = Sweep::new(Vec2::new(0.0, 0.0), Position::new(Vec2::new(0.0, 0.0), 0.0));
        sweep.pos1 = Position::new(Vec2::new(2.0, 0.0), PI);
        let half = sweep.pose_at(0.5);
        assert_relative_eq!(half.p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(half.q.angle(), PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sweep_advance0() {
        let mut sweep = Sweep::new(Vec2::new(0.0, 0.0), Position::new(Vec2::new(0.0, 0.0), 0.0));
        sweep.pos1 = Position::new(Vec2::new(4.0, 0.0), 0.0);
        sweep.advance0(0.5);
        assert_relative_eq!(sweep.pos0.linear.x, 2.0, epsilon = 1e-12);
        assert_eq!(sweep.alpha0, 0.5);
        // Interpolation start moved; the end pose is unchanged.
        assert_relative_eq!(sweep.pose_at(1.0).p.x, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sweep_with_offset_center() {
        let sweep = Sweep::new(Vec2::new(1.0, 0.0), Position::new(Vec2::new(3.0, 0.0), 0.0));
        // Body origin is center minus rotated local center.
        assert_relative_eq!(sweep.pose_at(0.0).p.x, 2.0, epsilon = 1e-12);
    }
}
