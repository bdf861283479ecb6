//! Ray casting against shapes.
//!
//! Rays are parameterized as `p1 + t * (p2 - p1)` for `t` in
//! `[0, max_fraction]`. A hit reports the fraction and the outward surface
//! normal at the hit point; rays starting inside a shape miss it.

use planar_types::{cross, Pose2, Vec2};

use crate::shape::{CircleShape, EdgeShape, PolygonShape};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A ray cast request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RayCastInput {
    /// Ray origin.
    pub p1: Vec2,
    /// Ray target; the ray ends here when `max_fraction` is 1.
    pub p2: Vec2,
    /// Fraction of the segment to consider, usually 1.
    pub max_fraction: f64,
}

impl RayCastInput {
    /// Create a ray from `p1` to `p2` considered over its full length.
    #[must_use]
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }
}

/// A ray cast hit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RayCastOutput {
    /// Outward surface normal at the hit point, in world coordinates.
    pub normal: Vec2,
    /// Hit fraction along the ray, in `[0, max_fraction]`.
    pub fraction: f64,
}

/// Cast a ray against a circle.
#[must_use]
pub fn ray_cast_circle(
    circle: &CircleShape,
    xf: &Pose2,
    input: &RayCastInput,
) -> Option<RayCastOutput> {
    let position = xf.transform_point(circle.position);
    let s = input.p1 - position;
    let b = s.norm_squared() - circle.radius * circle.radius;

    let r = input.p2 - input.p1;
    let c = s.dot(&r);
    let rr = r.norm_squared();
    let sigma = c * c - rr * b;

    if sigma < 0.0 || rr < f64::EPSILON {
        return None;
    }

    let t = -(c + sigma.sqrt());
    if 0.0 <= t && t <= input.max_fraction * rr {
        let t = t / rr;
        let normal = (s + r * t).normalize();
        return Some(RayCastOutput {
            normal,
            fraction: t,
        });
    }
    None
}

/// Cast a ray against an edge.
#[must_use]
pub fn ray_cast_edge(edge: &EdgeShape, xf: &Pose2, input: &RayCastInput) -> Option<RayCastOutput> {
    // Work in the edge's frame.
    let p1 = xf.inverse_transform_point(input.p1);
    let p2 = xf.inverse_transform_point(input.p2);
    let d = p2 - p1;

    let v1 = edge.v1;
    let v2 = edge.v2;
    let e = v2 - v1;
    let len = e.norm();
    if len < f64::EPSILON {
        return None;
    }
    let normal = Vec2::new(e.y, -e.x) / len;

    // p = p1 + t * d crosses the edge plane where dot(normal, v1 - p) = 0.
    let numerator = normal.dot(&(v1 - p1));
    let denominator = normal.dot(&d);
    if denominator == 0.0 {
        return None;
    }

    let t = numerator / denominator;
    if t < 0.0 || input.max_fraction < t {
        return None;
    }

    let q = p1 + d * t;

    // The crossing must land within the segment.
    let s = (q - v1).dot(&e) / (len * len);
    if !(0.0..=1.0).contains(&s) {
        return None;
    }

    let world_normal = xf.q.rotate(normal);
    Some(RayCastOutput {
        normal: if numerator > 0.0 {
            -world_normal
        } else {
            world_normal
        },
        fraction: t,
    })
}

/// Cast a ray against a convex polygon.
#[must_use]
pub fn ray_cast_polygon(
    polygon: &PolygonShape,
    xf: &Pose2,
    input: &RayCastInput,
) -> Option<RayCastOutput> {
    let p1 = xf.inverse_transform_point(input.p1);
    let p2 = xf.inverse_transform_point(input.p2);
    let d = p2 - p1;

    let mut lower = 0.0;
    let mut upper = input.max_fraction;
    let mut index: Option<usize> = None;

    for (i, (v, n)) in polygon
        .vertices()
        .iter()
        .zip(polygon.normals())
        .enumerate()
    {
        // p = p1 + t * d; the half-plane i requires dot(n, v - p) >= 0.
        let numerator = n.dot(&(v - p1));
        let denominator = n.dot(&d);

        if denominator == 0.0 {
            if numerator < 0.0 {
                return None;
            }
        } else {
            let t = numerator / denominator;
            if denominator < 0.0 && t > lower {
                // The ray enters this half-plane.
                lower = t;
                index = Some(i);
            } else if denominator > 0.0 && t < upper {
                // The ray exits this half-plane.
                upper = t;
            }
        }

        if upper < lower {
            return None;
        }
    }

    index.map(|i| RayCastOutput {
        normal: xf.q.rotate(polygon.normals()[i]),
        fraction: lower,
    })
}

/// Segment-versus-AABB test used by the broad-phase tree descent.
///
/// Returns true when the segment from `p1` toward `p2` (up to
/// `max_fraction`) can intersect the box.
#[must_use]
pub fn segment_intersects_aabb(
    p1: Vec2,
    p2: Vec2,
    max_fraction: f64,
    aabb: &crate::aabb::Aabb,
) -> bool {
    let end = p1 + (p2 - p1) * max_fraction;
    let segment_aabb = crate::aabb::Aabb::new(
        Vec2::new(p1.x.min(end.x), p1.y.min(end.y)),
        Vec2::new(p1.x.max(end.x), p1.y.max(end.y)),
    );
    if !aabb.overlaps(&segment_aabb) {
        return false;
    }

    // Separating-axis check on the segment normal.
    let d = p2 - p1;
    let center = aabb.center();
    let half = (aabb.max - aabb.min) * 0.5;
    let separation = cross(d, center - p1).abs();
    let radius = half.x * d.y.abs() + half.y * d.x.abs();
    separation <= radius
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::aabb::Aabb;
    use approx::assert_relative_eq;

    #[test]
    fn test_ray_hits_circle() {
        let circle = CircleShape::new(1.0);
        let xf = Pose2::new(Vec2::new(5.0, 0.0), 0.0);
        let input = RayCastInput::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let hit = ray_cast_circle(&circle, &xf, &input).unwrap();
        assert_relative_eq!(hit.fraction, 0.4, epsilon = 1e-12);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_misses_circle() {
        let circle = CircleShape::new(1.0);
        let xf = Pose2::new(Vec2::new(5.0, 3.0), 0.0);
        let input = RayCastInput::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        assert!(ray_cast_circle(&circle, &xf, &input).is_none());
    }

    #[test]
    fn test_ray_from_inside_circle_misses() {
        let circle = CircleShape::new(1.0);
        let xf = Pose2::identity();
        let input = RayCastInput::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        assert!(ray_cast_circle(&circle, &xf, &input).is_none());
    }

    #[test]
    fn test_ray_hits_polygon_face() {
        let poly = PolygonShape::new_box(1.0, 1.0);
        let xf = Pose2::new(Vec2::new(5.0, 0.0), 0.0);
        let input = RayCastInput::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let hit = ray_cast_polygon(&poly, &xf, &input).unwrap();
        assert_relative_eq!(hit.fraction, 0.4, epsilon = 1e-12);
        assert_eq!(hit.normal, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn test_ray_hits_edge() {
        let edge = EdgeShape::new(Vec2::new(-1.0, 1.0), Vec2::new(1.0, 1.0));
        let xf = Pose2::identity();
        let input = RayCastInput::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 2.0));
        let hit = ray_cast_edge(&edge, &xf, &input).unwrap();
        assert_relative_eq!(hit.fraction, 0.5, epsilon = 1e-12);
        assert!(hit.normal.y < 0.0, "normal faces the ray origin");
    }

    #[test]
    fn test_ray_misses_edge_beyond_end() {
        let edge = EdgeShape::new(Vec2::new(-1.0, 1.0), Vec2::new(1.0, 1.0));
        let xf = Pose2::identity();
        let input = RayCastInput::new(Vec2::new(5.0, 0.0), Vec2::new(5.0, 2.0));
        assert!(ray_cast_edge(&edge, &xf, &input).is_none());
    }

    #[test]
    fn test_segment_aabb_rejection() {
        let aabb = Aabb::from_center(Vec2::new(5.0, 5.0), Vec2::new(1.0, 1.0));
        assert!(segment_intersects_aabb(
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 10.0),
            1.0,
            &aabb
        ));
        assert!(!segment_intersects_aabb(
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            1.0,
            &aabb
        ));
    }
}
