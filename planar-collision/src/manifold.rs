//! Contact manifolds and segment clipping.
//!
//! A manifold is the narrow phase's description of a touching pair: at most
//! two contact points expressed in the local frame of a reference shape,
//! together with a reference normal. Each point carries a [`ContactFeature`]
//! naming the vertex or face of either shape that produced it; the solver
//! matches features across updates to carry accumulated impulses forward.
//!
//! World-space contact data (normal, points, separations) is derived on
//! demand by [`WorldManifold`] rather than stored, so a manifold stays valid
//! while its bodies move.

use planar_types::{Pose2, Vec2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether a contact feature refers to a vertex or a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FeatureType {
    /// A shape vertex.
    #[default]
    Vertex,
    /// A shape face.
    Face,
}

/// The pair of shape features that produced a contact point.
///
/// Points whose features match across a manifold update are the "same"
/// contact and keep their accumulated impulses; all other points restart
/// from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactFeature {
    /// Feature type on shape A.
    pub type_a: FeatureType,
    /// Feature index on shape A.
    pub index_a: u8,
    /// Feature type on shape B.
    pub type_b: FeatureType,
    /// Feature index on shape B.
    pub index_b: u8,
}

impl ContactFeature {
    /// A vertex-vertex feature.
    #[must_use]
    pub const fn vertex_vertex(index_a: u8, index_b: u8) -> Self {
        Self {
            type_a: FeatureType::Vertex,
            index_a,
            type_b: FeatureType::Vertex,
            index_b,
        }
    }

    /// A face-vertex feature.
    #[must_use]
    pub const fn face_vertex(index_a: u8, index_b: u8) -> Self {
        Self {
            type_a: FeatureType::Face,
            index_a,
            type_b: FeatureType::Vertex,
            index_b,
        }
    }

    /// The same feature with the A and B sides exchanged.
    #[must_use]
    pub const fn flipped(self) -> Self {
        Self {
            type_a: self.type_b,
            index_a: self.index_b,
            type_b: self.type_a,
            index_b: self.index_a,
        }
    }
}

/// One contact point of a manifold.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManifoldPoint {
    /// Contact location in the non-reference shape's local frame (for
    /// circle manifolds: shape B's frame).
    pub local_point: Vec2,
    /// Accumulated normal impulse, carried across steps on feature match.
    pub normal_impulse: f64,
    /// Accumulated tangent impulse, carried across steps on feature match.
    pub tangent_impulse: f64,
    /// The producing feature pair.
    pub feature: ContactFeature,
}

/// The reference-shape classification of a manifold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ManifoldKind {
    /// Two round shapes; the normal follows the center difference.
    Circles,
    /// Shape A's face is the reference.
    FaceA,
    /// Shape B's face is the reference.
    FaceB,
}

/// Up to two contact points for one touching shape pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Manifold {
    /// Reference classification.
    pub kind: ManifoldKind,
    /// Reference face normal in the reference shape's local frame.
    /// Meaningless for circle manifolds.
    pub local_normal: Vec2,
    /// Reference point in the reference shape's local frame (for circle
    /// manifolds: shape A's center).
    pub local_point: Vec2,
    points: [ManifoldPoint; 2],
    count: u8,
}

impl Manifold {
    /// A manifold with no points (the shapes are not touching).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kind: ManifoldKind::Circles,
            local_normal: Vec2::new(0.0, 0.0),
            local_point: Vec2::new(0.0, 0.0),
            points: [ManifoldPoint::default(); 2],
            count: 0,
        }
    }

    /// A one-point circles manifold.
    #[must_use]
    pub fn circles(local_point_a: Vec2, local_point_b: Vec2, feature: ContactFeature) -> Self {
        let mut m = Self::empty();
        m.kind = ManifoldKind::Circles;
        m.local_point = local_point_a;
        m.push_point(ManifoldPoint {
            local_point: local_point_b,
            feature,
            ..ManifoldPoint::default()
        });
        m
    }

    /// An empty face-A manifold ready for points.
    #[must_use]
    pub fn face_a(local_normal: Vec2, local_point: Vec2) -> Self {
        let mut m = Self::empty();
        m.kind = ManifoldKind::FaceA;
        m.local_normal = local_normal;
        m.local_point = local_point;
        m
    }

    /// An empty face-B manifold ready for points.
    #[must_use]
    pub fn face_b(local_normal: Vec2, local_point: Vec2) -> Self {
        let mut m = Self::empty();
        m.kind = ManifoldKind::FaceB;
        m.local_normal = local_normal;
        m.local_point = local_point;
        m
    }

    /// Append a point.
    ///
    /// # Panics
    ///
    /// Panics in debug builds when the manifold already has two points.
    pub fn push_point(&mut self, point: ManifoldPoint) {
        debug_assert!(self.count < 2);
        self.points[self.count as usize] = point;
        self.count += 1;
    }

    /// Number of contact points, 0..=2.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.count as usize
    }

    /// The contact points.
    #[must_use]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.count as usize]
    }

    /// The contact points, mutably.
    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.count as usize]
    }

    /// Whether the manifold has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Carry accumulated impulses over from an older manifold wherever the
    /// contact features match; all other points keep zero impulses.
    pub fn carry_impulses_from(&mut self, old: &Self) {
        for point in self.points_mut() {
            for old_point in old.points() {
                if old_point.feature == point.feature {
                    point.normal_impulse = old_point.normal_impulse;
                    point.tangent_impulse = old_point.tangent_impulse;
                    break;
                }
            }
        }
    }
}

impl Default for Manifold {
    fn default() -> Self {
        Self::empty()
    }
}

/// World-space view of a manifold: unit normal from A to B, contact points,
/// and per-point signed separations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldManifold {
    /// Unit contact normal pointing from shape A to shape B.
    pub normal: Vec2,
    /// World contact points (midway between the shape surfaces).
    pub points: [Vec2; 2],
    /// Signed surface separations; negative means penetration.
    pub separations: [f64; 2],
    /// Number of valid entries, matching the manifold's point count.
    pub count: usize,
}

impl WorldManifold {
    /// Derive world-space contact data from a manifold and the two shapes'
    /// poses and skin radii.
    #[must_use]
    pub fn new(manifold: &Manifold, xf_a: &Pose2, radius_a: f64, xf_b: &Pose2, radius_b: f64) -> Self {
        let mut result = Self {
            normal: Vec2::new(1.0, 0.0),
            points: [Vec2::new(0.0, 0.0); 2],
            separations: [0.0; 2],
            count: manifold.point_count(),
        };
        if manifold.is_empty() {
            return result;
        }

        match manifold.kind {
            ManifoldKind::Circles => {
                let point_a = xf_a.transform_point(manifold.local_point);
                let point_b = xf_b.transform_point(manifold.points()[0].local_point);
                if (point_b - point_a).norm_squared() > f64::EPSILON * f64::EPSILON {
                    result.normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + result.normal * radius_a;
                let c_b = point_b - result.normal * radius_b;
                result.points[0] = (c_a + c_b) * 0.5;
                result.separations[0] = (point_b - point_a).dot(&result.normal) - radius_a - radius_b;
            }
            ManifoldKind::FaceA => {
                result.normal = xf_a.q.rotate(manifold.local_normal);
                let plane_point = xf_a.transform_point(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_b.transform_point(mp.local_point);
                    let depth = (clip_point - plane_point).dot(&result.normal);
                    let c_a = clip_point + result.normal * (radius_a - depth);
                    let c_b = clip_point - result.normal * radius_b;
                    result.points[i] = (c_a + c_b) * 0.5;
                    result.separations[i] = depth - radius_a - radius_b;
                }
            }
            ManifoldKind::FaceB => {
                let normal = xf_b.q.rotate(manifold.local_normal);
                let plane_point = xf_b.transform_point(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_a.transform_point(mp.local_point);
                    let depth = (clip_point - plane_point).dot(&normal);
                    let c_b = clip_point + normal * (radius_b - depth);
                    let c_a = clip_point - normal * radius_a;
                    result.points[i] = (c_a + c_b) * 0.5;
                    result.separations[i] = depth - radius_a - radius_b;
                }
                // Keep the convention: the normal points from A to B.
                result.normal = -normal;
            }
        }
        result
    }
}

/// A clip-list vertex: a position plus the feature that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipVertex {
    /// Vertex position.
    pub v: Vec2,
    /// Producing feature.
    pub feature: ContactFeature,
}

/// A fixed-capacity list of at most two clip vertices.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipList {
    points: [ClipVertex; 2],
    count: u8,
}

impl ClipList {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vertex.
    ///
    /// # Panics
    ///
    /// Panics in debug builds when the list is full.
    pub fn push(&mut self, vertex: ClipVertex) {
        debug_assert!(self.count < 2);
        self.points[self.count as usize] = vertex;
        self.count += 1;
    }

    /// Number of vertices, 0..=2.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The vertices.
    #[must_use]
    pub fn points(&self) -> &[ClipVertex] {
        &self.points[..self.count as usize]
    }
}

impl std::ops::Index<usize> for ClipList {
    type Output = ClipVertex;

    fn index(&self, index: usize) -> &ClipVertex {
        &self.points()[index]
    }
}

/// Sutherland-Hodgman clip of a two-vertex segment against the half-plane
/// `dot(normal, p) - offset <= 0`.
///
/// Vertices on the keep side pass through unchanged; a crossing produces an
/// interpolated vertex whose feature records `vertex_index_a` on side A.
#[must_use]
pub fn clip_segment_to_line(
    input: &ClipList,
    normal: Vec2,
    offset: f64,
    vertex_index_a: u8,
) -> ClipList {
    let mut output = ClipList::new();
    if input.len() < 2 {
        return output;
    }

    let distance0 = normal.dot(&input[0].v) - offset;
    let distance1 = normal.dot(&input[1].v) - offset;

    if distance0 <= 0.0 {
        output.push(input[0]);
    }
    if distance1 <= 0.0 {
        output.push(input[1]);
    }

    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        output.push(ClipVertex {
            v: input[0].v + (input[1].v - input[0].v) * interp,
            feature: ContactFeature {
                type_a: FeatureType::Vertex,
                index_a: vertex_index_a,
                type_b: FeatureType::Vertex,
                index_b: input[0].feature.index_b,
            },
        });
    }

    output
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn segment(a: Vec2, b: Vec2) -> ClipList {
        let mut list = ClipList::new();
        list.push(ClipVertex {
            v: a,
            feature: ContactFeature::vertex_vertex(0, 0),
        });
        list.push(ClipVertex {
            v: b,
            feature: ContactFeature::vertex_vertex(0, 1),
        });
        list
    }

    #[test]
    fn test_clip_keep_side_unchanged() {
        let input = segment(Vec2::new(-1.0, 0.0), Vec2::new(-2.0, 1.0));
        let output = clip_segment_to_line(&input, Vec2::new(1.0, 0.0), 0.0, 7);
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].v, input[0].v);
        assert_eq!(output[1].v, input[1].v);
        assert_eq!(output[0].feature, input[0].feature);
    }

    #[test]
    fn test_clip_cull_side_empty() {
        let input = segment(Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0));
        let output = clip_segment_to_line(&input, Vec2::new(1.0, 0.0), 0.5, 7);
        assert!(output.is_empty());
    }

    #[test]
    fn test_clip_crossing_interpolates() {
        let input = segment(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let output = clip_segment_to_line(&input, Vec2::new(1.0, 0.0), 0.0, 7);
        assert_eq!(output.len(), 2);
        // Keep-side endpoint survives.
        assert_eq!(output[0].v, Vec2::new(-1.0, 0.0));
        // Intersection lands on the clip line and records the clip vertex.
        assert_relative_eq!(output[1].v.x, 0.0, epsilon = 1e-12);
        assert_eq!(output[1].feature.index_a, 7);
        assert_eq!(output[1].feature.type_a, FeatureType::Vertex);
    }

    #[test]
    fn test_feature_flip() {
        let f = ContactFeature::face_vertex(3, 5);
        let g = f.flipped();
        assert_eq!(g.type_a, FeatureType::Vertex);
        assert_eq!(g.index_a, 5);
        assert_eq!(g.type_b, FeatureType::Face);
        assert_eq!(g.index_b, 3);
        assert_eq!(g.flipped(), f);
    }

    #[test]
    fn test_impulse_carry_by_feature() {
        let feature = ContactFeature::face_vertex(0, 2);
        let other = ContactFeature::face_vertex(0, 3);

        let mut old = Manifold::face_a(Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.0));
        old.push_point(ManifoldPoint {
            local_point: Vec2::new(0.0, 0.0),
            normal_impulse: 2.5,
            tangent_impulse: -0.5,
            feature,
        });

        let mut new = Manifold::face_a(Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.0));
        new.push_point(ManifoldPoint {
            local_point: Vec2::new(0.1, 0.0),
            feature,
            ..ManifoldPoint::default()
        });
        new.push_point(ManifoldPoint {
            local_point: Vec2::new(0.2, 0.0),
            feature: other,
            ..ManifoldPoint::default()
        });

        new.carry_impulses_from(&old);
        assert_eq!(new.points()[0].normal_impulse, 2.5);
        assert_eq!(new.points()[0].tangent_impulse, -0.5);
        assert_eq!(new.points()[1].normal_impulse, 0.0);
        assert_eq!(new.points()[1].tangent_impulse, 0.0);
    }

    #[test]
    fn test_world_manifold_circles() {
        let manifold = Manifold::circles(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0),
            ContactFeature::vertex_vertex(0, 0),
        );
        let xf_a = Pose2::new(Vec2::new(0.0, 0.0), 0.0);
        let xf_b = Pose2::new(Vec2::new(1.5, 0.0), 0.0);
        let wm = WorldManifold::new(&manifold, &xf_a, 1.0, &xf_b, 1.0);
        assert_eq!(wm.normal, Vec2::new(1.0, 0.0));
        assert_relative_eq!(wm.separations[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(wm.points[0].x, 0.75, epsilon = 1e-12);
    }
}
