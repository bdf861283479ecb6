//! Collision shapes.
//!
//! Shapes are pure geometry in body-local coordinates; material properties
//! (density, friction, restitution) live on fixtures. The engine supports a
//! closed set of shape kinds dispatched by pattern match:
//!
//! - [`CircleShape`] - a disk
//! - [`EdgeShape`] - a line segment, optionally with ghost vertices carrying
//!   chain-neighbor context
//! - [`PolygonShape`] - a convex counter-clockwise polygon of at most
//!   [`MAX_POLYGON_VERTICES`](crate::MAX_POLYGON_VERTICES) vertices
//! - [`ChainShape`] - a sequence of edges with implicit ghost connectivity
//!
//! Every shape carries a *vertex radius* (skin) that inflates its contact
//! geometry; manifold generation keeps points within the sum of the two
//! shapes' radii, which makes resting contact numerically robust.

use planar_types::{cross, PhysicsError, Pose2, Result, Vec2};

use crate::aabb::Aabb;
use crate::distance::DistanceProxy;
use crate::raycast::{RayCastInput, RayCastOutput};
use crate::MAX_POLYGON_VERTICES;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default skin radius given to polygons, edges, and chains.
///
/// One linear slop, so that shapes in resting contact keep a thin collision
/// cushion the position solver never fully removes.
pub const DEFAULT_VERTEX_RADIUS: f64 = planar_types::DEFAULT_LINEAR_SLOP;

/// Mass, center of mass, and rotational inertia of a shape at unit scale.
///
/// The inertia is measured about the shape-local origin; the owning body
/// shifts it to its center of mass when recomputing mass data.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassData {
    /// Mass in kilograms.
    pub mass: f64,
    /// Center of mass in shape-local coordinates.
    pub center: Vec2,
    /// Rotational inertia about the shape-local origin, kg*m^2.
    pub rotational_inertia: f64,
}

/// A disk centered at `position` in body-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CircleShape {
    /// Radius of the disk. Doubles as the shape's vertex radius.
    pub radius: f64,
    /// Center in body-local coordinates.
    pub position: Vec2,
}

impl CircleShape {
    /// Create a circle of the given radius centered on the body origin.
    #[must_use]
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            position: Vec2::new(0.0, 0.0),
        }
    }

    /// Create a circle of the given radius at a body-local offset.
    #[must_use]
    pub fn with_position(radius: f64, position: Vec2) -> Self {
        Self { radius, position }
    }
}

/// A line segment from `v1` to `v2`, optionally with ghost vertices.
///
/// Ghost vertices identify the neighboring chain vertices on either side.
/// Manifold generation consults them to suppress collisions against the
/// edge's back side and against internal vertices owned by a neighbor, which
/// is what lets a body slide over a chain of collinear edges without
/// catching on the seams.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EdgeShape {
    /// First endpoint.
    pub v1: Vec2,
    /// Second endpoint.
    pub v2: Vec2,
    /// Chain vertex preceding `v1`, if any.
    pub ghost1: Option<Vec2>,
    /// Chain vertex following `v2`, if any.
    pub ghost2: Option<Vec2>,
    /// Skin radius.
    pub vertex_radius: f64,
}

impl EdgeShape {
    /// Create a free-standing edge with no ghost vertices.
    #[must_use]
    pub fn new(v1: Vec2, v2: Vec2) -> Self {
        Self {
            v1,
            v2,
            ghost1: None,
            ghost2: None,
            vertex_radius: DEFAULT_VERTEX_RADIUS,
        }
    }

    /// Attach ghost vertices naming the neighboring chain vertices.
    #[must_use]
    pub fn with_ghosts(mut self, ghost1: Option<Vec2>, ghost2: Option<Vec2>) -> Self {
        self.ghost1 = ghost1;
        self.ghost2 = ghost2;
        self
    }
}

/// A convex polygon with counter-clockwise vertices and outward unit normals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PolygonShape {
    vertices: Vec<Vec2>,
    normals: Vec<Vec2>,
    centroid: Vec2,
    /// Skin radius.
    pub vertex_radius: f64,
}

impl PolygonShape {
    /// Build a convex polygon from a point cloud.
    ///
    /// The convex hull of the points is computed; nearly coincident points
    /// (within half a linear slop) are welded first. Fails with
    /// `InvalidArgument` when fewer than three distinct hull vertices remain,
    /// when more than [`MAX_POLYGON_VERTICES`](crate::MAX_POLYGON_VERTICES)
    /// points are supplied, or when any coordinate is non-finite.
    pub fn new(points: &[Vec2]) -> Result<Self> {
        if points.len() < 3 {
            return Err(PhysicsError::invalid_argument(
                "polygon needs at least 3 vertices",
            ));
        }
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::invalid_argument(
                "polygon exceeds the maximum vertex count",
            ));
        }
        for p in points {
            if !(p.x.is_finite() && p.y.is_finite()) {
                return Err(PhysicsError::invalid_argument(
                    "polygon vertex is not finite",
                ));
            }
        }

        let welded = weld_points(points);
        let hull = convex_hull(&welded);
        if hull.len() < 3 {
            return Err(PhysicsError::invalid_argument(
                "polygon is degenerate: fewer than 3 distinct hull vertices",
            ));
        }
        if hull.len() < welded.len() {
            tracing::warn!(
                dropped = welded.len() - hull.len(),
                "non-convex polygon input reduced to its convex hull"
            );
        }

        Ok(Self::from_hull(hull))
    }

    /// Build an axis-aligned box with the given half-extents.
    ///
    /// Vertices run counter-clockwise from the bottom-right corner, so face 0
    /// is the +X face.
    #[must_use]
    pub fn new_box(half_width: f64, half_height: f64) -> Self {
        Self {
            vertices: vec![
                Vec2::new(half_width, -half_height),
                Vec2::new(half_width, half_height),
                Vec2::new(-half_width, half_height),
                Vec2::new(-half_width, -half_height),
            ],
            normals: vec![
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(-1.0, 0.0),
                Vec2::new(0.0, -1.0),
            ],
            centroid: Vec2::new(0.0, 0.0),
            vertex_radius: DEFAULT_VERTEX_RADIUS,
        }
    }

    /// Build a box with the given half-extents, offset and rotated in
    /// body-local coordinates.
    #[must_use]
    pub fn new_box_at(half_width: f64, half_height: f64, center: Vec2, angle: f64) -> Self {
        let mut shape = Self::new_box(half_width, half_height);
        let xf = Pose2::new(center, angle);
        for v in &mut shape.vertices {
            *v = xf.transform_point(*v);
        }
        for n in &mut shape.normals {
            *n = xf.q.rotate(*n);
        }
        shape.centroid = center;
        shape
    }

    fn from_hull(vertices: Vec<Vec2>) -> Self {
        let n = vertices.len();
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let edge = vertices[(i + 1) % n] - vertices[i];
            let normal = Vec2::new(edge.y, -edge.x);
            normals.push(normal / normal.norm());
        }
        let centroid = compute_centroid(&vertices);
        Self {
            vertices,
            normals,
            centroid,
            vertex_radius: DEFAULT_VERTEX_RADIUS,
        }
    }

    /// The counter-clockwise vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    /// The outward unit normals; `normals()[i]` belongs to the face from
    /// vertex `i` to vertex `i + 1`.
    #[must_use]
    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    /// Number of vertices (equals the number of faces).
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// The area centroid in body-local coordinates.
    #[must_use]
    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }
}

/// A sequence of edges through `vertices`, optionally closed into a loop.
///
/// Each child edge receives its chain neighbors as ghost vertices, which the
/// narrow phase uses for smooth sliding across the internal seams.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainShape {
    vertices: Vec<Vec2>,
    is_loop: bool,
    /// Skin radius shared by all child edges.
    pub vertex_radius: f64,
}

impl ChainShape {
    /// Create an open chain through the given vertices.
    ///
    /// Fails with `InvalidArgument` when fewer than two vertices are given or
    /// any coordinate is non-finite.
    pub fn new(vertices: &[Vec2]) -> Result<Self> {
        Self::build(vertices, false, 2)
    }

    /// Create a closed loop through the given vertices.
    pub fn new_loop(vertices: &[Vec2]) -> Result<Self> {
        Self::build(vertices, true, 3)
    }

    fn build(vertices: &[Vec2], is_loop: bool, min_count: usize) -> Result<Self> {
        if vertices.len() < min_count {
            return Err(PhysicsError::invalid_argument(
                "chain needs at least two vertices (three for a loop)",
            ));
        }
        for v in vertices {
            if !(v.x.is_finite() && v.y.is_finite()) {
                return Err(PhysicsError::invalid_argument("chain vertex is not finite"));
            }
        }
        Ok(Self {
            vertices: vertices.to_vec(),
            is_loop,
            vertex_radius: DEFAULT_VERTEX_RADIUS,
        })
    }

    /// The chain vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    /// Whether the chain closes back on its first vertex.
    #[must_use]
    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    /// Number of child edges.
    #[must_use]
    pub fn child_count(&self) -> usize {
        if self.is_loop {
            self.vertices.len()
        } else {
            self.vertices.len() - 1
        }
    }

    /// Materialize child edge `index` with its ghost vertices filled in.
    ///
    /// # Panics
    ///
    /// Panics in debug builds when `index` is out of range.
    #[must_use]
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        debug_assert!(index < self.child_count());
        let n = self.vertices.len();
        let v1 = self.vertices[index];
        let v2 = self.vertices[(index + 1) % n];
        let ghost1 = if self.is_loop {
            Some(self.vertices[(index + n - 1) % n])
        } else if index > 0 {
            Some(self.vertices[index - 1])
        } else {
            None
        };
        let ghost2 = if self.is_loop {
            Some(self.vertices[(index + 2) % n])
        } else if index + 2 < n {
            Some(self.vertices[index + 2])
        } else {
            None
        };
        EdgeShape {
            v1,
            v2,
            ghost1,
            ghost2,
            vertex_radius: self.vertex_radius,
        }
    }
}

/// The closed sum type of collision geometry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// A disk.
    Circle(CircleShape),
    /// A line segment.
    Edge(EdgeShape),
    /// A convex polygon.
    Polygon(PolygonShape),
    /// A sequence of edges.
    Chain(ChainShape),
}

impl Shape {
    /// Create a circle shape.
    #[must_use]
    pub fn circle(radius: f64) -> Self {
        Self::Circle(CircleShape::new(radius))
    }

    /// Create an axis-aligned box shape.
    #[must_use]
    pub fn box_shape(half_width: f64, half_height: f64) -> Self {
        Self::Polygon(PolygonShape::new_box(half_width, half_height))
    }

    /// Create a free-standing edge shape.
    #[must_use]
    pub fn edge(v1: Vec2, v2: Vec2) -> Self {
        Self::Edge(EdgeShape::new(v1, v2))
    }

    /// The shape's skin radius.
    #[must_use]
    pub fn vertex_radius(&self) -> f64 {
        match self {
            Self::Circle(c) => c.radius,
            Self::Edge(e) => e.vertex_radius,
            Self::Polygon(p) => p.vertex_radius,
            Self::Chain(c) => c.vertex_radius,
        }
    }

    /// Number of broad-phase children. One for all kinds except chains,
    /// which expose one child per edge.
    #[must_use]
    pub fn child_count(&self) -> usize {
        match self {
            Self::Circle(_) | Self::Edge(_) | Self::Polygon(_) => 1,
            Self::Chain(c) => c.child_count(),
        }
    }

    /// Tight AABB of child `index` under the given pose.
    #[must_use]
    pub fn compute_aabb(&self, index: usize, xf: &Pose2) -> Aabb {
        match self {
            Self::Circle(c) => {
                let center = xf.transform_point(c.position);
                Aabb::from_center(center, Vec2::new(c.radius, c.radius))
            }
            Self::Edge(e) => edge_aabb(e, xf),
            Self::Polygon(p) => {
                let mut aabb = Aabb::inverted();
                for v in &p.vertices {
                    let w = xf.transform_point(*v);
                    aabb.min.x = aabb.min.x.min(w.x);
                    aabb.min.y = aabb.min.y.min(w.y);
                    aabb.max.x = aabb.max.x.max(w.x);
                    aabb.max.y = aabb.max.y.max(w.y);
                }
                aabb.expanded(p.vertex_radius)
            }
            Self::Chain(c) => edge_aabb(&c.child_edge(index), xf),
        }
    }

    /// Mass properties at the given density.
    ///
    /// Edges and chains have no area and report zero mass; they are only
    /// meaningful on static bodies.
    #[must_use]
    pub fn compute_mass(&self, density: f64) -> MassData {
        match self {
            Self::Circle(c) => {
                let mass = density * std::f64::consts::PI * c.radius * c.radius;
                MassData {
                    mass,
                    center: c.position,
                    rotational_inertia: mass
                        * (0.5 * c.radius * c.radius + c.position.dot(&c.position)),
                }
            }
            Self::Edge(e) => MassData {
                mass: 0.0,
                center: (e.v1 + e.v2) * 0.5,
                rotational_inertia: 0.0,
            },
            Self::Polygon(p) => polygon_mass(p, density),
            Self::Chain(c) => {
                let n = c.vertices.len() as f64;
                let center = c.vertices.iter().sum::<Vec2>() / n;
                MassData {
                    mass: 0.0,
                    center,
                    rotational_inertia: 0.0,
                }
            }
        }
    }

    /// Whether a world-space point is inside the shape. Always false for
    /// edges and chains, which enclose no area.
    #[must_use]
    pub fn test_point(&self, xf: &Pose2, point: Vec2) -> bool {
        match self {
            Self::Circle(c) => {
                let center = xf.transform_point(c.position);
                (point - center).norm_squared() <= c.radius * c.radius
            }
            Self::Edge(_) | Self::Chain(_) => false,
            Self::Polygon(p) => {
                let local = xf.inverse_transform_point(point);
                p.vertices
                    .iter()
                    .zip(&p.normals)
                    .all(|(v, n)| n.dot(&(local - v)) <= 0.0)
            }
        }
    }

    /// Cast a ray against child `index`.
    #[must_use]
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Pose2, index: usize) -> Option<RayCastOutput> {
        match self {
            Self::Circle(c) => crate::raycast::ray_cast_circle(c, xf, input),
            Self::Edge(e) => crate::raycast::ray_cast_edge(e, xf, input),
            Self::Polygon(p) => crate::raycast::ray_cast_polygon(p, xf, input),
            Self::Chain(c) => crate::raycast::ray_cast_edge(&c.child_edge(index), xf, input),
        }
    }

    /// Distance proxy for child `index`, for GJK and TOI queries.
    #[must_use]
    pub fn distance_proxy(&self, index: usize) -> DistanceProxy {
        match self {
            Self::Circle(c) => DistanceProxy::new(vec![c.position], c.radius),
            Self::Edge(e) => DistanceProxy::new(vec![e.v1, e.v2], e.vertex_radius),
            Self::Polygon(p) => DistanceProxy::new(p.vertices.clone(), p.vertex_radius),
            Self::Chain(c) => {
                let edge = c.child_edge(index);
                DistanceProxy::new(vec![edge.v1, edge.v2], c.vertex_radius)
            }
        }
    }
}

fn edge_aabb(e: &EdgeShape, xf: &Pose2) -> Aabb {
    let p1 = xf.transform_point(e.v1);
    let p2 = xf.transform_point(e.v2);
    Aabb::new(
        Vec2::new(p1.x.min(p2.x), p1.y.min(p2.y)),
        Vec2::new(p1.x.max(p2.x), p1.y.max(p2.y)),
    )
    .expanded(e.vertex_radius)
}

fn weld_points(points: &[Vec2]) -> Vec<Vec2> {
    let weld_distance_squared =
        (0.5 * planar_types::DEFAULT_LINEAR_SLOP) * (0.5 * planar_types::DEFAULT_LINEAR_SLOP);
    let mut unique: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points {
        if unique
            .iter()
            .all(|q| (p - q).norm_squared() > weld_distance_squared)
        {
            unique.push(*p);
        }
    }
    unique
}

/// Gift-wrap a counter-clockwise convex hull, starting from the
/// rightmost-lowest point.
fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut start = 0;
    for (i, p) in points.iter().enumerate() {
        let s = points[start];
        if p.x > s.x || (p.x == s.x && p.y < s.y) {
            start = i;
        }
    }

    let mut hull_indices = Vec::with_capacity(points.len());
    let mut current = start;
    loop {
        hull_indices.push(current);
        if hull_indices.len() > points.len() {
            break;
        }
        let mut next = 0;
        for j in 1..points.len() {
            if next == current {
                next = j;
                continue;
            }
            let r = points[next] - points[current];
            let v = points[j] - points[current];
            let c = cross(r, v);
            if c < 0.0 {
                next = j;
            }
            // Collinear: keep the farthest candidate.
            if c == 0.0 && v.norm_squared() > r.norm_squared() {
                next = j;
            }
        }
        current = next;
        if current == start {
            break;
        }
    }
    hull_indices.into_iter().map(|i| points[i]).collect()
}

fn compute_centroid(vertices: &[Vec2]) -> Vec2 {
    let s = vertices[0];
    let mut area = 0.0;
    let mut center = Vec2::new(0.0, 0.0);
    for i in 1..vertices.len() - 1 {
        let e1 = vertices[i] - s;
        let e2 = vertices[i + 1] - s;
        let a = 0.5 * cross(e1, e2);
        area += a;
        center += (e1 + e2) * (a / 3.0);
    }
    s + center / area
}

fn polygon_mass(p: &PolygonShape, density: f64) -> MassData {
    let s = p.vertices[0];
    let mut area = 0.0;
    let mut center = Vec2::new(0.0, 0.0);
    let mut inertia = 0.0;

    for i in 1..p.vertices.len() - 1 {
        let e1 = p.vertices[i] - s;
        let e2 = p.vertices[i + 1] - s;
        let d = cross(e1, e2);
        let triangle_area = 0.5 * d;
        area += triangle_area;
        center += (e1 + e2) * (triangle_area / 3.0);

        let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
        let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
        inertia += (0.25 / 3.0) * d * (int_x2 + int_y2);
    }

    center /= area;
    let mass = density * area;
    let world_center = s + center;
    // Shift the reference-point inertia to the shape origin.
    let rotational_inertia =
        density * inertia + mass * (world_center.dot(&world_center) - center.dot(&center));
    MassData {
        mass,
        center: world_center,
        rotational_inertia,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_layout() {
        let p = PolygonShape::new_box(2.0, 4.0);
        assert_eq!(p.vertices()[0], Vec2::new(2.0, -4.0));
        assert_eq!(p.vertices()[1], Vec2::new(2.0, 4.0));
        assert_eq!(p.vertices()[2], Vec2::new(-2.0, 4.0));
        assert_eq!(p.vertices()[3], Vec2::new(-2.0, -4.0));
        assert_eq!(p.normals()[0], Vec2::new(1.0, 0.0));
        assert_eq!(p.normals()[2], Vec2::new(-1.0, 0.0));
        assert_eq!(p.centroid(), Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_hull_matches_box_layout() {
        // Shuffled box corners must hull to the canonical ordering.
        let points = [
            Vec2::new(-1.0, 1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, 1.0),
        ];
        let p = PolygonShape::new(&points).unwrap();
        assert_eq!(p.vertices(), PolygonShape::new_box(1.0, 1.0).vertices());
    }

    #[test]
    fn test_hull_drops_interior_point() {
        let points = [
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
            Vec2::new(-1.0, -1.0),
            Vec2::new(0.0, 0.0),
        ];
        let p = PolygonShape::new(&points).unwrap();
        assert_eq!(p.vertex_count(), 4);
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let collinear = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
        ];
        assert!(PolygonShape::new(&collinear).is_err());

        let too_few = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)];
        assert!(PolygonShape::new(&too_few).is_err());

        let non_finite = [
            Vec2::new(0.0, 0.0),
            Vec2::new(f64::NAN, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        assert!(PolygonShape::new(&non_finite).is_err());
    }

    #[test]
    fn test_circle_mass() {
        let shape = Shape::Circle(CircleShape::with_position(2.0, Vec2::new(1.0, 0.0)));
        let md = shape.compute_mass(1.5);
        let expected_mass = 1.5 * std::f64::consts::PI * 4.0;
        assert_relative_eq!(md.mass, expected_mass, epsilon = 1e-12);
        assert_eq!(md.center, Vec2::new(1.0, 0.0));
        assert_relative_eq!(
            md.rotational_inertia,
            expected_mass * (0.5 * 4.0 + 1.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_box_mass() {
        let shape = Shape::box_shape(1.0, 1.0);
        let md = shape.compute_mass(1.0);
        assert_relative_eq!(md.mass, 4.0, epsilon = 1e-12);
        assert_relative_eq!(md.center.x, 0.0, epsilon = 1e-12);
        // Rectangle inertia about its center: m * (w^2 + h^2) / 12.
        assert_relative_eq!(md.rotational_inertia, 4.0 * (4.0 + 4.0) / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_polygon_test_point() {
        let shape = Shape::box_shape(1.0, 1.0);
        let xf = Pose2::new(Vec2::new(10.0, 0.0), 0.0);
        assert!(shape.test_point(&xf, Vec2::new(10.5, 0.5)));
        assert!(!shape.test_point(&xf, Vec2::new(12.0, 0.0)));
    }

    #[test]
    fn test_chain_children_and_ghosts() {
        let vertices = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(3.0, 0.0),
        ];
        let chain = ChainShape::new(&vertices).unwrap();
        assert_eq!(chain.child_count(), 3);

        let first = chain.child_edge(0);
        assert_eq!(first.ghost1, None);
        assert_eq!(first.ghost2, Some(Vec2::new(2.0, 0.0)));

        let middle = chain.child_edge(1);
        assert_eq!(middle.ghost1, Some(Vec2::new(0.0, 0.0)));
        assert_eq!(middle.ghost2, Some(Vec2::new(3.0, 0.0)));

        let last = chain.child_edge(2);
        assert_eq!(last.ghost1, Some(Vec2::new(1.0, 0.0)));
        assert_eq!(last.ghost2, None);
    }

    #[test]
    fn test_loop_children_wrap() {
        let vertices = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.5, 1.0),
        ];
        let chain = ChainShape::new_loop(&vertices).unwrap();
        assert_eq!(chain.child_count(), 3);
        let last = chain.child_edge(2);
        assert_eq!(last.v1, Vec2::new(0.5, 1.0));
        assert_eq!(last.v2, Vec2::new(0.0, 0.0));
        assert_eq!(last.ghost1, Some(Vec2::new(1.0, 0.0)));
        assert_eq!(last.ghost2, Some(Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn test_aabb_includes_skin() {
        let shape = Shape::box_shape(1.0, 1.0);
        let aabb = shape.compute_aabb(0, &Pose2::identity());
        assert!(aabb.min.x < -1.0);
        assert!(aabb.max.x > 1.0);
        assert_relative_eq!(aabb.max.x, 1.0 + DEFAULT_VERTEX_RADIUS);
    }
}
