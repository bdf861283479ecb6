//! Narrow-phase manifold generation.
//!
//! Pure functions from `(shape A, pose A, shape B, pose B)` to a
//! [`Manifold`], dispatched on the pair of shape kinds:
//!
//! - circle-circle: one point, normal along the center difference
//! - polygon-circle: the polygon face of maximum separation is the reference
//! - polygon-polygon: reference-face selection plus Sutherland-Hodgman
//!   clipping of the incident edge
//! - edge-circle and edge-polygon: the edge's ghost vertices gate which
//!   Voronoi regions may produce contact, so chains collide only on their
//!   front side and internal vertices stay silent
//!
//! [`collide_shapes`] accepts the shapes in either order and flips the
//! resulting manifold when the specialized routine wanted them swapped, so
//! contacts can keep their fixtures in a canonical order independent of
//! shape kind.

use planar_types::{cross, Pose2, Vec2, DEFAULT_ANGULAR_SLOP, DEFAULT_LINEAR_SLOP};

use crate::manifold::{
    clip_segment_to_line, ClipList, ClipVertex, ContactFeature, FeatureType, Manifold,
    ManifoldKind, ManifoldPoint,
};
use crate::shape::{CircleShape, EdgeShape, PolygonShape, Shape};

/// Compute the contact manifold for two shape children in world space.
///
/// The result is expressed with shape A as the first operand; when the
/// underlying routine requires the opposite order (for example a circle
/// against a polygon), the manifold is flipped back.
#[must_use]
pub fn collide_shapes(
    shape_a: &Shape,
    child_a: usize,
    xf_a: &Pose2,
    shape_b: &Shape,
    child_b: usize,
    xf_b: &Pose2,
) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_circle(a, xf_a, b, xf_b),
        (Shape::Circle(a), Shape::Polygon(b)) => {
            flip_manifold(&collide_polygon_circle(b, xf_b, a, xf_a))
        }
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Circle(b)) => collide_edge_circle(a, xf_a, b, xf_b),
        (Shape::Circle(a), Shape::Edge(b)) => {
            flip_manifold(&collide_edge_circle(b, xf_b, a, xf_a))
        }
        (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_polygon(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Edge(b)) => {
            flip_manifold(&collide_edge_polygon(b, xf_b, a, xf_a))
        }
        (Shape::Chain(a), _) => {
            let edge = Shape::Edge(a.child_edge(child_a));
            collide_shapes(&edge, 0, xf_a, shape_b, child_b, xf_b)
        }
        (_, Shape::Chain(b)) => {
            let edge = Shape::Edge(b.child_edge(child_b));
            collide_shapes(shape_a, child_a, xf_a, &edge, 0, xf_b)
        }
        // Edges enclose no area; edge-edge pairs never touch.
        (Shape::Edge(_), Shape::Edge(_)) => Manifold::empty(),
    }
}

/// Exchange the A and B roles of a manifold.
#[must_use]
pub fn flip_manifold(manifold: &Manifold) -> Manifold {
    if manifold.is_empty() {
        return Manifold::empty();
    }
    match manifold.kind {
        ManifoldKind::Circles => {
            let p = manifold.points()[0];
            let mut m = Manifold::circles(p.local_point, manifold.local_point, p.feature.flipped());
            m.points_mut()[0].normal_impulse = p.normal_impulse;
            m.points_mut()[0].tangent_impulse = p.tangent_impulse;
            m
        }
        ManifoldKind::FaceA | ManifoldKind::FaceB => {
            let mut m = if manifold.kind == ManifoldKind::FaceA {
                Manifold::face_b(manifold.local_normal, manifold.local_point)
            } else {
                Manifold::face_a(manifold.local_normal, manifold.local_point)
            };
            for p in manifold.points() {
                m.push_point(ManifoldPoint {
                    feature: p.feature.flipped(),
                    ..*p
                });
            }
            m
        }
    }
}

/// Circle versus circle.
#[must_use]
pub fn collide_circles(
    circle_a: &CircleShape,
    xf_a: &Pose2,
    circle_b: &CircleShape,
    xf_b: &Pose2,
) -> Manifold {
    let p_a = xf_a.transform_point(circle_a.position);
    let p_b = xf_b.transform_point(circle_b.position);
    let d = p_b - p_a;
    let r = circle_a.radius + circle_b.radius;
    if d.norm_squared() > r * r {
        return Manifold::empty();
    }
    Manifold::circles(
        circle_a.position,
        circle_b.position,
        ContactFeature::vertex_vertex(0, 0),
    )
}

/// Polygon versus circle: the polygon face of maximum separation against the
/// circle center is the reference.
#[must_use]
pub fn collide_polygon_circle(
    polygon_a: &PolygonShape,
    xf_a: &Pose2,
    circle_b: &CircleShape,
    xf_b: &Pose2,
) -> Manifold {
    let center = xf_a.inverse_transform_point(xf_b.transform_point(circle_b.position));
    let radius = polygon_a.vertex_radius + circle_b.radius;

    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let mut normal_index = 0;
    let mut separation = f64::NEG_INFINITY;
    for (i, (v, n)) in vertices.iter().zip(normals).enumerate() {
        let s = n.dot(&(center - v));
        if s > radius {
            return Manifold::empty();
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let next = (normal_index + 1) % vertices.len();
    let v1 = vertices[normal_index];
    let v2 = vertices[next];

    // Center inside the polygon: use the reference face directly.
    if separation < f64::EPSILON {
        let mut m = Manifold::face_a(normals[normal_index], (v1 + v2) * 0.5);
        m.push_point(ManifoldPoint {
            local_point: circle_b.position,
            feature: ContactFeature::face_vertex(normal_index as u8, 0),
            ..ManifoldPoint::default()
        });
        return m;
    }

    let u1 = (center - v1).dot(&(v2 - v1));
    let u2 = (center - v2).dot(&(v1 - v2));
    if u1 <= 0.0 {
        // Vertex region v1.
        if (center - v1).norm_squared() > radius * radius {
            return Manifold::empty();
        }
        let mut m = Manifold::face_a((center - v1).normalize(), v1);
        m.push_point(ManifoldPoint {
            local_point: circle_b.position,
            feature: ContactFeature::vertex_vertex(normal_index as u8, 0),
            ..ManifoldPoint::default()
        });
        m
    } else if u2 <= 0.0 {
        // Vertex region v2.
        if (center - v2).norm_squared() > radius * radius {
            return Manifold::empty();
        }
        let mut m = Manifold::face_a((center - v2).normalize(), v2);
        m.push_point(ManifoldPoint {
            local_point: circle_b.position,
            feature: ContactFeature::vertex_vertex(next as u8, 0),
            ..ManifoldPoint::default()
        });
        m
    } else {
        // Face region.
        let face_center = (v1 + v2) * 0.5;
        if (center - face_center).dot(&normals[normal_index]) > radius {
            return Manifold::empty();
        }
        let mut m = Manifold::face_a(normals[normal_index], face_center);
        m.push_point(ManifoldPoint {
            local_point: circle_b.position,
            feature: ContactFeature::face_vertex(normal_index as u8, 0),
            ..ManifoldPoint::default()
        });
        m
    }
}

/// Largest separation of `poly2`'s hull from any face of `poly1`, and the
/// face index achieving it.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Pose2,
    poly2: &PolygonShape,
    xf2: &Pose2,
) -> (usize, f64) {
    // Work in poly2's frame.
    let xf = xf2.inv_mul(*xf1);
    let mut best_index = 0;
    let mut max_separation = f64::NEG_INFINITY;
    for (i, (v, n)) in poly1.vertices().iter().zip(poly1.normals()).enumerate() {
        let n2 = xf.q.rotate(*n);
        let v2 = xf.transform_point(*v);
        let mut s = f64::INFINITY;
        for w in poly2.vertices() {
            s = s.min(n2.dot(&(w - v2)));
        }
        if s > max_separation {
            max_separation = s;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// The edge of `poly2` most anti-parallel to face `edge1` of `poly1`, as
/// world-space clip vertices.
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Pose2,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Pose2,
) -> ClipList {
    // Reference normal in poly2's frame.
    let normal1 = xf2.q.inv_rotate(xf1.q.rotate(poly1.normals()[edge1]));

    let normals2 = poly2.normals();
    let mut index = 0;
    let mut min_dot = f64::INFINITY;
    for (i, n) in normals2.iter().enumerate() {
        let d = normal1.dot(n);
        if d < min_dot {
            min_dot = d;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.vertex_count();
    let mut list = ClipList::new();
    list.push(ClipVertex {
        v: xf2.transform_point(poly2.vertices()[i1]),
        feature: ContactFeature::face_vertex(edge1 as u8, i1 as u8),
    });
    list.push(ClipVertex {
        v: xf2.transform_point(poly2.vertices()[i2]),
        feature: ContactFeature::face_vertex(edge1 as u8, i2 as u8),
    });
    list
}

/// Polygon versus polygon via reference-face selection and clipping.
#[must_use]
pub fn collide_polygons(
    poly_a: &PolygonShape,
    xf_a: &Pose2,
    poly_b: &PolygonShape,
    xf_b: &Pose2,
) -> Manifold {
    let total_radius = poly_a.vertex_radius + poly_b.vertex_radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return Manifold::empty();
    }
    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return Manifold::empty();
    }

    // Prefer face A unless face B is distinctly deeper; the tolerance keeps
    // the reference face stable frame to frame so impulses carry.
    let k_tol = 0.1 * DEFAULT_LINEAR_SLOP;
    let (poly1, xf1, poly2, xf2, edge1, flip) = if separation_b > separation_a + k_tol {
        (poly_b, xf_b, poly_a, xf_a, edge_b, true)
    } else {
        (poly_a, xf_a, poly_b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let iv1 = edge1;
    let iv2 = (edge1 + 1) % poly1.vertex_count();
    let local_v11 = poly1.vertices()[iv1];
    let local_v12 = poly1.vertices()[iv2];

    let local_tangent = (local_v12 - local_v11).normalize();
    let local_normal = Vec2::new(local_tangent.y, -local_tangent.x);
    let plane_point = (local_v11 + local_v12) * 0.5;

    let tangent = xf1.q.rotate(local_tangent);
    let normal = Vec2::new(tangent.y, -tangent.x);
    let v11 = xf1.transform_point(local_v11);
    let v12 = xf1.transform_point(local_v12);

    let front_offset = normal.dot(&v11);
    let side_offset1 = -tangent.dot(&v11) + total_radius;
    let side_offset2 = tangent.dot(&v12) + total_radius;

    let clip1 = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1 as u8);
    if clip1.len() < 2 {
        return Manifold::empty();
    }
    let clip2 = clip_segment_to_line(&clip1, tangent, side_offset2, iv2 as u8);
    if clip2.len() < 2 {
        return Manifold::empty();
    }

    let mut manifold = if flip {
        Manifold::face_b(local_normal, plane_point)
    } else {
        Manifold::face_a(local_normal, plane_point)
    };
    for cp in clip2.points() {
        let separation = normal.dot(&cp.v) - front_offset;
        if separation <= total_radius {
            let feature = if flip { cp.feature.flipped() } else { cp.feature };
            manifold.push_point(ManifoldPoint {
                local_point: xf2.inverse_transform_point(cp.v),
                feature,
                ..ManifoldPoint::default()
            });
        }
    }
    if manifold.point_count() == 0 {
        return Manifold::empty();
    }
    manifold
}

/// Edge versus circle with ghost-vertex gating.
///
/// The circle collides with the edge's interior, or with an endpoint only
/// when no neighboring edge owns that Voronoi region.
#[must_use]
pub fn collide_edge_circle(
    edge_a: &EdgeShape,
    xf_a: &Pose2,
    circle_b: &CircleShape,
    xf_b: &Pose2,
) -> Manifold {
    let q = xf_a.inverse_transform_point(xf_b.transform_point(circle_b.position));
    let (a, b) = (edge_a.v1, edge_a.v2);
    let e = b - a;
    let radius = edge_a.vertex_radius + circle_b.radius;

    // Barycentric coordinates of Q on the segment.
    let u = e.dot(&(b - q));
    let v = e.dot(&(q - a));

    if v <= 0.0 {
        // Region A.
        if (q - a).norm_squared() > radius * radius {
            return Manifold::empty();
        }
        // The previous edge owns this vertex when Q projects onto it.
        if let Some(a1) = edge_a.ghost1 {
            let e1 = a - a1;
            if e1.dot(&(a - q)) > 0.0 {
                return Manifold::empty();
            }
        }
        return Manifold::circles(a, circle_b.position, ContactFeature::vertex_vertex(0, 0));
    }

    if u <= 0.0 {
        // Region B.
        if (q - b).norm_squared() > radius * radius {
            return Manifold::empty();
        }
        // The next edge owns this vertex when Q projects onto it.
        if let Some(b2) = edge_a.ghost2 {
            let e2 = b2 - b;
            if e2.dot(&(q - b)) > 0.0 {
                return Manifold::empty();
            }
        }
        return Manifold::circles(b, circle_b.position, ContactFeature::vertex_vertex(1, 0));
    }

    // Region AB: the edge interior.
    let den = e.norm_squared();
    debug_assert!(den > 0.0);
    let p = (a * u + b * v) / den;
    if (q - p).norm_squared() > radius * radius {
        return Manifold::empty();
    }

    let mut n = Vec2::new(-e.y, e.x);
    if n.dot(&(q - a)) < 0.0 {
        n = -n;
    }
    let mut m = Manifold::face_a(n.normalize(), a);
    m.push_point(ManifoldPoint {
        local_point: circle_b.position,
        feature: ContactFeature::face_vertex(0, 0),
        ..ManifoldPoint::default()
    });
    m
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EpAxisKind {
    EdgeA,
    EdgeB,
}

#[derive(Debug, Clone, Copy)]
struct EpAxis {
    kind: EpAxisKind,
    index: usize,
    separation: f64,
}

/// Polygon B expressed in the edge's frame.
struct TempPolygon {
    vertices: Vec<Vec2>,
    normals: Vec<Vec2>,
}

/// Edge versus polygon.
///
/// The polygon is brought into the edge's frame; the edge's ghost vertices
/// and their convexity determine the admissible normal range, so contact
/// normals never point into a neighboring edge's Voronoi region and the
/// edge's back side stays silent when the chain is convex there.
#[must_use]
pub fn collide_edge_polygon(
    edge_a: &EdgeShape,
    xf_a: &Pose2,
    poly_b: &PolygonShape,
    xf_b: &Pose2,
) -> Manifold {
    let xf = xf_a.inv_mul(*xf_b);
    let centroid_b = xf.transform_point(poly_b.centroid());

    let v1 = edge_a.v1;
    let v2 = edge_a.v2;

    let edge1 = (v2 - v1).normalize();
    let normal1 = Vec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(&(centroid_b - v1));

    let mut normal0 = Vec2::new(0.0, 0.0);
    let mut offset0 = 0.0;
    let mut convex1 = false;
    if let Some(v0) = edge_a.ghost1 {
        let edge0 = (v1 - v0).normalize();
        normal0 = Vec2::new(edge0.y, -edge0.x);
        convex1 = cross(edge0, edge1) >= 0.0;
        offset0 = normal0.dot(&(centroid_b - v0));
    }

    let mut normal2 = Vec2::new(0.0, 0.0);
    let mut offset2 = 0.0;
    let mut convex2 = false;
    if let Some(v3) = edge_a.ghost2 {
        let edge2 = (v3 - v2).normalize();
        normal2 = Vec2::new(edge2.y, -edge2.x);
        convex2 = cross(edge1, edge2) >= 0.0;
        offset2 = normal2.dot(&(centroid_b - v2));
    }

    // Admissible-normal range from the neighboring edges' convexity.
    let front;
    let normal;
    let lower_limit;
    let upper_limit;
    match (edge_a.ghost1.is_some(), edge_a.ghost2.is_some()) {
        (true, true) => {
            if convex1 && convex2 {
                front = offset0 >= 0.0 || offset1 >= 0.0 || offset2 >= 0.0;
                if front {
                    normal = normal1;
                    lower_limit = normal0;
                    upper_limit = normal2;
                } else {
                    normal = -normal1;
                    lower_limit = -normal1;
                    upper_limit = -normal1;
                }
            } else if convex1 {
                front = offset0 >= 0.0 || (offset1 >= 0.0 && offset2 >= 0.0);
                if front {
                    normal = normal1;
                    lower_limit = normal0;
                    upper_limit = normal1;
                } else {
                    normal = -normal1;
                    lower_limit = -normal2;
                    upper_limit = -normal1;
                }
            } else if convex2 {
                front = offset2 >= 0.0 || (offset0 >= 0.0 && offset1 >= 0.0);
                if front {
                    normal = normal1;
                    lower_limit = normal1;
                    upper_limit = normal2;
                } else {
                    normal = -normal1;
                    lower_limit = -normal1;
                    upper_limit = -normal0;
                }
            } else {
                front = offset0 >= 0.0 && offset1 >= 0.0 && offset2 >= 0.0;
                if front {
                    normal = normal1;
                    lower_limit = normal1;
                    upper_limit = normal1;
                } else {
                    normal = -normal1;
                    lower_limit = -normal2;
                    upper_limit = -normal0;
                }
            }
        }
        (true, false) => {
            if convex1 {
                front = offset0 >= 0.0 || offset1 >= 0.0;
                if front {
                    normal = normal1;
                    lower_limit = normal0;
                    upper_limit = -normal1;
                } else {
                    normal = -normal1;
                    lower_limit = normal1;
                    upper_limit = -normal1;
                }
            } else {
                front = offset0 >= 0.0 && offset1 >= 0.0;
                if front {
                    normal = normal1;
                    lower_limit = normal1;
                    upper_limit = -normal1;
                } else {
                    normal = -normal1;
                    lower_limit = normal1;
                    upper_limit = -normal0;
                }
            }
        }
        (false, true) => {
            if convex2 {
                front = offset1 >= 0.0 || offset2 >= 0.0;
                if front {
                    normal = normal1;
                    lower_limit = -normal1;
                    upper_limit = normal2;
                } else {
                    normal = -normal1;
                    lower_limit = -normal1;
                    upper_limit = normal1;
                }
            } else {
                front = offset1 >= 0.0 && offset2 >= 0.0;
                if front {
                    normal = normal1;
                    lower_limit = -normal1;
                    upper_limit = normal1;
                } else {
                    normal = -normal1;
                    lower_limit = -normal2;
                    upper_limit = normal1;
                }
            }
        }
        (false, false) => {
            front = offset1 >= 0.0;
            if front {
                normal = normal1;
                lower_limit = -normal1;
                upper_limit = -normal1;
            } else {
                normal = -normal1;
                lower_limit = normal1;
                upper_limit = normal1;
            }
        }
    }

    // Polygon B in the edge frame.
    let polygon_b = TempPolygon {
        vertices: poly_b
            .vertices()
            .iter()
            .map(|p| xf.transform_point(*p))
            .collect(),
        normals: poly_b.normals().iter().map(|n| xf.q.rotate(*n)).collect(),
    };

    let radius = edge_a.vertex_radius + poly_b.vertex_radius;

    // Separation along the edge normal.
    let edge_axis = {
        let mut separation = f64::INFINITY;
        for w in &polygon_b.vertices {
            separation = separation.min(normal.dot(&(w - v1)));
        }
        EpAxis {
            kind: EpAxisKind::EdgeA,
            index: usize::from(!front),
            separation,
        }
    };
    if edge_axis.separation > radius {
        return Manifold::empty();
    }

    // Separation along polygon normals, gated by the admissible range.
    let polygon_axis = {
        let mut axis: Option<EpAxis> = None;
        let perp = Vec2::new(-normal.y, normal.x);
        for i in 0..polygon_b.vertices.len() {
            let n = -polygon_b.normals[i];
            let s1 = n.dot(&(polygon_b.vertices[i] - v1));
            let s2 = n.dot(&(polygon_b.vertices[i] - v2));
            let s = s1.min(s2);
            if s > radius {
                axis = Some(EpAxis {
                    kind: EpAxisKind::EdgeB,
                    index: i,
                    separation: s,
                });
                break;
            }
            // Reject normals pointing outside the admissible arc.
            if n.dot(&perp) >= 0.0 {
                if (n - upper_limit).dot(&normal) < -DEFAULT_ANGULAR_SLOP {
                    continue;
                }
            } else if (n - lower_limit).dot(&normal) < -DEFAULT_ANGULAR_SLOP {
                continue;
            }
            if axis.is_none() || s > axis.map_or(f64::NEG_INFINITY, |a| a.separation) {
                axis = Some(EpAxis {
                    kind: EpAxisKind::EdgeB,
                    index: i,
                    separation: s,
                });
            }
        }
        axis
    };
    if let Some(axis) = polygon_axis {
        if axis.separation > radius {
            return Manifold::empty();
        }
    }

    // Favor the edge axis to keep the manifold stable across frames.
    let k_relative_tol = 0.98;
    let k_absolute_tol = 0.001;
    let primary_axis = match polygon_axis {
        Some(axis) if axis.separation > k_relative_tol * edge_axis.separation + k_absolute_tol => {
            axis
        }
        _ => edge_axis,
    };

    let mut incident = ClipList::new();
    let (reference_kind, rf_i1, rf_i2, rf_v1, rf_v2, rf_normal);
    if primary_axis.kind == EpAxisKind::EdgeA {
        // Incident edge: the polygon face most anti-parallel to the normal.
        let mut best_index = 0;
        let mut best_value = normal.dot(&polygon_b.normals[0]);
        for (i, n) in polygon_b.normals.iter().enumerate().skip(1) {
            let value = normal.dot(n);
            if value < best_value {
                best_value = value;
                best_index = i;
            }
        }
        let i1 = best_index;
        let i2 = (i1 + 1) % polygon_b.vertices.len();
        incident.push(ClipVertex {
            v: polygon_b.vertices[i1],
            feature: ContactFeature::face_vertex(0, i1 as u8),
        });
        incident.push(ClipVertex {
            v: polygon_b.vertices[i2],
            feature: ContactFeature::face_vertex(0, i2 as u8),
        });

        reference_kind = ManifoldKind::FaceA;
        if front {
            rf_i1 = 0_u8;
            rf_i2 = 1_u8;
            rf_v1 = v1;
            rf_v2 = v2;
            rf_normal = normal;
        } else {
            rf_i1 = 1;
            rf_i2 = 0;
            rf_v1 = v2;
            rf_v2 = v1;
            rf_normal = -normal;
        }
    } else {
        incident.push(ClipVertex {
            v: v1,
            feature: ContactFeature {
                type_a: FeatureType::Vertex,
                index_a: 0,
                type_b: FeatureType::Face,
                index_b: primary_axis.index as u8,
            },
        });
        incident.push(ClipVertex {
            v: v2,
            feature: ContactFeature {
                type_a: FeatureType::Vertex,
                index_a: 1,
                type_b: FeatureType::Face,
                index_b: primary_axis.index as u8,
            },
        });

        let i1 = primary_axis.index;
        let i2 = (i1 + 1) % polygon_b.vertices.len();
        reference_kind = ManifoldKind::FaceB;
        rf_i1 = i1 as u8;
        rf_i2 = i2 as u8;
        rf_v1 = polygon_b.vertices[i1];
        rf_v2 = polygon_b.vertices[i2];
        rf_normal = polygon_b.normals[i1];
    }

    let side_normal1 = Vec2::new(rf_normal.y, -rf_normal.x);
    let side_normal2 = -side_normal1;
    let side_offset1 = side_normal1.dot(&rf_v1);
    let side_offset2 = side_normal2.dot(&rf_v2);

    let clip1 = clip_segment_to_line(&incident, side_normal1, side_offset1, rf_i1);
    if clip1.len() < 2 {
        return Manifold::empty();
    }
    let clip2 = clip_segment_to_line(&clip1, side_normal2, side_offset2, rf_i2);
    if clip2.len() < 2 {
        return Manifold::empty();
    }

    let mut manifold = if reference_kind == ManifoldKind::FaceA {
        // Reference data is in the edge frame, which is A-local already.
        Manifold::face_a(rf_normal, rf_v1)
    } else {
        // Reference data comes from the original polygon.
        Manifold::face_b(
            poly_b.normals()[primary_axis.index],
            poly_b.vertices()[primary_axis.index],
        )
    };

    for cp in clip2.points() {
        let separation = rf_normal.dot(&(cp.v - rf_v1));
        if separation <= radius {
            let local_point = if reference_kind == ManifoldKind::FaceA {
                // Back into B-local coordinates.
                xf.inverse_transform_point(cp.v)
            } else {
                // Already edge-local, which is A-local.
                cp.v
            };
            manifold.push_point(ManifoldPoint {
                local_point,
                feature: cp.feature,
                ..ManifoldPoint::default()
            });
        }
    }
    if manifold.point_count() == 0 {
        return Manifold::empty();
    }
    manifold
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::manifold::WorldManifold;
    use approx::assert_relative_eq;

    #[test]
    fn test_circle_circle_horizontal() {
        let a = CircleShape::new(1.0);
        let b = CircleShape::new(1.0);
        let xf_a = Pose2::new(Vec2::new(11.0, -4.0), 0.0);
        let xf_b = Pose2::new(Vec2::new(13.0, -4.0), 0.0);

        let m = collide_circles(&a, &xf_a, &b, &xf_b);
        assert_eq!(m.kind, ManifoldKind::Circles);
        assert_eq!(m.point_count(), 1);
        assert_eq!(m.local_point, a.position);
        assert_eq!(m.points()[0].local_point, b.position);
        let f = m.points()[0].feature;
        assert_eq!(f.type_a, FeatureType::Vertex);
        assert_eq!(f.index_a, 0);
        assert_eq!(f.type_b, FeatureType::Vertex);
        assert_eq!(f.index_b, 0);
    }

    #[test]
    fn test_circle_circle_separated() {
        let a = CircleShape::new(1.0);
        let b = CircleShape::new(1.0);
        let xf_a = Pose2::new(Vec2::new(0.0, 0.0), 0.0);
        let xf_b = Pose2::new(Vec2::new(2.5, 0.0), 0.0);
        assert!(collide_circles(&a, &xf_a, &b, &xf_b).is_empty());
    }

    #[test]
    fn test_identical_squares_face_a() {
        let a = PolygonShape::new_box(2.0, 2.0);
        let b = PolygonShape::new_box(2.0, 2.0);
        let xf_a = Pose2::new(Vec2::new(-2.0, 0.0), 0.0);
        let xf_b = Pose2::new(Vec2::new(2.0, 0.0), 0.0);

        let m = collide_polygons(&a, &xf_a, &b, &xf_b);
        assert_eq!(m.kind, ManifoldKind::FaceA);
        assert_eq!(m.local_normal, Vec2::new(1.0, 0.0));
        assert_eq!(m.local_point, Vec2::new(2.0, 0.0));
        assert_eq!(m.point_count(), 2);

        assert_eq!(m.points()[0].local_point, Vec2::new(-2.0, 2.0));
        assert_eq!(m.points()[1].local_point, Vec2::new(-2.0, -2.0));

        let f0 = m.points()[0].feature;
        assert_eq!(f0.type_a, FeatureType::Face);
        assert_eq!(f0.index_a, 0);
        assert_eq!(f0.type_b, FeatureType::Vertex);
        assert_eq!(f0.index_b, 2);

        let f1 = m.points()[1].feature;
        assert_eq!(f1.type_a, FeatureType::Face);
        assert_eq!(f1.index_a, 0);
        assert_eq!(f1.type_b, FeatureType::Vertex);
        assert_eq!(f1.index_b, 3);
    }

    #[test]
    fn test_polygon_circle_face_region() {
        let poly = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::new(0.5);
        let xf_a = Pose2::identity();
        let xf_b = Pose2::new(Vec2::new(1.4, 0.0), 0.0);

        let m = collide_polygon_circle(&poly, &xf_a, &circle, &xf_b);
        assert_eq!(m.kind, ManifoldKind::FaceA);
        assert_eq!(m.point_count(), 1);
        assert_eq!(m.local_normal, Vec2::new(1.0, 0.0));
        assert_eq!(m.points()[0].local_point, circle.position);
    }

    #[test]
    fn test_polygon_circle_separated() {
        let poly = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::new(0.5);
        let m = collide_polygon_circle(
            &poly,
            &Pose2::identity(),
            &circle,
            &Pose2::new(Vec2::new(3.0, 0.0), 0.0),
        );
        assert!(m.is_empty());
    }

    #[test]
    fn test_flip_restores_ordering() {
        let poly = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::new(0.5);
        let xf_poly = Pose2::identity();
        let xf_circle = Pose2::new(Vec2::new(1.4, 0.0), 0.0);

        let m = collide_shapes(
            &Shape::Circle(circle),
            0,
            &xf_circle,
            &Shape::Polygon(poly),
            0,
            &xf_poly,
        );
        // With the circle as shape A, the polygon's face becomes face B.
        assert_eq!(m.kind, ManifoldKind::FaceB);
        assert_eq!(m.point_count(), 1);
        let f = m.points()[0].feature;
        assert_eq!(f.type_b, FeatureType::Face);

        let wm = WorldManifold::new(&m, &xf_circle, 0.5, &xf_poly, poly_radius());
        // Normal points from the circle (A) toward the polygon (B).
        assert!(wm.normal.x < 0.0);
    }

    fn poly_radius() -> f64 {
        PolygonShape::new_box(1.0, 1.0).vertex_radius
    }

    #[test]
    fn test_edge_circle_interior() {
        let edge = EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let circle = CircleShape::new(0.5);
        let m = collide_edge_circle(
            &edge,
            &Pose2::identity(),
            &circle,
            &Pose2::new(Vec2::new(0.0, 0.4), 0.0),
        );
        assert_eq!(m.kind, ManifoldKind::FaceA);
        assert_eq!(m.point_count(), 1);
        assert!(m.local_normal.y > 0.9);
    }

    #[test]
    fn test_edge_circle_ghost_suppression() {
        // Circle hovering over the shared vertex at (1, 0), projecting onto
        // the neighbor edge from (1,0) to (2,0).
        let circle = CircleShape::new(0.25);
        let xf_circle = Pose2::new(Vec2::new(1.1, 0.2), 0.0);

        let lone = EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let m = collide_edge_circle(&lone, &Pose2::identity(), &circle, &xf_circle);
        assert_eq!(m.point_count(), 1, "without ghosts the vertex collides");

        let chained = lone.with_ghosts(None, Some(Vec2::new(2.0, 0.0)));
        let m = collide_edge_circle(&chained, &Pose2::identity(), &circle, &xf_circle);
        assert!(m.is_empty(), "the neighbor edge owns this vertex region");
    }

    #[test]
    fn test_edge_polygon_front_face() {
        let edge = EdgeShape::new(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0));
        let poly = PolygonShape::new_box(0.5, 0.5);
        let m = collide_edge_polygon(
            &edge,
            &Pose2::identity(),
            &poly,
            &Pose2::new(Vec2::new(0.0, 0.5), 0.0),
        );
        assert_eq!(m.point_count(), 2);
        assert_eq!(m.kind, ManifoldKind::FaceA);

        let wm = WorldManifold::new(
            &m,
            &Pose2::identity(),
            edge.vertex_radius,
            &Pose2::new(Vec2::new(0.0, 0.5), 0.0),
            poly.vertex_radius,
        );
        assert!(wm.normal.y > 0.99, "normal points from edge toward box");
    }

    #[test]
    fn test_edge_polygon_separated() {
        let edge = EdgeShape::new(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0));
        let poly = PolygonShape::new_box(0.5, 0.5);
        let m = collide_edge_polygon(
            &edge,
            &Pose2::identity(),
            &poly,
            &Pose2::new(Vec2::new(0.0, 3.0), 0.0),
        );
        assert!(m.is_empty());
    }

    #[test]
    fn test_collinear_chain_shares_manifold_normal() {
        // A box resting across the seam of two collinear edges: both child
        // manifolds must agree on the vertical normal so nothing snags.
        let chain = crate::shape::ChainShape::new(&[
            Vec2::new(-3.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(3.0, 0.0),
        ])
        .unwrap();
        let shape = Shape::Chain(chain);
        let poly = Shape::box_shape(0.5, 0.5);
        let xf_box = Pose2::new(Vec2::new(0.0, 0.5), 0.0);

        for child in 0..2 {
            let m = collide_shapes(&shape, child, &Pose2::identity(), &poly, 0, &xf_box);
            if m.is_empty() {
                continue;
            }
            let wm = WorldManifold::new(&m, &Pose2::identity(), 0.01, &xf_box, 0.01);
            assert!(wm.normal.y > 0.99, "child {child} normal must stay vertical");
        }
    }
}
