//! GJK closest-distance queries between convex shapes.
//!
//! The solver works on [`DistanceProxy`] point clouds in the Minkowski
//! difference space, tracking a simplex of at most three support vertices.
//! A [`SimplexCache`] carries the terminating simplex's vertex indices from
//! one query to the next; warm-started queries on slowly-moving pairs
//! typically converge in one or two iterations.
//!
//! Used by contact updating (near/far decisions for round shapes), the
//! time-of-impact routine, and anything else that needs witness points.

use planar_types::{cross, Pose2, Vec2};

/// A convex point cloud plus skin radius, the GJK view of one shape child.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceProxy {
    vertices: Vec<Vec2>,
    radius: f64,
}

impl DistanceProxy {
    /// Create a proxy from local-space vertices and a skin radius.
    #[must_use]
    pub fn new(vertices: Vec<Vec2>, radius: f64) -> Self {
        debug_assert!(!vertices.is_empty());
        Self { vertices, radius }
    }

    /// The proxy's vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    /// The proxy's skin radius.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Number of vertices.
    #[must_use]
    pub fn count(&self) -> usize {
        self.vertices.len()
    }

    /// Vertex by index.
    #[must_use]
    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    /// Index of the support vertex: the one with the greatest projection on
    /// the given direction.
    #[must_use]
    pub fn support(&self, direction: Vec2) -> usize {
        let mut best = 0;
        let mut best_value = self.vertices[0].dot(&direction);
        for (i, v) in self.vertices.iter().enumerate().skip(1) {
            let value = v.dot(&direction);
            if value > best_value {
                best = i;
                best_value = value;
            }
        }
        best
    }
}

/// Warm-start data carried between distance queries on the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimplexCache {
    /// Similarity metric of the cached simplex (length or area).
    pub metric: f64,
    /// Number of cached vertices, 0..=3.
    pub count: u8,
    /// Proxy A vertex indices.
    pub index_a: [u8; 3],
    /// Proxy B vertex indices.
    pub index_b: [u8; 3],
}

/// Input to a distance query.
#[derive(Debug, Clone)]
pub struct DistanceInput {
    /// Proxy for shape A.
    pub proxy_a: DistanceProxy,
    /// Proxy for shape B.
    pub proxy_b: DistanceProxy,
    /// World pose of shape A.
    pub xf_a: Pose2,
    /// World pose of shape B.
    pub xf_b: Pose2,
    /// When true, the skin radii shrink the reported distance.
    pub use_radii: bool,
    /// GJK iteration cap.
    pub max_iterations: u32,
}

/// Output of a distance query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceOutput {
    /// Closest point on shape A in world coordinates.
    pub point_a: Vec2,
    /// Closest point on shape B in world coordinates.
    pub point_b: Vec2,
    /// Distance between the closest points (zero when overlapped).
    pub distance: f64,
    /// Iterations used.
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy)]
struct SimplexVertex {
    /// Support point on proxy A in world coordinates.
    w_a: Vec2,
    /// Support point on proxy B in world coordinates.
    w_b: Vec2,
    /// Minkowski-difference point `w_b - w_a`.
    w: Vec2,
    /// Barycentric coordinate of `w` in the closest-point solution.
    a: f64,
    index_a: usize,
    index_b: usize,
}

impl Default for SimplexVertex {
    fn default() -> Self {
        Self {
            w_a: Vec2::new(0.0, 0.0),
            w_b: Vec2::new(0.0, 0.0),
            w: Vec2::new(0.0, 0.0),
            a: 0.0,
            index_a: 0,
            index_b: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    vertices: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Pose2,
        proxy_b: &DistanceProxy,
        xf_b: &Pose2,
    ) -> Self {
        let mut simplex = Self::default();
        simplex.count = cache.count as usize;

        for i in 0..simplex.count {
            let index_a = cache.index_a[i] as usize;
            let index_b = cache.index_b[i] as usize;
            let w_a = xf_a.transform_point(proxy_a.vertex(index_a.min(proxy_a.count() - 1)));
            let w_b = xf_b.transform_point(proxy_b.vertex(index_b.min(proxy_b.count() - 1)));
            simplex.vertices[i] = SimplexVertex {
                w_a,
                w_b,
                w: w_b - w_a,
                a: 0.0,
                index_a,
                index_b,
            };
        }

        // Discard a cached simplex whose metric drifted too far; geometry
        // changed enough that warm starting would mislead the search.
        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f64::EPSILON {
                simplex.count = 0;
            }
        }

        if simplex.count == 0 {
            let w_a = xf_a.transform_point(proxy_a.vertex(0));
            let w_b = xf_b.transform_point(proxy_b.vertex(0));
            simplex.vertices[0] = SimplexVertex {
                w_a,
                w_b,
                w: w_b - w_a,
                a: 1.0,
                index_a: 0,
                index_b: 0,
            };
            simplex.count = 1;
        }
        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count as u8;
        for i in 0..self.count {
            cache.index_a[i] = self.vertices[i].index_a as u8;
            cache.index_b[i] = self.vertices[i].index_b as u8;
        }
    }

    fn metric(&self) -> f64 {
        match self.count {
            1 => 0.0,
            2 => (self.vertices[1].w - self.vertices[0].w).norm(),
            3 => cross(
                self.vertices[1].w - self.vertices[0].w,
                self.vertices[2].w - self.vertices[0].w,
            ),
            _ => 0.0,
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.vertices[0].w,
            2 => {
                let e12 = self.vertices[1].w - self.vertices[0].w;
                let sgn = cross(e12, -self.vertices[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    Vec2::new(-e12.y, e12.x)
                } else {
                    Vec2::new(e12.y, -e12.x)
                }
            }
            _ => Vec2::new(0.0, 0.0),
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.vertices[0].w_a, self.vertices[0].w_b),
            2 => {
                let (v1, v2) = (&self.vertices[0], &self.vertices[1]);
                (
                    v1.w_a * v1.a + v2.w_a * v2.a,
                    v1.w_b * v1.a + v2.w_b * v2.a,
                )
            }
            3 => {
                let (v1, v2, v3) = (&self.vertices[0], &self.vertices[1], &self.vertices[2]);
                let p = v1.w_a * v1.a + v2.w_a * v2.a + v3.w_a * v3.a;
                (p, p)
            }
            _ => (Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0)),
        }
    }

    /// Closest point on a segment simplex to the origin.
    fn solve2(&mut self) {
        let w1 = self.vertices[0].w;
        let w2 = self.vertices[1].w;
        let e12 = w2 - w1;

        let d12_2 = -w1.dot(&e12);
        if d12_2 <= 0.0 {
            // Vertex region w1.
            self.vertices[0].a = 1.0;
            self.count = 1;
            return;
        }

        let d12_1 = w2.dot(&e12);
        if d12_1 <= 0.0 {
            // Vertex region w2.
            self.vertices[1].a = 1.0;
            self.count = 1;
            self.vertices[0] = self.vertices[1];
            return;
        }

        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.vertices[0].a = d12_1 * inv_d12;
        self.vertices[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest point on a triangle simplex to the origin.
    fn solve3(&mut self) {
        let w1 = self.vertices[0].w;
        let w2 = self.vertices[1].w;
        let w3 = self.vertices[2].w;

        let e12 = w2 - w1;
        let w1e12 = w1.dot(&e12);
        let w2e12 = w2.dot(&e12);
        let d12_1 = w2e12;
        let d12_2 = -w1e12;

        let e13 = w3 - w1;
        let w1e13 = w1.dot(&e13);
        let w3e13 = w3.dot(&e13);
        let d13_1 = w3e13;
        let d13_2 = -w1e13;

        let e23 = w3 - w2;
        let w2e23 = w2.dot(&e23);
        let w3e23 = w3.dot(&e23);
        let d23_1 = w3e23;
        let d23_2 = -w2e23;

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // Vertex w1.
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.vertices[0].a = 1.0;
            self.count = 1;
            return;
        }

        // Edge w1-w2.
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.vertices[0].a = d12_1 * inv;
            self.vertices[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        // Edge w1-w3.
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.vertices[0].a = d13_1 * inv;
            self.vertices[2].a = d13_2 * inv;
            self.count = 2;
            self.vertices[1] = self.vertices[2];
            return;
        }

        // Vertex w2.
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.vertices[1].a = 1.0;
            self.count = 1;
            self.vertices[0] = self.vertices[1];
            return;
        }

        // Vertex w3.
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.vertices[2].a = 1.0;
            self.count = 1;
            self.vertices[0] = self.vertices[2];
            return;
        }

        // Edge w2-w3.
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.vertices[1].a = d23_1 * inv;
            self.vertices[2].a = d23_2 * inv;
            self.count = 2;
            self.vertices[0] = self.vertices[2];
            return;
        }

        // Interior: the origin is covered.
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.vertices[0].a = d123_1 * inv;
        self.vertices[1].a = d123_2 * inv;
        self.vertices[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// Compute the closest points between two convex proxies.
///
/// `cache` is both input and output: a matching cached simplex warm-starts
/// the search and the terminating simplex is written back.
#[must_use]
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, &input.xf_a, proxy_b, &input.xf_b);

    let mut iterations = 0;
    let mut save_a = [0_usize; 3];
    let mut save_b = [0_usize; 3];

    while iterations < input.max_iterations {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.vertices[i].index_a;
            save_b[i] = simplex.vertices[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // A full simplex means the origin is inside the Minkowski difference.
        if simplex.count == 3 {
            break;
        }

        let direction = simplex.search_direction();
        if direction.norm_squared() < f64::EPSILON * f64::EPSILON {
            // The origin sits on the simplex boundary. Leave the witness
            // points as they are rather than risking a bogus support.
            break;
        }

        let index_a = proxy_a.support(input.xf_a.q.inv_rotate(-direction));
        let index_b = proxy_b.support(input.xf_b.q.inv_rotate(direction));
        let w_a = input.xf_a.transform_point(proxy_a.vertex(index_a));
        let w_b = input.xf_b.transform_point(proxy_b.vertex(index_b));

        iterations += 1;

        // A repeated support vertex means no further progress is possible.
        let mut duplicate = false;
        for i in 0..save_count {
            if index_a == save_a[i] && index_b == save_b[i] {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            break;
        }

        let count = simplex.count;
        simplex.vertices[count] = SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        };
        simplex.count += 1;
    }

    simplex.write_cache(cache);

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = (point_b - point_a).norm();

    if input.use_radii {
        let r_a = proxy_a.radius();
        let r_b = proxy_b.radius();
        if dist > r_a + r_b && dist > f64::EPSILON {
            // Shapes are separated; project the witness points onto the
            // skin surfaces.
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalize();
            point_a += normal * r_a;
            point_b -= normal * r_b;
        } else {
            // Overlapping skins: collapse onto the midpoint.
            let p = (point_a + point_b) * 0.5;
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn circle_proxy(radius: f64) -> DistanceProxy {
        DistanceProxy::new(vec![Vec2::new(0.0, 0.0)], radius)
    }

    fn box_proxy(hx: f64, hy: f64) -> DistanceProxy {
        DistanceProxy::new(
            vec![
                Vec2::new(hx, -hy),
                Vec2::new(hx, hy),
                Vec2::new(-hx, hy),
                Vec2::new(-hx, -hy),
            ],
            0.0,
        )
    }

    fn query(proxy_a: DistanceProxy, xf_a: Pose2, proxy_b: DistanceProxy, xf_b: Pose2, radii: bool) -> DistanceOutput {
        let mut cache = SimplexCache::default();
        distance(
            &mut cache,
            &DistanceInput {
                proxy_a,
                proxy_b,
                xf_a,
                xf_b,
                use_radii: radii,
                max_iterations: 20,
            },
        )
    }

    #[test]
    fn test_point_point_distance() {
        let out = query(
            circle_proxy(0.0),
            Pose2::new(Vec2::new(0.0, 0.0), 0.0),
            circle_proxy(0.0),
            Pose2::new(Vec2::new(3.0, 4.0), 0.0),
            false,
        );
        assert_relative_eq!(out.distance, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_circle_radii_shrink_distance() {
        let out = query(
            circle_proxy(1.0),
            Pose2::new(Vec2::new(0.0, 0.0), 0.0),
            circle_proxy(1.0),
            Pose2::new(Vec2::new(5.0, 0.0), 0.0),
            true,
        );
        assert_relative_eq!(out.distance, 3.0, epsilon = 1e-12);
        assert_relative_eq!(out.point_a.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(out.point_b.x, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_box_box_face_distance() {
        let out = query(
            box_proxy(1.0, 1.0),
            Pose2::new(Vec2::new(0.0, 0.0), 0.0),
            box_proxy(1.0, 1.0),
            Pose2::new(Vec2::new(3.5, 0.0), 0.0),
            false,
        );
        assert_relative_eq!(out.distance, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_overlapping_boxes_report_zero() {
        let out = query(
            box_proxy(1.0, 1.0),
            Pose2::new(Vec2::new(0.0, 0.0), 0.0),
            box_proxy(1.0, 1.0),
            Pose2::new(Vec2::new(1.0, 0.0), 0.0),
            true,
        );
        assert_eq!(out.distance, 0.0);
    }

    #[test]
    fn test_warm_start_converges_faster() {
        let proxy_a = box_proxy(1.0, 1.0);
        let proxy_b = box_proxy(1.0, 1.0);
        let xf_a = Pose2::new(Vec2::new(0.0, 0.0), 0.3);
        let xf_b = Pose2::new(Vec2::new(4.0, 0.5), -0.2);

        let mut cache = SimplexCache::default();
        let input = DistanceInput {
            proxy_a,
            proxy_b,
            xf_a,
            xf_b,
            use_radii: false,
            max_iterations: 20,
        };
        let cold = distance(&mut cache, &input);
        let warm = distance(&mut cache, &input);
        assert_relative_eq!(cold.distance, warm.distance, epsilon = 1e-12);
        assert!(warm.iterations <= cold.iterations);
    }
}
