//! Time of impact between two swept shapes.
//!
//! Conservative advancement: at the current trial time a GJK distance query
//! produces witness features; a [`SeparationFinder`] turns the terminating
//! simplex into a separating axis whose signed separation `f(t)` can be
//! evaluated cheaply at any time; a mixed bisection/false-position root
//! finder then brackets the time where `f` crosses the target separation.
//! The outer loop repeats with fresh witness features until the deepest
//! points agree, every axis is pushed out, or an iteration budget runs dry.
//!
//! The target separation sits slightly *inside* the combined skin radius
//! (`total radius - target depth`), so the sub-stepped position solver still
//! has overlap to work against and sub-steps do not oscillate.

use planar_types::{Sweep, Vec2};

use crate::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};

/// Budget and tolerance knobs for a TOI query.
#[derive(Debug, Clone, Copy)]
pub struct ToiConf {
    /// Target penetration depth below the combined skin radius.
    pub target_depth: f64,
    /// Acceptance band half-width around the target separation.
    pub tolerance: f64,
    /// Outer conservative-advancement iteration cap.
    pub max_toi_iters: u32,
    /// Root-finder iteration cap per axis.
    pub max_root_iters: u32,
    /// GJK iteration cap per distance query.
    pub max_distance_iters: u32,
}

impl Default for ToiConf {
    fn default() -> Self {
        Self {
            target_depth: 3.0 * planar_types::DEFAULT_LINEAR_SLOP,
            tolerance: 0.25 * planar_types::DEFAULT_LINEAR_SLOP,
            max_toi_iters: 20,
            max_root_iters: 30,
            max_distance_iters: 20,
        }
    }
}

/// How a TOI query concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiState {
    /// Iteration budget exhausted before a conclusion.
    Failed,
    /// The shapes already overlap beyond the target at the start.
    Overlapped,
    /// The shapes reach the target separation at the reported time.
    Touching,
    /// The shapes stay separated through the whole interval.
    Separated,
}

/// Result of a TOI query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToiOutput {
    /// Conclusion.
    pub state: ToiState,
    /// Time of impact as a fraction of the sweep interval, in `[0, t_max]`.
    pub time: f64,
    /// Outer iterations used.
    pub toi_iters: u32,
    /// Largest root-finder iteration count observed.
    pub max_root_iters: u32,
    /// Total root-finder iterations.
    pub sum_root_iters: u32,
    /// Largest distance-query iteration count observed.
    pub max_distance_iters: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FinderKind {
    Points,
    FaceA,
    FaceB,
}

/// A separating axis extracted from a GJK simplex, evaluable over time.
#[derive(Debug, Clone)]
pub struct SeparationFinder<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: FinderKind,
    axis: Vec2,
    local_point: Vec2,
}

impl<'a> SeparationFinder<'a> {
    /// Build a finder from the witness indices of a terminated GJK query.
    #[must_use]
    pub fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f64,
    ) -> Self {
        debug_assert!(cache.count > 0 && cache.count <= 3);
        let xf_a = sweep_a.pose_at(t1);
        let xf_b = sweep_b.pose_at(t1);

        if cache.count == 1 {
            // The closest features are single vertices.
            let local_a = proxy_a.vertex(cache.index_a[0] as usize);
            let local_b = proxy_b.vertex(cache.index_b[0] as usize);
            let point_a = xf_a.transform_point(local_a);
            let point_b = xf_b.transform_point(local_b);
            let axis = normalize_or_x(point_b - point_a);
            return Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: FinderKind::Points,
                axis,
                local_point: Vec2::new(0.0, 0.0),
            };
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two witness vertices on B: separate along B's face.
            let local_b1 = proxy_b.vertex(cache.index_b[0] as usize);
            let local_b2 = proxy_b.vertex(cache.index_b[1] as usize);
            let e = local_b2 - local_b1;
            let mut axis = normalize_or_x(Vec2::new(e.y, -e.x));
            let normal = xf_b.q.rotate(axis);
            let local_point = (local_b1 + local_b2) * 0.5;
            let point_b = xf_b.transform_point(local_point);
            let point_a = xf_a.transform_point(proxy_a.vertex(cache.index_a[0] as usize));
            if (point_a - point_b).dot(&normal) < 0.0 {
                axis = -axis;
            }
            Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: FinderKind::FaceB,
                axis,
                local_point,
            }
        } else {
            // Two witness vertices on A: separate along A's face.
            let local_a1 = proxy_a.vertex(cache.index_a[0] as usize);
            let local_a2 = proxy_a.vertex(cache.index_a[1] as usize);
            let e = local_a2 - local_a1;
            let mut axis = normalize_or_x(Vec2::new(e.y, -e.x));
            let normal = xf_a.q.rotate(axis);
            let local_point = (local_a1 + local_a2) * 0.5;
            let point_a = xf_a.transform_point(local_point);
            let point_b = xf_b.transform_point(proxy_b.vertex(cache.index_b[0] as usize));
            if (point_b - point_a).dot(&normal) < 0.0 {
                axis = -axis;
            }
            Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: FinderKind::FaceA,
                axis,
                local_point,
            }
        }
    }

    /// Deepest-point separation at time `t`, with the achieving vertex pair.
    #[must_use]
    pub fn find_min_separation(&self, t: f64) -> (f64, usize, usize) {
        let xf_a = self.sweep_a.pose_at(t);
        let xf_b = self.sweep_b.pose_at(t);
        match self.kind {
            FinderKind::Points => {
                let axis_a = xf_a.q.inv_rotate(self.axis);
                let axis_b = xf_b.q.inv_rotate(-self.axis);
                let index_a = self.proxy_a.support(axis_a);
                let index_b = self.proxy_b.support(axis_b);
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(&self.axis), index_a, index_b)
            }
            FinderKind::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let point_a = xf_a.transform_point(self.local_point);
                let axis_b = xf_b.q.inv_rotate(-normal);
                let index_b = self.proxy_b.support(axis_b);
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(&normal), usize::MAX, index_b)
            }
            FinderKind::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let point_b = xf_b.transform_point(self.local_point);
                let axis_a = xf_a.q.inv_rotate(-normal);
                let index_a = self.proxy_a.support(axis_a);
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                ((point_a - point_b).dot(&normal), index_a, usize::MAX)
            }
        }
    }

    /// Separation of a fixed vertex pair at time `t`.
    #[must_use]
    pub fn evaluate(&self, index_a: usize, index_b: usize, t: f64) -> f64 {
        let xf_a = self.sweep_a.pose_at(t);
        let xf_b = self.sweep_b.pose_at(t);
        match self.kind {
            FinderKind::Points => {
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(&self.axis)
            }
            FinderKind::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let point_a = xf_a.transform_point(self.local_point);
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(&normal)
            }
            FinderKind::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let point_b = xf_b.transform_point(self.local_point);
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(&normal)
            }
        }
    }
}

fn normalize_or_x(v: Vec2) -> Vec2 {
    let n = v.norm();
    if n > f64::EPSILON {
        v / n
    } else {
        Vec2::new(1.0, 0.0)
    }
}

/// Find the earliest time in `[0, t_max]` at which the swept proxies reach
/// the target separation.
///
/// The sweeps' `alpha0` origins must coincide; the returned time is a
/// fraction of the remaining interval, exactly as the sweeps interpolate it.
#[must_use]
pub fn time_of_impact(
    proxy_a: &DistanceProxy,
    mut sweep_a: Sweep,
    proxy_b: &DistanceProxy,
    mut sweep_b: Sweep,
    t_max: f64,
    conf: &ToiConf,
) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Failed,
        time: t_max,
        toi_iters: 0,
        max_root_iters: 0,
        sum_root_iters: 0,
        max_distance_iters: 0,
    };

    // Large rotations make the root finder chase a moving target.
    sweep_a.normalize();
    sweep_b.normalize();

    let total_radius = proxy_a.radius() + proxy_b.radius();
    let target = planar_types::DEFAULT_LINEAR_SLOP.max(total_radius - conf.target_depth);
    let tolerance = conf.tolerance;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0;
    let mut cache = SimplexCache::default();

    loop {
        let xf_a = sweep_a.pose_at(t1);
        let xf_b = sweep_b.pose_at(t1);

        let dist_out = distance(
            &mut cache,
            &DistanceInput {
                proxy_a: proxy_a.clone(),
                proxy_b: proxy_b.clone(),
                xf_a,
                xf_b,
                use_radii: false,
                max_iterations: conf.max_distance_iters,
            },
        );
        output.max_distance_iters = output.max_distance_iters.max(dist_out.iterations);

        // Deep overlap at the start of the interval.
        if dist_out.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.time = 0.0;
            break;
        }

        if dist_out.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.time = t1;
            break;
        }

        let fcn = SeparationFinder::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest vertex pair at t2, pushing each out in turn.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iters = 0;
        loop {
            let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

            if s2 > target + tolerance {
                // The interval ends separated.
                output.state = ToiState::Separated;
                output.time = t_max;
                done = true;
                break;
            }
            if s2 > target - tolerance {
                // Advance the interval start and look for the next axis.
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);
            if s1 < target - tolerance {
                // The finder's axis no longer separates at t1; the advance
                // step was too coarse.
                output.state = ToiState::Failed;
                output.time = t1;
                done = true;
                break;
            }
            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.time = t1;
                done = true;
                break;
            }

            // Root-find target separation within [t1, t2]; false position
            // and bisection alternate for guaranteed progress.
            let mut root_iters = 0;
            let (mut a1, mut a2) = (t1, t2);
            loop {
                let t = if root_iters & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iters += 1;
                output.sum_root_iters += 1;

                let s = fcn.evaluate(index_a, index_b, t);
                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }
                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }
                if root_iters == conf.max_root_iters {
                    break;
                }
            }
            output.max_root_iters = output.max_root_iters.max(root_iters);

            push_back_iters += 1;
            if push_back_iters as usize == crate::MAX_POLYGON_VERTICES {
                break;
            }
        }

        output.toi_iters += 1;
        if done {
            break;
        }
        if output.toi_iters == conf.max_toi_iters {
            // Give up and report the progress made; the caller treats the
            // sweep as safe up to this time.
            output.state = ToiState::Failed;
            output.time = t1;
            break;
        }
    }

    output
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use planar_types::Position;

    fn sweep_linear(from: Vec2, to: Vec2) -> Sweep {
        let mut sweep = Sweep::new(Vec2::new(0.0, 0.0), Position::new(from, 0.0));
        sweep.pos1 = Position::new(to, 0.0);
        sweep
    }

    fn circle(radius: f64) -> DistanceProxy {
        DistanceProxy::new(vec![Vec2::new(0.0, 0.0)], radius)
    }

    #[test]
    fn test_head_on_circles_touch_midway() {
        let proxy = circle(0.5);
        let sweep_a = sweep_linear(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let sweep_b = sweep_linear(Vec2::new(5.0, 0.0), Vec2::new(-5.0, 0.0));

        let out = time_of_impact(&proxy, sweep_a, &proxy, sweep_b, 1.0, &ToiConf::default());
        assert_eq!(out.state, ToiState::Touching);
        // Centers close at 20 m per unit time from 10 m apart; contact at
        // distance ~1.0 means t slightly under 0.45.
        assert!(out.time > 0.40 && out.time < 0.46, "t = {}", out.time);
    }

    #[test]
    fn test_separated_when_paths_do_not_cross() {
        let proxy = circle(0.5);
        let sweep_a = sweep_linear(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let sweep_b = sweep_linear(Vec2::new(0.0, 10.0), Vec2::new(0.0, 12.0));

        let out = time_of_impact(&proxy, sweep_a, &proxy, sweep_b, 1.0, &ToiConf::default());
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.time, 1.0);
    }

    #[test]
    fn test_initial_overlap_reports_overlapped() {
        let proxy = circle(1.0);
        let sweep_a = sweep_linear(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0));
        let sweep_b = sweep_linear(Vec2::new(0.5, 0.0), Vec2::new(1.5, 0.0));

        let out = time_of_impact(&proxy, sweep_a, &proxy, sweep_b, 1.0, &ToiConf::default());
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.time, 0.0);
    }

    #[test]
    fn test_fast_bullet_against_thin_box_is_caught() {
        // A small fast disk crossing a thin wall entirely within one step.
        let bullet = circle(0.25);
        let wall = DistanceProxy::new(
            vec![
                Vec2::new(0.05, -5.0),
                Vec2::new(0.05, 5.0),
                Vec2::new(-0.05, 5.0),
                Vec2::new(-0.05, -5.0),
            ],
            0.01,
        );
        let sweep_a = sweep_linear(Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0));
        let sweep_b = sweep_linear(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0));

        let out = time_of_impact(&bullet, sweep_a, &wall, sweep_b, 1.0, &ToiConf::default());
        assert_eq!(out.state, ToiState::Touching);
        assert!(out.time < 0.5, "hit must occur before the crossing");
        assert!(out.time > 0.4, "hit must not trigger early");
    }

    #[test]
    fn test_rotation_only_sweep() {
        // A long box spinning next to a circle touches it without any
        // translation.
        let blade = DistanceProxy::new(
            vec![
                Vec2::new(2.0, -0.1),
                Vec2::new(2.0, 0.1),
                Vec2::new(-2.0, 0.1),
                Vec2::new(-2.0, -0.1),
            ],
            0.01,
        );
        let ball = circle(0.5);

        let mut sweep_a = Sweep::new(Vec2::new(0.0, 0.0), Position::new(Vec2::new(0.0, 0.0), 0.0));
        sweep_a.pos1 = Position::new(Vec2::new(0.0, 0.0), std::f64::consts::PI);
        let sweep_b = sweep_linear(Vec2::new(0.0, 3.0), Vec2::new(0.0, 3.0));

        let out = time_of_impact(&blade, sweep_a, &ball, sweep_b, 1.0, &ToiConf::default());
        assert_eq!(out.state, ToiState::Touching);
        assert!(out.time > 0.0 && out.time < 1.0);
    }
}
