//! The sequential-impulse contact solver.
//!
//! Constraints are island-local mirrors of touching contacts, indexed by the
//! island positions of their two bodies. The world builds them once per
//! island, warm-starts body velocities from the accumulated impulses, runs
//! the velocity iterations, integrates, then runs the position iterations.
//!
//! Two-point manifolds are solved as a coupled 2x2 linear complementarity
//! problem (both normal impulses non-negative); when the direct solution is
//! infeasible the solver falls back through the three boundary cases. This
//! prevents the point-against-point oscillation that independent clamping
//! produces in box stacks.
//!
//! Non-finite arithmetic in any constraint marks it degenerate: it applies
//! nothing further this island and is counted in the step statistics, but
//! the island still commits.

use planar_collision::{Manifold, ManifoldKind, WorldManifold};
use planar_types::{cross, cross_sv, inverse22, ContactId, Mat22, Pose2, Position, Rot, Vec2, Velocity};

/// Condition-number cap above which a two-point block is solved point-wise.
const MAX_CONDITION_NUMBER: f64 = 1000.0;

/// Per-body data needed to mirror a contact into island constraints.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintBodyData {
    /// Island-local body index.
    pub index: usize,
    /// Inverse mass.
    pub inv_mass: f64,
    /// Inverse rotational inertia about the center of mass.
    pub inv_inertia: f64,
    /// Center of mass in body-local coordinates.
    pub local_center: Vec2,
    /// Skin radius of the fixture child.
    pub radius: f64,
}

/// One contact point mirrored into the velocity solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityConstraintPoint {
    /// Offset from body A's center of mass to the contact point.
    pub r_a: Vec2,
    /// Offset from body B's center of mass to the contact point.
    pub r_b: Vec2,
    /// Accumulated normal impulse.
    pub normal_impulse: f64,
    /// Accumulated tangent impulse.
    pub tangent_impulse: f64,
    /// Effective mass along the normal.
    pub normal_mass: f64,
    /// Effective mass along the tangent.
    pub tangent_mass: f64,
    /// Restitution bias velocity.
    pub velocity_bias: f64,
}

/// Velocity-level mirror of one touching contact.
#[derive(Debug, Clone)]
pub struct ContactVelocityConstraint {
    /// The originating contact, for writing impulses back.
    pub contact: ContactId,
    /// Island index of body A.
    pub index_a: usize,
    /// Island index of body B.
    pub index_b: usize,
    /// Inverse mass of body A.
    pub inv_mass_a: f64,
    /// Inverse mass of body B.
    pub inv_mass_b: f64,
    /// Inverse inertia of body A.
    pub inv_i_a: f64,
    /// Inverse inertia of body B.
    pub inv_i_b: f64,
    /// Mixed friction coefficient.
    pub friction: f64,
    /// Mixed restitution coefficient.
    pub restitution: f64,
    /// Conveyor-style surface speed along the tangent.
    pub tangent_speed: f64,
    /// Contact normal from A to B in world coordinates.
    pub normal: Vec2,
    /// Block-solver effective mass (two-point manifolds only).
    pub normal_mass: Mat22,
    /// Block-solver stiffness matrix.
    pub k: Mat22,
    /// The constraint points.
    pub points: [VelocityConstraintPoint; 2],
    /// Number of valid points.
    pub count: usize,
    /// Set when non-finite arithmetic disabled this constraint.
    pub degenerate: bool,
}

/// Position-level mirror of one touching contact.
#[derive(Debug, Clone)]
pub struct ContactPositionConstraint {
    /// Island index of body A.
    pub index_a: usize,
    /// Island index of body B.
    pub index_b: usize,
    /// Inverse mass of body A.
    pub inv_mass_a: f64,
    /// Inverse mass of body B.
    pub inv_mass_b: f64,
    /// Inverse inertia of body A.
    pub inv_i_a: f64,
    /// Inverse inertia of body B.
    pub inv_i_b: f64,
    /// Center of mass of body A in body-local coordinates.
    pub local_center_a: Vec2,
    /// Center of mass of body B in body-local coordinates.
    pub local_center_b: Vec2,
    /// The manifold's local-frame data.
    pub manifold: Manifold,
    /// Skin radius of side A.
    pub radius_a: f64,
    /// Skin radius of side B.
    pub radius_b: f64,
}

/// Build the velocity and position mirrors of one touching contact.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn build_constraints(
    contact: ContactId,
    manifold: &Manifold,
    friction: f64,
    restitution: f64,
    tangent_speed: f64,
    body_a: ConstraintBodyData,
    body_b: ConstraintBodyData,
    dt_ratio: f64,
) -> (ContactVelocityConstraint, ContactPositionConstraint) {
    debug_assert!(manifold.point_count() > 0);

    let mut vc = ContactVelocityConstraint {
        contact,
        index_a: body_a.index,
        index_b: body_b.index,
        inv_mass_a: body_a.inv_mass,
        inv_mass_b: body_b.inv_mass,
        inv_i_a: body_a.inv_inertia,
        inv_i_b: body_b.inv_inertia,
        friction,
        restitution,
        tangent_speed,
        normal: Vec2::new(0.0, 0.0),
        normal_mass: Mat22::zeros(),
        k: Mat22::zeros(),
        points: [VelocityConstraintPoint::default(); 2],
        count: manifold.point_count(),
        degenerate: false,
    };
    for (vcp, mp) in vc.points.iter_mut().zip(manifold.points()) {
        // Warm starting scales by the step-length ratio; a dt_ratio of zero
        // resets the accumulators.
        vcp.normal_impulse = dt_ratio * mp.normal_impulse;
        vcp.tangent_impulse = dt_ratio * mp.tangent_impulse;
    }

    let pc = ContactPositionConstraint {
        index_a: body_a.index,
        index_b: body_b.index,
        inv_mass_a: body_a.inv_mass,
        inv_mass_b: body_b.inv_mass,
        inv_i_a: body_a.inv_inertia,
        inv_i_b: body_b.inv_inertia,
        local_center_a: body_a.local_center,
        local_center_b: body_b.local_center,
        manifold: *manifold,
        radius_a: body_a.radius,
        radius_b: body_b.radius,
    };
    (vc, pc)
}

/// Configuration for velocity-constraint initialization.
#[derive(Debug, Clone, Copy)]
pub struct VelocityConstraintConf {
    /// Relative normal speed below which restitution is suppressed.
    pub velocity_threshold: f64,
    /// Whether two-point manifolds use the coupled block solver.
    pub block_solve: bool,
}

/// Configuration for one position-solver sweep.
#[derive(Debug, Clone, Copy)]
pub struct PositionSolverConf {
    /// Position-bias factor in `(0, 1]`.
    pub baumgarte: f64,
    /// Allowed penetration.
    pub linear_slop: f64,
    /// Per-iteration correction clamp.
    pub max_linear_correction: f64,
}

/// Result of one velocity-solver sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocitySolveResult {
    /// Largest incremental normal impulse applied.
    pub max_incremental_impulse: f64,
    /// Constraints newly marked degenerate.
    pub degenerate: u32,
}

fn pose_for(position: Position, local_center: Vec2) -> Pose2 {
    let q = Rot::new(position.angular);
    Pose2 {
        p: position.linear - q.rotate(local_center),
        q,
    }
}

/// The island-scoped contact solver, borrowing the island's body state.
pub struct ContactSolver<'a> {
    /// Island body positions, indexed by island-local index.
    pub positions: &'a mut [Position],
    /// Island body velocities, indexed by island-local index.
    pub velocities: &'a mut [Velocity],
}

impl ContactSolver<'_> {
    /// Compute effective masses, restitution biases, and (for two-point
    /// manifolds) the block matrices against the current positions.
    pub fn initialize_velocity_constraints(
        &mut self,
        vcs: &mut [ContactVelocityConstraint],
        pcs: &[ContactPositionConstraint],
        conf: &VelocityConstraintConf,
    ) {
        for (vc, pc) in vcs.iter_mut().zip(pcs) {
            let xf_a = pose_for(self.positions[vc.index_a], pc.local_center_a);
            let xf_b = pose_for(self.positions[vc.index_b], pc.local_center_b);
            let world = WorldManifold::new(&pc.manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);

            let c_a = self.positions[vc.index_a].linear;
            let c_b = self.positions[vc.index_b].linear;
            let v_a = self.velocities[vc.index_a];
            let v_b = self.velocities[vc.index_b];

            vc.normal = world.normal;
            let tangent = Vec2::new(vc.normal.y, -vc.normal.x);

            for (j, vcp) in vc.points.iter_mut().take(vc.count).enumerate() {
                vcp.r_a = world.points[j] - c_a;
                vcp.r_b = world.points[j] - c_b;

                let rn_a = cross(vcp.r_a, vc.normal);
                let rn_b = cross(vcp.r_b, vc.normal);
                let k_normal = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rn_a * rn_a
                    + vc.inv_i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(vcp.r_a, tangent);
                let rt_b = cross(vcp.r_b, tangent);
                let k_tangent = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rt_a * rt_a
                    + vc.inv_i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    &(v_b.linear + cross_sv(v_b.angular, vcp.r_b)
                        - v_a.linear
                        - cross_sv(v_a.angular, vcp.r_a)),
                );
                if v_rel < -conf.velocity_threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            if vc.count == 2 && conf.block_solve {
                let rn1_a = cross(vc.points[0].r_a, vc.normal);
                let rn1_b = cross(vc.points[0].r_b, vc.normal);
                let rn2_a = cross(vc.points[1].r_a, vc.normal);
                let rn2_b = cross(vc.points[1].r_b, vc.normal);

                let k11 = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rn1_a * rn1_a
                    + vc.inv_i_b * rn1_b * rn1_b;
                let k22 = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rn2_a * rn2_a
                    + vc.inv_i_b * rn2_b * rn2_b;
                let k12 = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rn1_a * rn2_a
                    + vc.inv_i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Mat22::new(k11, k12, k12, k22);
                    vc.normal_mass = inverse22(&vc.k);
                } else {
                    // Nearly redundant points: solve only the deeper one.
                    vc.count = 1;
                }
            }
        }
    }

    /// Apply the accumulated impulses to the body velocities.
    pub fn warm_start(&mut self, vcs: &[ContactVelocityConstraint]) {
        for vc in vcs {
            let tangent = Vec2::new(vc.normal.y, -vc.normal.x);
            let mut v_a = self.velocities[vc.index_a];
            let mut v_b = self.velocities[vc.index_b];
            for vcp in vc.points.iter().take(vc.count) {
                let p = vc.normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                v_a.linear -= p * vc.inv_mass_a;
                v_a.angular -= vc.inv_i_a * cross(vcp.r_a, p);
                v_b.linear += p * vc.inv_mass_b;
                v_b.angular += vc.inv_i_b * cross(vcp.r_b, p);
            }
            self.velocities[vc.index_a] = v_a;
            self.velocities[vc.index_b] = v_b;
        }
    }

    /// One Gauss-Seidel sweep over all velocity constraints: friction rows
    /// first (clamped to the friction cone), then normal rows (accumulated
    /// impulse kept non-negative, two-point manifolds via the block solve).
    pub fn solve_velocity_constraints(
        &mut self,
        vcs: &mut [ContactVelocityConstraint],
    ) -> VelocitySolveResult {
        let mut result = VelocitySolveResult::default();

        'constraints: for vc in vcs.iter_mut() {
            if vc.degenerate {
                continue;
            }
            let mut v_a = self.velocities[vc.index_a];
            let mut v_b = self.velocities[vc.index_b];
            let normal = vc.normal;
            let tangent = Vec2::new(normal.y, -normal.x);

            // Friction, using the normal impulses of the previous sweep.
            for vcp in vc.points.iter_mut().take(vc.count) {
                let dv = v_b.linear + cross_sv(v_b.angular, vcp.r_b)
                    - v_a.linear
                    - cross_sv(v_a.angular, vcp.r_a);
                let vt = dv.dot(&tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * -vt;

                let max_friction = vc.friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                if !lambda.is_finite() {
                    vc.degenerate = true;
                    result.degenerate += 1;
                    continue 'constraints;
                }
                vcp.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                v_a.linear -= p * vc.inv_mass_a;
                v_a.angular -= vc.inv_i_a * cross(vcp.r_a, p);
                v_b.linear += p * vc.inv_mass_b;
                v_b.angular += vc.inv_i_b * cross(vcp.r_b, p);
            }

            // Normal impulses.
            if vc.count == 1 || vc.k == Mat22::zeros() {
                for vcp in vc.points.iter_mut().take(vc.count) {
                    let dv = v_b.linear + cross_sv(v_b.angular, vcp.r_b)
                        - v_a.linear
                        - cross_sv(v_a.angular, vcp.r_a);
                    let vn = dv.dot(&normal);
                    let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                    let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                    let lambda = new_impulse - vcp.normal_impulse;
                    if !lambda.is_finite() {
                        vc.degenerate = true;
                        result.degenerate += 1;
                        continue 'constraints;
                    }
                    vcp.normal_impulse = new_impulse;
                    result.max_incremental_impulse =
                        result.max_incremental_impulse.max(lambda.abs());

                    let p = normal * lambda;
                    v_a.linear -= p * vc.inv_mass_a;
                    v_a.angular -= vc.inv_i_a * cross(vcp.r_a, p);
                    v_b.linear += p * vc.inv_mass_b;
                    v_b.angular += vc.inv_i_b * cross(vcp.r_b, p);
                }
            } else {
                // Coupled two-point solve. Accumulated impulses a must stay
                // non-negative and each point must end with vn >= 0; try the
                // interior solution first, then the three boundary cases.
                let cp1 = vc.points[0];
                let cp2 = vc.points[1];
                let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
                debug_assert!(a.x >= 0.0 && a.y >= 0.0);

                let dv1 = v_b.linear + cross_sv(v_b.angular, cp1.r_b)
                    - v_a.linear
                    - cross_sv(v_a.angular, cp1.r_a);
                let dv2 = v_b.linear + cross_sv(v_b.angular, cp2.r_b)
                    - v_a.linear
                    - cross_sv(v_a.angular, cp2.r_a);
                let vn1 = dv1.dot(&normal);
                let vn2 = dv2.dot(&normal);

                let mut b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias);
                b -= vc.k * a;

                let x = 'block: {
                    // Case 1: both points active.
                    let x = -(vc.normal_mass * b);
                    if x.x >= 0.0 && x.y >= 0.0 {
                        break 'block Some(x);
                    }
                    // Case 2: point 1 active, point 2 separating.
                    let x1 = -cp1.normal_mass * b.x;
                    if x1 >= 0.0 && vc.k[(1, 0)] * x1 + b.y >= 0.0 {
                        break 'block Some(Vec2::new(x1, 0.0));
                    }
                    // Case 3: point 2 active, point 1 separating.
                    let x2 = -cp2.normal_mass * b.y;
                    if x2 >= 0.0 && vc.k[(0, 1)] * x2 + b.x >= 0.0 {
                        break 'block Some(Vec2::new(0.0, x2));
                    }
                    // Case 4: both separating.
                    if b.x >= 0.0 && b.y >= 0.0 {
                        break 'block Some(Vec2::new(0.0, 0.0));
                    }
                    None
                };

                if let Some(x) = x {
                    if !(x.x.is_finite() && x.y.is_finite()) {
                        vc.degenerate = true;
                        result.degenerate += 1;
                        continue 'constraints;
                    }
                    let d = x - a;
                    let p1 = normal * d.x;
                    let p2 = normal * d.y;
                    v_a.linear -= (p1 + p2) * vc.inv_mass_a;
                    v_a.angular -= vc.inv_i_a * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
                    v_b.linear += (p1 + p2) * vc.inv_mass_b;
                    v_b.angular += vc.inv_i_b * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));
                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                    result.max_incremental_impulse = result
                        .max_incremental_impulse
                        .max(d.x.abs())
                        .max(d.y.abs());
                }
                // No feasible sub-case: keep the accumulated impulses and
                // let later sweeps make progress.
            }

            self.velocities[vc.index_a] = v_a;
            self.velocities[vc.index_b] = v_b;
        }
        result
    }

    /// One Gauss-Seidel sweep of the position solver. Returns the minimum
    /// signed separation observed before correction.
    ///
    /// When `toi_bodies` is set, only those two island indices receive
    /// corrections; all other bodies are treated as infinitely heavy, which
    /// is how TOI sub-steps keep the rest of the island parked.
    pub fn solve_position_constraints(
        &mut self,
        pcs: &[ContactPositionConstraint],
        conf: &PositionSolverConf,
        toi_bodies: Option<(usize, usize)>,
    ) -> f64 {
        let mut min_separation = f64::INFINITY;

        for pc in pcs {
            let (m_a, i_a, m_b, i_b) = match toi_bodies {
                None => (pc.inv_mass_a, pc.inv_i_a, pc.inv_mass_b, pc.inv_i_b),
                Some((t1, t2)) => {
                    let a_active = pc.index_a == t1 || pc.index_a == t2;
                    let b_active = pc.index_b == t1 || pc.index_b == t2;
                    (
                        if a_active { pc.inv_mass_a } else { 0.0 },
                        if a_active { pc.inv_i_a } else { 0.0 },
                        if b_active { pc.inv_mass_b } else { 0.0 },
                        if b_active { pc.inv_i_b } else { 0.0 },
                    )
                }
            };

            let mut pos_a = self.positions[pc.index_a];
            let mut pos_b = self.positions[pc.index_b];

            for j in 0..pc.manifold.point_count() {
                let xf_a = pose_for(pos_a, pc.local_center_a);
                let xf_b = pose_for(pos_b, pc.local_center_b);
                let (normal, point, separation) = position_solver_manifold(pc, &xf_a, &xf_b, j);

                let r_a = point - pos_a.linear;
                let r_b = point - pos_b.linear;

                min_separation = min_separation.min(separation);

                // Push out up to the slop, clamped to keep corrections tame.
                let c = (conf.baumgarte * (separation + conf.linear_slop))
                    .clamp(-conf.max_linear_correction, 0.0);

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                if !impulse.is_finite() {
                    continue;
                }
                let p = normal * impulse;

                pos_a.linear -= p * m_a;
                pos_a.angular -= i_a * cross(r_a, p);
                pos_b.linear += p * m_b;
                pos_b.angular += i_b * cross(r_b, p);
            }

            self.positions[pc.index_a] = pos_a;
            self.positions[pc.index_b] = pos_b;
        }
        min_separation
    }
}

/// Normal, point, and separation of one manifold point under the given
/// trial poses.
fn position_solver_manifold(
    pc: &ContactPositionConstraint,
    xf_a: &Pose2,
    xf_b: &Pose2,
    index: usize,
) -> (Vec2, Vec2, f64) {
    let manifold = &pc.manifold;
    debug_assert!(manifold.point_count() > 0);

    match manifold.kind {
        ManifoldKind::Circles => {
            let point_a = xf_a.transform_point(manifold.local_point);
            let point_b = xf_b.transform_point(manifold.points()[0].local_point);
            let d = point_b - point_a;
            let normal = if d.norm_squared() > f64::EPSILON * f64::EPSILON {
                d.normalize()
            } else {
                Vec2::new(1.0, 0.0)
            };
            let point = (point_a + point_b) * 0.5;
            let separation = d.dot(&normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldKind::FaceA => {
            let normal = xf_a.q.rotate(manifold.local_normal);
            let plane_point = xf_a.transform_point(manifold.local_point);
            let clip_point = xf_b.transform_point(manifold.points()[index].local_point);
            let separation = (clip_point - plane_point).dot(&normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldKind::FaceB => {
            let normal = xf_b.q.rotate(manifold.local_normal);
            let plane_point = xf_b.transform_point(manifold.local_point);
            let clip_point = xf_a.transform_point(manifold.points()[index].local_point);
            let separation = (clip_point - plane_point).dot(&normal) - pc.radius_a - pc.radius_b;
            // Point the correction from A toward B.
            (-normal, clip_point, separation)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use planar_collision::{collide_circles, CircleShape};

    fn head_on_constraint(
        restitution: f64,
    ) -> (ContactVelocityConstraint, ContactPositionConstraint) {
        // Two unit-mass circles of radius 0.5 touching at the origin.
        let a = CircleShape::new(0.5);
        let b = CircleShape::new(0.5);
        let xf_a = Pose2::new(Vec2::new(-0.45, 0.0), 0.0);
        let xf_b = Pose2::new(Vec2::new(0.45, 0.0), 0.0);
        let manifold = collide_circles(&a, &xf_a, &b, &xf_b);
        assert_eq!(manifold.point_count(), 1);

        build_constraints(
            ContactId::new(0),
            &manifold,
            0.0,
            restitution,
            0.0,
            ConstraintBodyData {
                index: 0,
                inv_mass: 1.0,
                inv_inertia: 0.0,
                local_center: Vec2::new(0.0, 0.0),
                radius: 0.5,
            },
            ConstraintBodyData {
                index: 1,
                inv_mass: 1.0,
                inv_inertia: 0.0,
                local_center: Vec2::new(0.0, 0.0),
                radius: 0.5,
            },
            0.0,
        )
    }

    fn island_state() -> (Vec<Position>, Vec<Velocity>) {
        (
            vec![
                Position::new(Vec2::new(-0.45, 0.0), 0.0),
                Position::new(Vec2::new(0.45, 0.0), 0.0),
            ],
            vec![
                Velocity::new(Vec2::new(2.0, 0.0), 0.0),
                Velocity::new(Vec2::new(-2.0, 0.0), 0.0),
            ],
        )
    }

    #[test]
    fn test_head_on_collision_stops_without_restitution() {
        let (mut vc, pc) = head_on_constraint(0.0);
        let (mut positions, mut velocities) = island_state();
        let mut solver = ContactSolver {
            positions: &mut positions,
            velocities: &mut velocities,
        };
        solver.initialize_velocity_constraints(
            std::slice::from_mut(&mut vc),
            std::slice::from_ref(&pc),
            &VelocityConstraintConf {
                velocity_threshold: 1.0,
                block_solve: true,
            },
        );
        for _ in 0..8 {
            solver.solve_velocity_constraints(std::slice::from_mut(&mut vc));
        }
        // Equal masses, inelastic: both bodies end at rest.
        assert!(velocities[0].linear.x.abs() < 1e-9);
        assert!(velocities[1].linear.x.abs() < 1e-9);
    }

    #[test]
    fn test_restitution_bounces() {
        let (mut vc, pc) = head_on_constraint(1.0);
        let (mut positions, mut velocities) = island_state();
        let mut solver = ContactSolver {
            positions: &mut positions,
            velocities: &mut velocities,
        };
        solver.initialize_velocity_constraints(
            std::slice::from_mut(&mut vc),
            std::slice::from_ref(&pc),
            &VelocityConstraintConf {
                velocity_threshold: 1.0,
                block_solve: true,
            },
        );
        for _ in 0..8 {
            solver.solve_velocity_constraints(std::slice::from_mut(&mut vc));
        }
        // Perfectly elastic head-on collision swaps the velocities.
        assert!((velocities[0].linear.x + 2.0).abs() < 1e-9);
        assert!((velocities[1].linear.x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_slow_approach_has_no_restitution() {
        let (mut vc, pc) = head_on_constraint(1.0);
        let mut positions = vec![
            Position::new(Vec2::new(-0.45, 0.0), 0.0),
            Position::new(Vec2::new(0.45, 0.0), 0.0),
        ];
        let mut velocities = vec![
            Velocity::new(Vec2::new(0.2, 0.0), 0.0),
            Velocity::new(Vec2::new(-0.2, 0.0), 0.0),
        ];
        let mut solver = ContactSolver {
            positions: &mut positions,
            velocities: &mut velocities,
        };
        solver.initialize_velocity_constraints(
            std::slice::from_mut(&mut vc),
            std::slice::from_ref(&pc),
            &VelocityConstraintConf {
                velocity_threshold: 1.0,
                block_solve: true,
            },
        );
        assert_eq!(vc.points[0].velocity_bias, 0.0, "below threshold: no bounce");
    }

    #[test]
    fn test_warm_start_applies_stored_impulse() {
        let (mut vc, pc) = head_on_constraint(0.0);
        let (mut positions, mut velocities) = island_state();
        vc.points[0].normal_impulse = 1.0;

        let mut solver = ContactSolver {
            positions: &mut positions,
            velocities: &mut velocities,
        };
        solver.initialize_velocity_constraints(
            std::slice::from_mut(&mut vc),
            std::slice::from_ref(&pc),
            &VelocityConstraintConf {
                velocity_threshold: 1.0,
                block_solve: true,
            },
        );
        solver.warm_start(std::slice::from_ref(&vc));
        // The stored impulse pushes the bodies apart along the normal.
        assert!(velocities[0].linear.x < 2.0);
        assert!(velocities[1].linear.x > -2.0);
    }

    #[test]
    fn test_position_solver_separates_overlap() {
        let (_, pc) = head_on_constraint(0.0);
        let (mut positions, mut velocities) = island_state();
        let mut solver = ContactSolver {
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let conf = PositionSolverConf {
            baumgarte: 0.2,
            linear_slop: 0.005,
            max_linear_correction: 0.2,
        };
        let first = solver.solve_position_constraints(std::slice::from_ref(&pc), &conf, None);
        assert!(first < 0.0, "bodies start overlapped");
        for _ in 0..20 {
            solver.solve_position_constraints(std::slice::from_ref(&pc), &conf, None);
        }
        let last = solver.solve_position_constraints(std::slice::from_ref(&pc), &conf, None);
        assert!(last >= -3.0 * conf.linear_slop, "converged to the slop band");
        assert!(positions[0].linear.x < -0.45);
        assert!(positions[1].linear.x > 0.45);
    }

    #[test]
    fn test_toi_filter_parks_other_bodies() {
        let (_, pc) = head_on_constraint(0.0);
        let (mut positions, mut velocities) = island_state();
        let before = positions[1];
        let mut solver = ContactSolver {
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let conf = PositionSolverConf {
            baumgarte: 0.75,
            linear_slop: 0.005,
            max_linear_correction: 0.2,
        };
        // Only island body 0 participates; body 1 must not move.
        solver.solve_position_constraints(std::slice::from_ref(&pc), &conf, Some((0, 0)));
        assert_eq!(positions[1], before);
        assert!(positions[0].linear.x < -0.45);
    }
}
