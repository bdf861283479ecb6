//! The world step pipeline: contact discovery and pruning, manifold
//! updates, the regular island solve, and continuous (TOI) sub-stepping.

use planar_collision::{time_of_impact, ToiConf, ToiState};
use planar_contact::{
    build_constraints, ConstraintBodyData, ContactKey, ContactPositionConstraint, ContactSolver,
    ContactUpdateConf, ContactVelocityConstraint, PositionSolverConf, TouchingChange,
    VelocityConstraintConf,
};
use planar_joints::{BodyMetaMap, JointBodyMeta, JointStepConf};
use planar_types::{
    BodyId, ContactId, IslandStats, PreStepStats, RegStepStats, Result, StepConf, StepStats,
    ToiStepStats, Velocity,
};

use crate::events::ContactImpulses;
use crate::island::Island;
use crate::world::{LockGuard, World};

impl World {
    /// Advance the simulation by `conf.dt` seconds.
    ///
    /// With `dt == 0` only queued broad-phase work is performed: new
    /// contacts are discovered for proxies that moved since the last step,
    /// and nothing else changes.
    ///
    /// Fails with `WrongState` when called re-entrantly (from a listener)
    /// and with `InvalidArgument` when the configuration does not validate.
    /// Numerical trouble inside the step is never an error; see the
    /// degenerate-constraint counter in the returned statistics.
    pub fn step(&mut self, conf: &StepConf) -> Result<StepStats> {
        self.check_unlocked("step")?;
        conf.validate()?;

        let _guard = LockGuard::acquire(&self.locked);

        let mut stats = StepStats {
            pre: PreStepStats::default(),
            reg: RegStepStats::empty(),
            toi: ToiStepStats::empty(),
        };

        stats.pre.proxies_moved = self.moved_proxies.len() as u32;
        stats.pre.contacts_added = self.find_new_contacts();

        if conf.dt == 0.0 {
            return Ok(stats);
        }

        self.destroy_invalid_contacts(&mut stats.pre);
        self.update_contacts(conf, &mut stats.pre);
        self.flush_contact_events();

        // An incomplete step is still mid-TOI; only the continuous solver
        // may run until it finishes.
        if self.step_complete {
            stats.reg = self.solve_reg(conf);
        }

        if conf.max_sub_steps > 0 {
            stats.toi = self.solve_toi(conf);
            self.flush_contact_events();
        } else {
            self.step_complete = true;
        }

        // Forces are per-step inputs.
        for i in 0..self.body_list.len() {
            let id = self.body_list[i];
            let body = self.body_mut_ref(id);
            body.force = planar_types::Vec2::new(0.0, 0.0);
            body.torque = 0.0;
        }

        self.inv_dt0 = conf.inv_dt();
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Contact discovery and upkeep
    // ------------------------------------------------------------------

    /// Turn queued proxy moves into new contacts. Candidate pairs from tree
    /// overlap queries are de-duplicated through their ordered [`ContactKey`]
    /// so each pair is considered exactly once, in key order.
    pub(crate) fn find_new_contacts(&mut self) -> u32 {
        let mut moved = std::mem::take(&mut self.moved_proxies);
        moved.sort_unstable();
        moved.dedup();

        let mut candidates: Vec<ContactKey> = Vec::new();
        for &proxy in &moved {
            let leaf = self.tree.leaf(proxy);
            let fat = self.tree.fat_aabb(proxy);
            let tree = &self.tree;
            tree.query(&fat, |other| {
                if other != proxy {
                    let other_leaf = tree.leaf(other);
                    if other_leaf.body != leaf.body {
                        candidates.push(ContactKey::new(
                            contactable(&leaf),
                            contactable(&other_leaf),
                        ));
                    }
                }
                true
            });
        }
        moved.clear();
        self.moved_proxies = moved;

        candidates.sort_unstable();
        candidates.dedup();

        let mut added = 0;
        for key in candidates {
            if self
                .body_ref(key.a.body)
                .contacts
                .iter()
                .any(|&(k, _)| k == key)
            {
                continue;
            }
            if !self.should_collide(&key.a, &key.b) {
                continue;
            }
            if let Some(mut filter) = self.listeners.contact_filter.take() {
                let allowed = filter(key.a.fixture, key.b.fixture);
                self.listeners.contact_filter = Some(filter);
                if !allowed {
                    continue;
                }
            }
            if self.create_contact(key).is_some() {
                added += 1;
            }
        }
        added
    }

    /// Destroy contacts whose fat AABBs separated or whose filters now
    /// forbid them.
    fn destroy_invalid_contacts(&mut self, stats: &mut PreStepStats) {
        let recheck_all = self.needs_contact_filtering;
        // Forward walk with manual advance: destroying the contact at `i`
        // shifts the list left, and events must fire in storage order.
        let mut i = 0;
        while i < self.contact_list.len() {
            let id = self.contact_list[i];
            let (key, flagged) = {
                let contact = self.contact_ref(id);
                (contact.key(), contact.needs_filtering())
            };

            if recheck_all || flagged {
                let mut allowed = self.should_collide(&key.a, &key.b);
                if allowed {
                    if let Some(mut filter) = self.listeners.contact_filter.take() {
                        allowed = filter(key.a.fixture, key.b.fixture);
                        self.listeners.contact_filter = Some(filter);
                    }
                }
                if !allowed {
                    self.destroy_contact(id, true);
                    stats.contacts_destroyed_filter += 1;
                    continue;
                }
                self.contact_mut_ref(id).flag_for_filtering(false);
            }

            let proxy_a = self.fixture_ref(key.a.fixture).proxies[key.a.child as usize];
            let proxy_b = self.fixture_ref(key.b.fixture).proxies[key.b.child as usize];
            if !self
                .tree
                .fat_aabb(proxy_a)
                .overlaps(&self.tree.fat_aabb(proxy_b))
            {
                self.destroy_contact(id, true);
                stats.contacts_destroyed_overlap += 1;
                continue;
            }
            i += 1;
        }
        self.needs_contact_filtering = false;
    }

    /// Recompute one contact's manifold, buffering begin/end transitions and
    /// running the pre-solve listener while the pair is touching.
    fn update_contact_single(&mut self, id: ContactId, conf: &ContactUpdateConf) -> TouchingChange {
        // Field-disjoint borrows: the contact mutably, its collaborators
        // immutably.
        let Some(contact) = self.contacts.get_mut(id.raw()) else {
            unreachable!("stale internal contact id {id}");
        };
        let shape_a = match self
            .fixtures
            .get(contact.a.fixture.raw())
            .and_then(|f| self.shapes.get(f.shape.raw()))
        {
            Some(shape) => shape,
            None => unreachable!("contact references a destroyed fixture"),
        };
        let shape_b = match self
            .fixtures
            .get(contact.b.fixture.raw())
            .and_then(|f| self.shapes.get(f.shape.raw()))
        {
            Some(shape) => shape,
            None => unreachable!("contact references a destroyed fixture"),
        };
        let xf_a = match self.bodies.get(contact.a.body.raw()) {
            Some(body) => *body.transform(),
            None => unreachable!(),
        };
        let xf_b = match self.bodies.get(contact.b.body.raw()) {
            Some(body) => *body.transform(),
            None => unreachable!(),
        };

        let old_manifold = contact.manifold;
        let change = contact.update(shape_a, &xf_a, shape_b, &xf_b, conf);

        if change.began() {
            self.events.begins.push(id);
        }
        if change.ended() {
            self.events.ends.push(id);
        }

        let run_pre_solve = contact.is_touching() && !contact.is_sensor;
        if run_pre_solve {
            if let Some(mut listener) = self.listeners.pre_solve.take() {
                let enabled = listener(id, &old_manifold);
                self.listeners.pre_solve = Some(listener);
                if !enabled {
                    if let Some(contact) = self.contacts.get_mut(id.raw()) {
                        contact.set_enabled(false);
                    }
                }
            }
        }
        change
    }

    /// Update all contacts whose bodies can move this step.
    fn update_contacts(&mut self, conf: &StepConf, stats: &mut PreStepStats) {
        let update_conf = ContactUpdateConf {
            max_distance_iters: conf.max_distance_iters,
            warm_starting: conf.warm_starting,
        };
        for i in 0..self.contact_list.len() {
            let id = self.contact_list[i];
            let (body_a, body_b) = {
                let contact = self.contact_ref(id);
                (contact.a.body, contact.b.body)
            };
            let awake_a = self.body_ref(body_a).is_awake();
            let awake_b = self.body_ref(body_b).is_awake();
            if !(awake_a || awake_b) {
                stats.contacts_ignored += 1;
                continue;
            }
            self.update_contact_single(id, &update_conf);
            stats.contacts_updated += 1;
        }
    }

    /// Flush buffered begin/end transitions: all begins, then all ends, each
    /// group in contact storage order.
    fn flush_contact_events(&mut self) {
        let mut begins = std::mem::take(&mut self.events.begins);
        if let Some(mut listener) = self.listeners.begin_contact.take() {
            for &id in &begins {
                listener(id);
            }
            self.listeners.begin_contact = Some(listener);
        }
        let mut ends = std::mem::take(&mut self.events.ends);
        if let Some(mut listener) = self.listeners.end_contact.take() {
            for &id in &ends {
                listener(id);
            }
            self.listeners.end_contact = Some(listener);
        }
        // Hand the emptied buffers back for reuse.
        begins.clear();
        ends.clear();
        self.events.begins = begins;
        self.events.ends = ends;
    }

    // ------------------------------------------------------------------
    // Regular solve
    // ------------------------------------------------------------------

    fn solve_reg(&mut self, conf: &StepConf) -> RegStepStats {
        let mut stats = RegStepStats::empty();

        // Fresh islanded flags.
        for i in 0..self.body_list.len() {
            let id = self.body_list[i];
            self.body_mut_ref(id).islanded = false;
        }
        for i in 0..self.contact_list.len() {
            let id = self.contact_list[i];
            self.contact_mut_ref(id).set_islanded(false);
        }
        self.joint_islanded.fill(false);

        let mut island = std::mem::take(&mut self.island);
        let mut stack: Vec<BodyId> = Vec::new();

        for seed_index in 0..self.body_list.len() {
            let seed = self.body_list[seed_index];
            {
                let body = self.body_ref(seed);
                if body.islanded || !body.is_awake() || !body.is_enabled() || !body.is_mobile() {
                    continue;
                }
            }

            island.clear();
            stack.clear();
            stack.push(seed);
            self.body_mut_ref(seed).islanded = true;

            while let Some(body_id) = stack.pop() {
                island.bodies.push(body_id);
                self.body_mut_ref(body_id).set_awake();

                // Static bodies anchor the island but do not grow it.
                if !self.body_ref(body_id).is_mobile() {
                    continue;
                }

                for edge_index in 0..self.body_ref(body_id).contacts.len() {
                    let (key, contact_id) = self.body_ref(body_id).contacts[edge_index];
                    {
                        let contact = self.contact_ref(contact_id);
                        if contact.is_islanded()
                            || !contact.is_enabled()
                            || !contact.is_touching()
                            || contact.is_sensor
                        {
                            continue;
                        }
                    }
                    self.contact_mut_ref(contact_id).set_islanded(true);
                    island.contacts.push(contact_id);

                    let other = if key.a.body == body_id {
                        key.b.body
                    } else {
                        key.a.body
                    };
                    if !self.body_ref(other).islanded {
                        self.body_mut_ref(other).islanded = true;
                        stack.push(other);
                    }
                }

                for edge_index in 0..self.body_ref(body_id).joints.len() {
                    let (other, joint_id) = self.body_ref(body_id).joints[edge_index];
                    if self.joint_islanded[joint_id.index()] {
                        continue;
                    }
                    if !self.body_ref(other).is_enabled() {
                        continue;
                    }
                    self.joint_islanded[joint_id.index()] = true;
                    island.joints.push(joint_id);
                    if !self.body_ref(other).islanded {
                        self.body_mut_ref(other).islanded = true;
                        stack.push(other);
                    }
                }
            }

            stats.islands_found += 1;
            let island_stats = self.solve_island(&island, conf);
            stats.islands_solved += u32::from(island_stats.solved);
            stats.body_sums += island.bodies.len() as u32;
            stats.velocity_iterations += island_stats.velocity_iterations;
            stats.position_iterations += island_stats.position_iterations;
            stats.min_separation = stats.min_separation.min(island_stats.min_separation);
            stats.max_incremental_impulse = stats
                .max_incremental_impulse
                .max(island_stats.max_incremental_impulse);
            stats.bodies_slept += island_stats.bodies_slept;
            stats.degenerate_constraints += island_stats.degenerate_constraints;

            // Statics may participate in several islands per step.
            for i in 0..island.bodies.len() {
                let id = island.bodies[i];
                if !self.body_ref(id).is_mobile() {
                    self.body_mut_ref(id).islanded = false;
                }
            }
        }

        self.island = island;

        // Refit moved bodies in the tree and pick up freshly-created pairs.
        for i in 0..self.body_list.len() {
            let id = self.body_list[i];
            let body = self.body_ref(id);
            if body.islanded && body.is_mobile() {
                self.synchronize_fixtures_of(id, conf.aabb_extension, conf.displacement_multiplier);
            }
        }
        stats.contacts_added = self.find_new_contacts();
        stats
    }

    /// Solve one island: integrate velocities, run the sequential-impulse
    /// velocity solver over joints and contacts, integrate positions, run
    /// the position solver, commit, and manage sleep.
    fn solve_island(&mut self, island: &Island, conf: &StepConf) -> IslandStats {
        let mut stats = IslandStats {
            min_separation: f64::INFINITY,
            ..IslandStats::default()
        };
        let h = conf.dt;
        let gravity = self.conf.gravity;

        let mut positions = std::mem::take(&mut self.positions);
        let mut velocities = std::mem::take(&mut self.velocities);
        positions.clear();
        velocities.clear();

        // Snapshot body state; sweeps restart from the current pose.
        for (index, &body_id) in island.bodies.iter().enumerate() {
            let body = self.body_mut_ref(body_id);
            body.island_index = index;
            body.sweep.pos0 = body.sweep.pos1;
            body.sweep.alpha0 = 0.0;

            let mut velocity = body.velocity;
            if body.is_dynamic() {
                velocity.linear +=
                    (gravity * body.gravity_scale + body.force * body.inv_mass) * h;
                velocity.angular += h * body.inv_inertia * body.torque;
                // Damping as a first-order decay, stable for any h.
                velocity.linear /= 1.0 + h * body.linear_damping;
                velocity.angular /= 1.0 + h * body.angular_damping;
            }
            positions.push(body.sweep.pos1);
            velocities.push(velocity);
        }

        let metas = self.joint_metas(island);
        let joint_conf = self.joint_step_conf(conf);

        // Mirror touching contacts into solver constraints.
        let dt_ratio = if conf.warm_starting {
            h * self.inv_dt0
        } else {
            0.0
        };
        let (mut vcs, pcs) = self.build_contact_constraints(&island.contacts, dt_ratio);

        for &joint_id in &island.joints {
            self.joint_mut_ref(joint_id).init_velocity_constraints(
                &metas,
                &mut positions,
                &mut velocities,
                &joint_conf,
            );
        }

        let velocity_conf = VelocityConstraintConf {
            velocity_threshold: conf.velocity_threshold,
            block_solve: conf.block_solve,
        };
        {
            let mut solver = ContactSolver {
                positions: &mut positions,
                velocities: &mut velocities,
            };
            solver.initialize_velocity_constraints(&mut vcs, &pcs, &velocity_conf);
            if conf.warm_starting {
                solver.warm_start(&vcs);
            }
        }

        for _ in 0..conf.velocity_iterations {
            for &joint_id in &island.joints {
                self.joint_mut_ref(joint_id)
                    .solve_velocity_constraints(&mut velocities, &joint_conf);
            }
            let result = ContactSolver {
                positions: &mut positions,
                velocities: &mut velocities,
            }
            .solve_velocity_constraints(&mut vcs);
            stats.velocity_iterations += 1;
            stats.max_incremental_impulse = stats
                .max_incremental_impulse
                .max(result.max_incremental_impulse);
            stats.degenerate_constraints += result.degenerate;
        }

        // Persist accumulated impulses for next step's warm start.
        for vc in &vcs {
            let contact = self.contact_mut_ref(vc.contact);
            for (point, vcp) in contact
                .manifold
                .points_mut()
                .iter_mut()
                .zip(vc.points.iter().take(vc.count))
            {
                point.normal_impulse = vcp.normal_impulse;
                point.tangent_impulse = vcp.tangent_impulse;
            }
        }

        integrate_positions(&mut positions, &mut velocities, h, conf);

        let position_conf = PositionSolverConf {
            baumgarte: conf.reg_baumgarte,
            linear_slop: conf.linear_slop,
            max_linear_correction: conf.max_linear_correction,
        };
        for _ in 0..conf.position_iterations {
            stats.position_iterations += 1;
            let min_separation = ContactSolver {
                positions: &mut positions,
                velocities: &mut velocities,
            }
            .solve_position_constraints(&pcs, &position_conf, None);
            stats.min_separation = stats.min_separation.min(min_separation);
            let contacts_solved = pcs.is_empty() || min_separation >= -3.0 * conf.linear_slop;

            let mut joints_solved = true;
            for &joint_id in &island.joints {
                let solved = self
                    .joint_mut_ref(joint_id)
                    .solve_position_constraints(&mut positions, &joint_conf);
                joints_solved = joints_solved && solved;
            }
            if contacts_solved && joints_solved {
                stats.solved = true;
                break;
            }
        }
        if conf.position_iterations == 0 {
            stats.solved = true;
        }

        // Commit transforms.
        for (index, &body_id) in island.bodies.iter().enumerate() {
            let body = self.body_mut_ref(body_id);
            body.sweep.pos1 = positions[index];
            body.velocity = velocities[index];
            body.synchronize_transform();
        }

        // Sleep management: the island sleeps as a unit.
        let lin_tol_sq = conf.linear_sleep_tolerance * conf.linear_sleep_tolerance;
        let ang_tol_sq = conf.angular_sleep_tolerance * conf.angular_sleep_tolerance;
        let mut min_sleep_time = f64::INFINITY;
        for &body_id in &island.bodies {
            let body = self.body_mut_ref(body_id);
            if !body.is_mobile() {
                continue;
            }
            if !body.allow_sleep
                || body.velocity.angular * body.velocity.angular > ang_tol_sq
                || body.velocity.linear.norm_squared() > lin_tol_sq
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += h;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }
        if min_sleep_time >= conf.time_to_sleep && stats.solved {
            for &body_id in &island.bodies {
                let body = self.body_mut_ref(body_id);
                if body.is_mobile() && body.is_awake() {
                    body.set_asleep();
                    stats.bodies_slept += 1;
                }
            }
        }

        // Report impulses now that the island is committed.
        for vc in &vcs {
            self.dispatch_post_solve(vc.contact, &impulses_of(vc));
        }

        self.positions = positions;
        self.velocities = velocities;
        stats
    }

    fn joint_metas(&self, island: &Island) -> BodyMetaMap {
        let mut metas = BodyMetaMap::with_capacity(island.bodies.len());
        for &body_id in &island.bodies {
            let body = self.body_ref(body_id);
            metas.insert(
                body_id,
                JointBodyMeta {
                    index: body.island_index,
                    local_center: body.sweep.local_center,
                    inv_mass: body.inv_mass,
                    inv_inertia: body.inv_inertia,
                },
            );
        }
        metas
    }

    fn joint_step_conf(&self, conf: &StepConf) -> JointStepConf {
        JointStepConf {
            dt: conf.dt,
            inv_dt: conf.inv_dt(),
            dt_ratio: conf.dt * self.inv_dt0,
            warm_starting: conf.warm_starting,
            linear_slop: conf.linear_slop,
            angular_slop: conf.angular_slop,
            max_linear_correction: conf.max_linear_correction,
            max_angular_correction: conf.max_angular_correction,
        }
    }

    fn build_contact_constraints(
        &self,
        contacts: &[ContactId],
        dt_ratio: f64,
    ) -> (Vec<ContactVelocityConstraint>, Vec<ContactPositionConstraint>) {
        let mut vcs = Vec::with_capacity(contacts.len());
        let mut pcs = Vec::with_capacity(contacts.len());
        for &contact_id in contacts {
            let contact = self.contact_ref(contact_id);
            debug_assert!(!contact.manifold.is_empty());

            let data = |side: &planar_contact::Contactable| {
                let body = self.body_ref(side.body);
                let shape = self.shape_ref(self.fixture_ref(side.fixture).shape);
                ConstraintBodyData {
                    index: body.island_index,
                    inv_mass: body.inv_mass,
                    inv_inertia: body.inv_inertia,
                    local_center: body.sweep.local_center,
                    radius: shape.vertex_radius(),
                }
            };

            let (vc, pc) = build_constraints(
                contact_id,
                &contact.manifold,
                contact.friction,
                contact.restitution,
                contact.tangent_speed,
                data(&contact.a),
                data(&contact.b),
                dt_ratio,
            );
            vcs.push(vc);
            pcs.push(pc);
        }
        (vcs, pcs)
    }

    // ------------------------------------------------------------------
    // Continuous (TOI) solve
    // ------------------------------------------------------------------

    fn solve_toi(&mut self, conf: &StepConf) -> ToiStepStats {
        let mut stats = ToiStepStats::empty();

        if self.step_complete {
            for i in 0..self.body_list.len() {
                let id = self.body_list[i];
                let body = self.body_mut_ref(id);
                body.islanded = false;
                body.sweep.alpha0 = 0.0;
            }
            for i in 0..self.contact_list.len() {
                let id = self.contact_list[i];
                let contact = self.contact_mut_ref(id);
                contact.set_islanded(false);
                contact.toi = None;
                contact.toi_count = 0;
            }
        }

        // Earliest-first sub-stepping.
        loop {
            let (min_contact, min_alpha) = self.find_min_toi(conf, &mut stats);

            let Some(contact_id) = min_contact else {
                self.step_complete = true;
                break;
            };
            if min_alpha >= 1.0 - 10.0 * f64::EPSILON {
                self.step_complete = true;
                break;
            }

            let (body_a, body_b) = {
                let contact = self.contact_ref(contact_id);
                (contact.a.body, contact.b.body)
            };
            let backup_a = self.body_ref(body_a).sweep;
            let backup_b = self.body_ref(body_b).sweep;
            self.body_mut_ref(body_a).advance(min_alpha);
            self.body_mut_ref(body_b).advance(min_alpha);

            // The TOI pose may no longer touch (or a listener may object).
            self.update_contact_single(
                contact_id,
                &ContactUpdateConf {
                    max_distance_iters: conf.max_distance_iters,
                    warm_starting: conf.warm_starting,
                },
            );
            {
                let contact = self.contact_mut_ref(contact_id);
                contact.toi = None;
                contact.toi_count += 1;
            }
            let usable = {
                let contact = self.contact_ref(contact_id);
                contact.is_enabled() && contact.is_touching()
            };
            if !usable {
                self.contact_mut_ref(contact_id).set_enabled(false);
                self.body_mut_ref(body_a).sweep = backup_a;
                self.body_mut_ref(body_b).sweep = backup_b;
                self.body_mut_ref(body_a).synchronize_transform();
                self.body_mut_ref(body_b).synchronize_transform();
                continue;
            }

            self.body_mut_ref(body_a).set_awake();
            self.body_mut_ref(body_b).set_awake();

            // Build the sub-island around the impact pair.
            let mut island = std::mem::take(&mut self.island);
            island.clear();
            island.bodies.push(body_a);
            island.bodies.push(body_b);
            island.contacts.push(contact_id);
            self.body_mut_ref(body_a).islanded = true;
            self.body_mut_ref(body_b).islanded = true;
            self.contact_mut_ref(contact_id).set_islanded(true);

            for &seed in &[body_a, body_b] {
                if !self.body_ref(seed).is_dynamic() {
                    continue;
                }
                self.grow_toi_island(seed, min_alpha, conf, &mut island);
            }

            let island_stats = self.solve_toi_island(&island, conf, min_alpha);
            stats.islands_found += 1;
            stats.islands_solved += u32::from(island_stats.solved);
            stats.velocity_iterations += island_stats.velocity_iterations;
            stats.position_iterations += island_stats.position_iterations;
            stats.min_separation = stats.min_separation.min(island_stats.min_separation);
            stats.sub_steps += 1;

            // Reset flags and invalidate cached TOIs of everything touched.
            for i in 0..island.bodies.len() {
                let body_id = island.bodies[i];
                self.body_mut_ref(body_id).islanded = false;
                for edge in 0..self.body_ref(body_id).contacts.len() {
                    let (_, cid) = self.body_ref(body_id).contacts[edge];
                    let contact = self.contact_mut_ref(cid);
                    contact.set_islanded(false);
                    contact.toi = None;
                }
                if self.body_ref(body_id).is_dynamic() {
                    self.synchronize_fixtures_of(
                        body_id,
                        conf.aabb_extension,
                        conf.displacement_multiplier,
                    );
                }
            }
            self.island = island;

            stats.contacts_added += self.find_new_contacts();

            if self.sub_stepping {
                self.step_complete = false;
                break;
            }
            if stats.sub_steps >= conf.max_sub_steps {
                self.step_complete = true;
                break;
            }
        }
        stats
    }

    /// Compute (or reuse) the TOI of every eligible contact, returning the
    /// earliest.
    fn find_min_toi(
        &mut self,
        conf: &StepConf,
        stats: &mut ToiStepStats,
    ) -> (Option<ContactId>, f64) {
        let toi_conf = ToiConf {
            target_depth: conf.toi_target_depth,
            tolerance: conf.toi_tolerance,
            max_toi_iters: conf.max_toi_iters,
            max_root_iters: conf.max_toi_root_iters,
            max_distance_iters: conf.max_distance_iters,
        };

        let mut min_contact = None;
        let mut min_alpha = 1.0;

        for i in 0..self.contact_list.len() {
            let id = self.contact_list[i];
            let (key, enabled, sensor, toi_cached, toi_count) = {
                let contact = self.contact_ref(id);
                (
                    contact.key(),
                    contact.is_enabled(),
                    contact.is_sensor,
                    contact.toi,
                    contact.toi_count,
                )
            };
            if !enabled || sensor {
                continue;
            }
            // Pathological pile-ups stop consuming sub-steps.
            if toi_count > conf.max_sub_steps {
                continue;
            }
            stats.contacts_checked += 1;

            let alpha = if let Some(alpha) = toi_cached {
                alpha
            } else {
                let body_a = self.body_ref(key.a.body);
                let body_b = self.body_ref(key.b.body);
                let active_a = body_a.is_awake() && body_a.is_mobile();
                let active_b = body_b.is_awake() && body_b.is_mobile();
                if !active_a && !active_b {
                    continue;
                }
                // Only bullets take TOI against other dynamics.
                let collide_a = body_a.is_bullet() || !body_a.is_dynamic();
                let collide_b = body_b.is_bullet() || !body_b.is_dynamic();
                if !collide_a && !collide_b {
                    continue;
                }

                // Advance both sweeps to the later of their interval starts.
                let alpha0 = body_a.sweep.alpha0.max(body_b.sweep.alpha0);
                debug_assert!(alpha0 < 1.0);
                let mut sweep_a = body_a.sweep;
                let mut sweep_b = body_b.sweep;
                if sweep_a.alpha0 < alpha0 {
                    sweep_a.advance0(alpha0);
                }
                if sweep_b.alpha0 < alpha0 {
                    sweep_b.advance0(alpha0);
                }

                let proxy_a = self
                    .shape_ref(self.fixture_ref(key.a.fixture).shape)
                    .distance_proxy(key.a.child as usize);
                let proxy_b = self
                    .shape_ref(self.fixture_ref(key.b.fixture).shape)
                    .distance_proxy(key.b.child as usize);

                let output = time_of_impact(&proxy_a, sweep_a, &proxy_b, sweep_b, 1.0, &toi_conf);
                stats.contacts_updated_toi += 1;
                stats.max_distance_iters = stats.max_distance_iters.max(output.max_distance_iters);
                stats.max_toi_iters = stats.max_toi_iters.max(output.toi_iters);
                stats.max_root_iters = stats.max_root_iters.max(output.max_root_iters);

                let alpha = match output.state {
                    ToiState::Touching => (alpha0 + (1.0 - alpha0) * output.time).min(1.0),
                    _ => 1.0,
                };
                self.contact_mut_ref(id).toi = Some(alpha);
                alpha
            };

            if alpha < min_alpha {
                min_alpha = alpha;
                min_contact = Some(id);
            }
        }
        (min_contact, min_alpha)
    }

    /// Pull the seed body's other touching contacts into the TOI island,
    /// tentatively advancing their opposite bodies to the impact time.
    fn grow_toi_island(&mut self, seed: BodyId, alpha: f64, conf: &StepConf, island: &mut Island) {
        for edge in 0..self.body_ref(seed).contacts.len() {
            let (key, contact_id) = self.body_ref(seed).contacts[edge];
            if self.contact_ref(contact_id).is_islanded()
                || self.contact_ref(contact_id).is_sensor
            {
                continue;
            }
            let other = if key.a.body == seed { key.b.body } else { key.a.body };
            // Dynamic non-bullet neighbors wait for the regular solver.
            if self.body_ref(other).is_dynamic()
                && !self.body_ref(seed).is_bullet()
                && !self.body_ref(other).is_bullet()
            {
                continue;
            }

            let backup = self.body_ref(other).sweep;
            if !self.body_ref(other).islanded {
                self.body_mut_ref(other).advance(alpha);
            }
            self.update_contact_single(
                contact_id,
                &ContactUpdateConf {
                    max_distance_iters: conf.max_distance_iters,
                    warm_starting: conf.warm_starting,
                },
            );

            let usable = {
                let contact = self.contact_ref(contact_id);
                contact.is_enabled() && contact.is_touching()
            };
            if !usable {
                self.body_mut_ref(other).sweep = backup;
                self.body_mut_ref(other).synchronize_transform();
                continue;
            }

            self.contact_mut_ref(contact_id).set_islanded(true);
            island.contacts.push(contact_id);

            if self.body_ref(other).islanded {
                continue;
            }
            self.body_mut_ref(other).islanded = true;
            if self.body_ref(other).is_mobile() {
                self.body_mut_ref(other).set_awake();
            }
            island.bodies.push(other);
        }
    }

    /// Solve a TOI sub-island: position-correct the impact pair against the
    /// (parked) rest of the island, then re-solve velocities and integrate
    /// the remaining step time.
    fn solve_toi_island(&mut self, island: &Island, conf: &StepConf, alpha: f64) -> IslandStats {
        let mut stats = IslandStats {
            min_separation: f64::INFINITY,
            ..IslandStats::default()
        };

        let mut positions = std::mem::take(&mut self.positions);
        let mut velocities = std::mem::take(&mut self.velocities);
        positions.clear();
        velocities.clear();

        for (index, &body_id) in island.bodies.iter().enumerate() {
            let body = self.body_mut_ref(body_id);
            body.island_index = index;
            positions.push(body.sweep.pos1);
            velocities.push(body.velocity);
        }

        // Accumulated impulses are meaningless across a sub-step.
        let (mut vcs, pcs) = self.build_contact_constraints(&island.contacts, 0.0);

        // The impact pair occupies island slots 0 and 1.
        let toi_bodies = Some((0, 1));
        let position_conf = PositionSolverConf {
            baumgarte: conf.toi_baumgarte,
            linear_slop: conf.linear_slop,
            max_linear_correction: conf.max_linear_correction,
        };
        for _ in 0..conf.toi_position_iterations {
            stats.position_iterations += 1;
            let min_separation = ContactSolver {
                positions: &mut positions,
                velocities: &mut velocities,
            }
            .solve_position_constraints(&pcs, &position_conf, toi_bodies);
            stats.min_separation = stats.min_separation.min(min_separation);
            if min_separation >= -1.5 * conf.linear_slop {
                stats.solved = true;
                break;
            }
        }

        // Leap of faith: the corrected poses become the new sweep origins
        // for any further TOI queries this step.
        for (index, &body_id) in island.bodies.iter().enumerate() {
            self.body_mut_ref(body_id).sweep.pos0 = positions[index];
        }

        let velocity_conf = VelocityConstraintConf {
            velocity_threshold: conf.velocity_threshold,
            block_solve: conf.block_solve,
        };
        {
            let mut solver = ContactSolver {
                positions: &mut positions,
                velocities: &mut velocities,
            };
            solver.initialize_velocity_constraints(&mut vcs, &pcs, &velocity_conf);
            // No warm starting: these constraints live for one sub-step.
        }
        for _ in 0..conf.toi_velocity_iterations {
            let result = ContactSolver {
                positions: &mut positions,
                velocities: &mut velocities,
            }
            .solve_velocity_constraints(&mut vcs);
            stats.velocity_iterations += 1;
            stats.max_incremental_impulse = stats
                .max_incremental_impulse
                .max(result.max_incremental_impulse);
            stats.degenerate_constraints += result.degenerate;
        }

        let h = (1.0 - alpha) * conf.dt;
        integrate_positions(&mut positions, &mut velocities, h, conf);

        for (index, &body_id) in island.bodies.iter().enumerate() {
            let body = self.body_mut_ref(body_id);
            body.sweep.pos1 = positions[index];
            body.velocity = velocities[index];
            body.synchronize_transform();
        }

        for vc in &vcs {
            self.dispatch_post_solve(vc.contact, &impulses_of(vc));
        }

        self.positions = positions;
        self.velocities = velocities;
        stats
    }
}

/// Integrate island positions, capping per-step translation and rotation.
fn integrate_positions(
    positions: &mut [planar_types::Position],
    velocities: &mut [Velocity],
    h: f64,
    conf: &StepConf,
) {
    for (position, velocity) in positions.iter_mut().zip(velocities.iter_mut()) {
        let translation = velocity.linear * h;
        if translation.norm_squared() > conf.max_translation * conf.max_translation {
            velocity.linear *= conf.max_translation / translation.norm();
        }
        let rotation = velocity.angular * h;
        if rotation.abs() > conf.max_rotation {
            velocity.angular *= conf.max_rotation / rotation.abs();
        }
        position.linear += velocity.linear * h;
        position.angular += velocity.angular * h;
    }
}

fn contactable(leaf: &planar_collision::TreeLeaf) -> planar_contact::Contactable {
    planar_contact::Contactable {
        body: leaf.body,
        fixture: leaf.fixture,
        child: leaf.child,
    }
}

fn impulses_of(vc: &ContactVelocityConstraint) -> ContactImpulses {
    let mut impulses = ContactImpulses {
        count: vc.count,
        ..ContactImpulses::default()
    };
    for (i, point) in vc.points.iter().take(vc.count).enumerate() {
        impulses.normal[i] = point.normal_impulse;
        impulses.tangent[i] = point.tangent_impulse;
    }
    impulses
}
