use glam::Vec2;
use log::{debug, trace, warn};

use std::collections::HashMap;
use std::time::Instant;

use crate::api::PhysicsWorldApi;
use crate::body::{Body, BodyState, Shape};
use crate::broadphase::BroadPhase;
use crate::dispatch::ListenerRegistry;
use crate::error::{PhysicsError, Result};
use crate::geometry::Geometry;
use crate::joint::{Joint, JointTarget};
use crate::narrowphase::Narrowphase;
use crate::solver::{ContactSolver, ImpulseCache, JointSolver};
use crate::types::*;

/// Persistent rigid-body world.
///
/// Bodies live in a dense arena in insertion order; ids map to arena slots.
/// Ids are never reused, even after `remove_body` or `clear`.
pub struct PhysicsWorld {
    cfg: WorldConfig,
    frame_count: u64,
    total_time: f64,
    next_body_id: BodyId,
    next_joint_id: JointId,

    bodies: Vec<Body>,
    index: HashMap<BodyId, usize>,
    joints: Vec<Joint>,

    broadphase: BroadPhase,
    // Accumulated contact impulses from the last step, keyed by body-id pair
    contact_cache: ImpulseCache,
    listeners: ListenerRegistry,

    last_stats: WorldStats,
    last_timing: Option<WorldTiming>,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::with_config(WorldConfig::default())
    }
}

impl PhysicsWorld {
    fn with_config(cfg: WorldConfig) -> Self {
        Self {
            broadphase: BroadPhase::new(cfg.broad_phase, cfg.cell_size),
            cfg,
            frame_count: 0,
            total_time: 0.0,
            next_body_id: 0,
            next_joint_id: 0,
            bodies: Vec::new(),
            index: HashMap::new(),
            joints: Vec::new(),
            contact_cache: ImpulseCache::new(),
            listeners: ListenerRegistry::new(),
            last_stats: WorldStats::default(),
            last_timing: None,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.cfg
    }

    /// Bodies in insertion order.
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Joints in insertion order.
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    fn body_index(&self, id: BodyId) -> Result<usize> {
        self.index.get(&id).copied().ok_or(PhysicsError::UnknownBody(id))
    }

    fn joint_index(&self, id: JointId) -> Result<usize> {
        self.joints
            .iter()
            .position(|j| j.id() == id)
            .ok_or(PhysicsError::UnknownJoint(id))
    }

    fn insert_body(&mut self, body: Body) -> BodyId {
        let id = body.id();
        self.index.insert(id, self.bodies.len());
        self.bodies.push(body);
        id
    }

    fn wake_all(&mut self) {
        for body in &mut self.bodies {
            body.wake();
        }
    }

    fn wake_joint_bodies(&mut self, body: BodyId, other: Option<BodyId>) {
        for id in std::iter::once(body).chain(other) {
            if let Some(&i) = self.index.get(&id) {
                self.bodies[i].wake();
            }
        }
    }

    fn insert_joint(
        &mut self,
        body: BodyId,
        anchor: Vec2,
        target: JointTarget,
        config: JoinConstraintConfig,
    ) -> JointId {
        self.next_joint_id += 1;
        let id = self.next_joint_id;
        self.joints.push(Joint::new(id, body, anchor, target, config));
        debug!("joint {id} added to body {body} ({target:?})");
        id
    }

    fn reindex(&mut self) {
        self.index.clear();
        self.index.extend(self.bodies.iter().enumerate().map(|(i, b)| (b.id(), i)));
    }

    fn world_anchors(&self, joint: &Joint) -> Option<(Vec2, Vec2)> {
        let a = self.body(joint.body())?.world_point(joint.anchor());
        let b = match joint.target() {
            JointTarget::Body { id, anchor } => self.body(id)?.world_point(anchor),
            JointTarget::Point(p) => p,
        };
        Some((a, b))
    }

    fn restore(&mut self, snapshot: &[BodyState]) {
        for (body, state) in self.bodies.iter_mut().zip(snapshot) {
            body.restore(*state);
        }
    }
}

impl PhysicsWorldApi for PhysicsWorld {
    fn try_new(cfg: WorldConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self::with_config(cfg))
    }

    fn step(&mut self, dt: f32) -> Result<()> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "time step must be finite and positive (got {dt})"
            )));
        }
        let t_all = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        let snapshot: Vec<BodyState> = self.bodies.iter().map(Body::state).collect();

        if self.cfg.enable_gravity {
            let g = self.cfg.gravity;
            for body in &mut self.bodies {
                body.apply_acceleration(g, dt);
            }
        }

        let t0 = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        let pairs = self.broadphase.find_pairs(&self.bodies);
        let broadphase_ms = t0.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0);

        let t1 = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        let manifolds: Vec<(usize, usize, Manifold)> = pairs
            .iter()
            .filter_map(|&(a, b)| {
                Narrowphase::collide(&self.bodies[a], &self.bodies[b]).map(|m| (a, b, m))
            })
            .collect();
        let narrowphase_ms = t1.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0);

        let t2 = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        let index = &self.index;
        let lookup = |id| index.get(&id).copied();
        let mut joint_solver = JointSolver::new(&self.bodies, &self.joints, lookup, &self.cfg, dt);
        let mut contact_solver =
            ContactSolver::new(&self.bodies, &manifolds, &self.contact_cache, &self.cfg);
        if self.cfg.warm_starting {
            contact_solver.warm_start(&mut self.bodies);
        }
        for _ in 0..self.cfg.velocity_iterations {
            joint_solver.solve_velocities(&mut self.bodies);
            contact_solver.solve_velocities(&mut self.bodies);
        }
        let solver_ms = t2.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0);

        let t3 = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        let mut sleeping = 0;
        for body in &mut self.bodies {
            if self.cfg.enable_sleep_mode {
                body.update_sleep(self.cfg.sleep_motion, self.cfg.sleep_frames);
                sleeping += usize::from(body.is_sleeping());
            }
            body.integrate(dt);
        }
        contact_solver.correct_positions(&mut self.bodies, &self.cfg);
        let integrate_ms = t3.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0);

        if let Some(body) = self.bodies.iter().find(|b| !b.is_finite()).map(Body::id) {
            warn!("step {} diverged on body {body}; state rolled back", self.frame_count + 1);
            self.restore(&snapshot);
            return Err(PhysicsError::NumericalDivergence { body });
        }
        self.contact_cache = contact_solver.impulses();

        let t4 = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        let mut notifications = 0;
        for body in &mut self.bodies {
            if let Some((translation, rotation)) = body.take_pending_delta() {
                notifications += 1;
                self.listeners.emit(body.id(), translation, rotation);
            }
        }
        let dispatch_ms = t4.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0);

        self.frame_count += 1;
        self.total_time += dt as f64;
        self.last_stats = WorldStats {
            bodies: self.bodies.len(),
            joints: self.joints.len(),
            candidate_pairs: pairs.len(),
            contacts: contact_solver.len(),
            notifications,
            sleeping,
        };
        trace!(
            "step {}: {} pairs, {} contacts, {} joint rows, {} notified",
            self.frame_count,
            pairs.len(),
            contact_solver.len(),
            joint_solver.len(),
            notifications
        );
        if let Some(t_all) = t_all {
            self.last_timing = Some(WorldTiming {
                step_ms: t_all.elapsed().as_secs_f64() * 1000.0,
                broadphase_ms,
                narrowphase_ms,
                solver_ms,
                integrate_ms,
                dispatch_ms,
            });
        }
        Ok(())
    }

    fn set_gravity(&mut self, gravity: Vec2) {
        self.cfg.gravity = gravity;
        self.wake_all();
    }

    fn set_sleep_mode(&mut self, enabled: bool) {
        self.cfg.enable_sleep_mode = enabled;
        if !enabled {
            self.wake_all();
        }
        debug!("sleep mode {}", if enabled { "enabled" } else { "disabled" });
    }

    fn silence(&mut self) {
        for body in &mut self.bodies {
            body.silence();
        }
    }

    fn clear(&mut self) {
        debug!("clearing {} bodies and {} joints", self.bodies.len(), self.joints.len());
        self.bodies.clear();
        self.index.clear();
        self.joints.clear();
        self.contact_cache.clear();
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn total_time(&self) -> f64 {
        self.total_time
    }

    fn kinetic_energy(&self) -> f32 {
        self.bodies.iter().map(Body::kinetic_energy).sum()
    }

    // --- Bodies ------------------------------------------------------------

    fn add_body(&mut self, geometry: Geometry, position: Vec2, meta: Meta) -> Result<BodyId> {
        if !position.is_finite() {
            return Err(PhysicsError::InvalidShape("body position must be finite".into()));
        }
        // the id is only committed once the body is built
        let id = self.next_body_id + 1;
        let body = Body::new(id, geometry, position, meta)?;
        self.next_body_id = id;
        debug!(
            "body {id} added at {position} (fixed: {}, transparent: {})",
            meta.is_fixed, meta.is_transparent
        );
        Ok(self.insert_body(body))
    }

    fn add_circle(&mut self, center: Vec2, radius: f32, meta: Meta) -> Result<BodyId> {
        self.add_body(Geometry::circle(radius)?, center, meta)
    }

    fn add_polygon(&mut self, vertices: &[Vec2], meta: Meta) -> Result<BodyId> {
        let (geometry, centroid) = Geometry::concave(vertices)?;
        self.add_body(geometry, centroid, meta)
    }

    fn add_rect(&mut self, x: f32, y: f32, width: f32, height: f32, meta: Meta) -> Result<BodyId> {
        let center = Vec2::new(x + width * 0.5, y + height * 0.5);
        self.add_body(Geometry::rect(width, height)?, center, meta)
    }

    fn add_regular_polygon(
        &mut self,
        center: Vec2,
        sides: usize,
        radius: f32,
        meta: Meta,
    ) -> Result<BodyId> {
        self.add_body(Geometry::regular_polygon(sides, radius)?, center, meta)
    }

    fn clone_body(&mut self, id: BodyId, meta: MetaPartial) -> Result<BodyId> {
        let source = &self.bodies[self.body_index(id)?];
        let merged = meta.merged(source.meta());
        merged.validate()?;
        let clone_id = self.next_body_id + 1;
        let body = source.cloned_as(clone_id, merged)?;
        self.next_body_id = clone_id;
        debug!("body {clone_id} cloned from {id}");
        Ok(self.insert_body(body))
    }

    fn remove_body(&mut self, id: BodyId) -> Result<()> {
        let idx = self.body_index(id)?;
        self.bodies.remove(idx);
        self.reindex();
        let joints_before = self.joints.len();
        self.joints.retain(|j| !j.involves(id));
        self.contact_cache.retain(|&(a, b), _| a != id && b != id);
        // whatever rested on it has to fall again
        self.wake_all();
        debug!("body {id} removed with {} joint(s)", joints_before - self.joints.len());
        Ok(())
    }

    fn has_body(&self, id: BodyId) -> bool {
        self.index.contains_key(&id)
    }

    fn body(&self, id: BodyId) -> Option<&Body> {
        self.index.get(&id).map(|&i| &self.bodies[i])
    }

    fn body_ids(&self) -> Vec<BodyId> {
        self.bodies.iter().map(Body::id).collect()
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn meta(&self, id: BodyId) -> Option<&Meta> {
        self.body(id).map(Body::meta)
    }

    fn update_meta(&mut self, id: BodyId, meta: MetaPartial) -> Result<()> {
        let idx = self.body_index(id)?;
        let body = &mut self.bodies[idx];
        let merged = meta.merged(body.meta());
        body.set_meta(merged)
    }

    fn is_sleeping(&self, id: BodyId) -> Option<bool> {
        self.body(id).map(Body::is_sleeping)
    }

    fn translate_body(&mut self, id: BodyId, delta: Vec2) -> Result<()> {
        if !delta.is_finite() {
            return Err(PhysicsError::InvalidConfiguration("translation must be finite".into()));
        }
        let idx = self.body_index(id)?;
        self.bodies[idx].translate(delta);
        Ok(())
    }

    // --- Joints ------------------------------------------------------------

    fn add_join_constraint(
        &mut self,
        a: BodyId,
        anchor_a: Vec2,
        b: BodyId,
        anchor_b: Vec2,
        config: JoinConstraintConfig,
    ) -> Result<JointId> {
        config.validate()?;
        if a == b {
            return Err(PhysicsError::SelfJoint(a));
        }
        let local_a = self.bodies[self.body_index(a)?].local_point(anchor_a);
        let local_b = self.bodies[self.body_index(b)?].local_point(anchor_b);
        Ok(self.insert_joint(a, local_a, JointTarget::Body { id: b, anchor: local_b }, config))
    }

    fn add_point_constraint(
        &mut self,
        body: BodyId,
        anchor: Vec2,
        point: Vec2,
        config: JoinConstraintConfig,
    ) -> Result<JointId> {
        config.validate()?;
        if !point.is_finite() {
            let reason = "constraint point must be finite".into();
            return Err(PhysicsError::InvalidConfiguration(reason));
        }
        let local = self.bodies[self.body_index(body)?].local_point(anchor);
        Ok(self.insert_joint(body, local, JointTarget::Point(point), config))
    }

    fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.iter().find(|j| j.id() == id)
    }

    fn joint_ids(&self) -> Vec<JointId> {
        self.joints.iter().map(Joint::id).collect()
    }

    fn update_joint(&mut self, id: JointId, config: JoinConstraintConfigPartial) -> Result<()> {
        let idx = self.joint_index(id)?;
        let merged = config.merged(self.joints[idx].config());
        merged.validate()?;
        self.joints[idx].set_config(merged);
        let (body, other) = (self.joints[idx].body(), self.joints[idx].other_body());
        self.wake_joint_bodies(body, other);
        Ok(())
    }

    fn remove_joint(&mut self, id: JointId) -> Result<()> {
        let idx = self.joint_index(id)?;
        let joint = self.joints.remove(idx);
        self.wake_joint_bodies(joint.body(), joint.other_body());
        debug!("joint {id} removed");
        Ok(())
    }

    fn joint_anchors(&self, id: JointId) -> Option<(Vec2, Vec2)> {
        self.joint(id).and_then(|j| self.world_anchors(j))
    }

    // --- Queries -----------------------------------------------------------

    fn is_point_inside_body(&self, id: BodyId, p: Vec2) -> bool {
        self.body(id).is_some_and(|b| b.contains_point(p))
    }

    fn query_point(&self, p: Vec2) -> Vec<BodyId> {
        self.bodies.iter().filter(|b| b.contains_point(p)).map(Body::id).collect()
    }

    fn raycast(&self, origin: Vec2, dir: Vec2, max_t: f32) -> Option<(BodyId, RayHit)> {
        let mut best: Option<(BodyId, RayHit)> = None;
        for body in self.bodies.iter().filter(|b| !b.is_transparent()) {
            let Some(hit) = Narrowphase::ray_body(origin, dir, body) else { continue };
            if hit.toi > max_t {
                continue;
            }
            if best.is_none_or(|(_, b)| hit.toi < b.toi) {
                best = Some((body.id(), hit));
            }
        }
        best
    }

    fn bodies_in_contact(&self, a: BodyId, b: BodyId, from_cache: bool) -> bool {
        if from_cache {
            let cache = &self.contact_cache;
            return cache.contains_key(&(a, b)) || cache.contains_key(&(b, a));
        }
        let (Some(ba), Some(bb)) = (self.body(a), self.body(b)) else { return false };
        if a == b || ba.is_transparent() || bb.is_transparent() {
            return false;
        }
        ba.aabb().overlaps(&bb.aabb()) && Narrowphase::collide(ba, bb).is_some()
    }

    // --- Host boundary -----------------------------------------------------

    fn for_each_element(&self, mut f: impl FnMut(&Shape<'_>)) {
        for body in &self.bodies {
            f(&body.shape());
        }
    }

    fn register_listener(
        &mut self,
        listener: impl FnMut(BodyId, Vec2, f32) + 'static,
    ) -> ListenerId {
        let id = self.listeners.register(Box::new(listener));
        debug!("listener {id} registered");
        id
    }

    fn unregister_listener(&mut self, id: ListenerId) -> bool {
        let removed = self.listeners.unregister(id);
        if !removed {
            warn!("unregister of unknown listener {id}");
        }
        removed
    }

    // --- Diagnostics -------------------------------------------------------

    fn stats(&self) -> WorldStats {
        WorldStats { bodies: self.bodies.len(), joints: self.joints.len(), ..self.last_stats }
    }

    fn timing(&self) -> Option<WorldTiming> {
        self.last_timing
    }
}
