use glam::Vec2;

use crate::body::{Body, Shape};
use crate::error::Result;
use crate::geometry::Geometry;
use crate::joint::Joint;
use crate::types::*;

/// Host-facing contract of the rigid-body world.
pub trait PhysicsWorldApi {
    /// Construct a world, rejecting invalid configuration.
    fn try_new(cfg: WorldConfig) -> Result<Self>
    where
        Self: Sized;

    // --- Simulation --------------------------------------------------------

    /// Advance by `dt` seconds. On error the world is unchanged.
    fn step(&mut self, dt: f32) -> Result<()>;

    /// Also wakes every sleeping body.
    fn set_gravity(&mut self, gravity: Vec2);

    /// Toggle sleep mode. Disabling it wakes every body.
    fn set_sleep_mode(&mut self, enabled: bool);

    /// Zero every body's linear and angular velocity.
    fn silence(&mut self);

    /// Remove all bodies and joints. Listeners and counters are kept.
    fn clear(&mut self);

    fn frame_count(&self) -> u64;

    /// Simulated seconds across all successful steps.
    fn total_time(&self) -> f64;

    fn kinetic_energy(&self) -> f32;

    // --- Bodies ------------------------------------------------------------

    /// Insert a body whose centroid sits at `position`.
    fn add_body(&mut self, geometry: Geometry, position: Vec2, meta: Meta) -> Result<BodyId>;

    /// Circle convenience.
    fn add_circle(&mut self, center: Vec2, radius: f32, meta: Meta) -> Result<BodyId>;

    /// Simple polygon from world-space vertices; the body sits at their
    /// centroid. Concave outlines are split into convex parts.
    fn add_polygon(&mut self, vertices: &[Vec2], meta: Meta) -> Result<BodyId>;

    /// Axis-aligned rectangle with top-left corner at `(x, y)`.
    fn add_rect(&mut self, x: f32, y: f32, width: f32, height: f32, meta: Meta) -> Result<BodyId>;

    fn add_regular_polygon(
        &mut self,
        center: Vec2,
        sides: usize,
        radius: f32,
        meta: Meta,
    ) -> Result<BodyId>;

    /// Copy of `id` under a fresh id, with `meta` applied on top of its metadata.
    fn clone_body(&mut self, id: BodyId, meta: MetaPartial) -> Result<BodyId>;

    /// Also removes every joint attached to the body.
    fn remove_body(&mut self, id: BodyId) -> Result<()>;

    fn has_body(&self, id: BodyId) -> bool;
    fn body(&self, id: BodyId) -> Option<&Body>;
    fn body_ids(&self) -> Vec<BodyId>;
    fn body_count(&self) -> usize;
    fn meta(&self, id: BodyId) -> Option<&Meta>;
    fn update_meta(&mut self, id: BodyId, meta: MetaPartial) -> Result<()>;
    /// `None` for an unknown id. Always false while sleep mode is off.
    fn is_sleeping(&self, id: BodyId) -> Option<bool>;

    /// Move by `delta`. Wakes the body.
    fn translate_body(&mut self, id: BodyId, delta: Vec2) -> Result<()>;

    // --- Joints ------------------------------------------------------------

    /// Join two bodies at world-space anchors.
    fn add_join_constraint(
        &mut self,
        a: BodyId,
        anchor_a: Vec2,
        b: BodyId,
        anchor_b: Vec2,
        config: JoinConstraintConfig,
    ) -> Result<JointId>;

    /// Tie a body anchor (world space) to a fixed world point.
    fn add_point_constraint(
        &mut self,
        body: BodyId,
        anchor: Vec2,
        point: Vec2,
        config: JoinConstraintConfig,
    ) -> Result<JointId>;

    fn joint(&self, id: JointId) -> Option<&Joint>;
    fn joint_ids(&self) -> Vec<JointId>;
    fn update_joint(&mut self, id: JointId, config: JoinConstraintConfigPartial) -> Result<()>;
    fn remove_joint(&mut self, id: JointId) -> Result<()>;

    /// Current world-space ends of a joint, for drawing.
    fn joint_anchors(&self, id: JointId) -> Option<(Vec2, Vec2)>;

    // --- Queries -----------------------------------------------------------

    fn is_point_inside_body(&self, id: BodyId, p: Vec2) -> bool;

    /// All bodies containing `p`, in insertion order.
    fn query_point(&self, p: Vec2) -> Vec<BodyId>;

    /// Closest non-transparent body hit within `max_t`.
    fn raycast(&self, origin: Vec2, dir: Vec2, max_t: f32) -> Option<(BodyId, RayHit)>;

    /// `from_cache` answers from the last step's contacts; otherwise the pair
    /// is tested now.
    fn bodies_in_contact(&self, a: BodyId, b: BodyId, from_cache: bool) -> bool;

    // --- Host boundary -----------------------------------------------------

    /// Read-only snapshot of every body's shape, in insertion order.
    fn for_each_element(&self, f: impl FnMut(&Shape<'_>));

    fn register_listener(
        &mut self,
        listener: impl FnMut(BodyId, Vec2, f32) + 'static,
    ) -> ListenerId;

    fn unregister_listener(&mut self, id: ListenerId) -> bool;

    fn register_element_position_update_callback(
        &mut self,
        callback: impl FnMut(BodyId, Vec2, f32) + 'static,
    ) -> ListenerId {
        self.register_listener(callback)
    }

    fn unregister_element_position_update_callback(&mut self, id: ListenerId) -> bool {
        self.unregister_listener(id)
    }

    // --- Diagnostics -------------------------------------------------------

    fn stats(&self) -> WorldStats;

    /// Phase timings of the last step, when `enable_timing` is set.
    fn timing(&self) -> Option<WorldTiming>;
}

/// Contact and ray primitives over world-space geometry.
pub trait NarrowphaseApi {
    // Overlaps --------------------------------------------------------------

    fn circle_circle(ca: Vec2, ra: f32, cb: Vec2, rb: f32) -> Option<Manifold>;
    /// Normal points from the polygon toward the circle.
    fn polygon_circle(poly: &[Vec2], center: Vec2, radius: f32) -> Option<Manifold>;
    fn polygon_polygon(a: &[Vec2], b: &[Vec2]) -> Option<Manifold>;

    // Rays ------------------------------------------------------------------

    fn ray_circle(origin: Vec2, dir: Vec2, center: Vec2, r: f32) -> Option<RayHit>;
    fn ray_polygon(origin: Vec2, dir: Vec2, poly: &[Vec2]) -> Option<RayHit>;
}
