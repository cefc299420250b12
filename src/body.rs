use glam::Vec2;

use crate::error::Result;
use crate::geometry::Geometry;
use crate::types::{Aabb, BodyId, Meta, Transform};

/// Discriminator exposed to hosts (`shapeType`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Circle,
    Polygon,
}

/// Read-only view of a body's shape, handed out by `for_each_element`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Shape<'a> {
    pub id: BodyId,
    /// World-space centroid.
    pub center: Vec2,
    pub angle: f32,
    geometry: &'a Geometry,
}

impl<'a> Shape<'a> {
    /// Concave polygons report `Polygon`; their vertices are the outline.
    pub fn kind(&self) -> ShapeKind {
        match self.geometry {
            Geometry::Circle { .. } => ShapeKind::Circle,
            Geometry::Polygon { .. } | Geometry::Concave { .. } => ShapeKind::Polygon,
        }
    }

    pub fn radius(&self) -> Option<f32> {
        match self.geometry {
            Geometry::Circle { radius } => Some(*radius),
            _ => None,
        }
    }

    /// World-space outline, recomputed on every call (empty for circles).
    pub fn vertices(&self) -> impl Iterator<Item = Vec2> + 'a {
        self.geometry.world_vertices(Transform::new(self.center, self.angle))
    }

    pub fn geometry(&self) -> &'a Geometry {
        self.geometry
    }
}

/// Dynamic state saved before a step so a failed step can be rolled back.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct BodyState {
    position: Vec2,
    angle: f32,
    velocity: Vec2,
    angular_velocity: f32,
    sleeping: bool,
    motionless_frames: u32,
}

/// A simulated rigid body: one geometry, one `Meta`, a world position.
#[derive(Clone, Debug)]
pub struct Body {
    id: BodyId,
    geometry: Geometry,
    position: Vec2,
    meta: Meta,
    inv_mass: f32,
    inertia: f32,
    inv_inertia: f32,
    /// Transform at the time of the last dispatched notification.
    notified: Transform,
    sleeping: bool,
    motionless_frames: u32,
}

impl Body {
    /// `geometry` goes through [`Geometry::validated`], so only checked shapes
    /// make it into a body.
    pub(crate) fn new(id: BodyId, geometry: Geometry, position: Vec2, meta: Meta) -> Result<Self> {
        meta.validate()?;
        let geometry = geometry.validated()?;
        let mut body = Self {
            id,
            geometry,
            position,
            meta,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            notified: Transform::new(position, meta.angle),
            sleeping: false,
            motionless_frames: 0,
        };
        body.refresh_mass_properties();
        Ok(body)
    }

    /// Copy of this body under a new id, with the notification baseline reset.
    pub(crate) fn cloned_as(&self, id: BodyId, meta: Meta) -> Result<Self> {
        Self::new(id, self.geometry.clone(), self.position, meta)
    }

    fn refresh_mass_properties(&mut self) {
        if self.meta.is_fixed {
            self.meta.velocity = Vec2::ZERO;
            self.meta.angular_velocity = 0.0;
            self.inv_mass = 0.0;
            self.inertia = f32::INFINITY;
            self.inv_inertia = 0.0;
        } else {
            self.inv_mass = self.meta.mass.recip();
            self.inertia = self.meta.mass * self.geometry.unit_inertia();
            self.inv_inertia = if self.inertia > 0.0 { self.inertia.recip() } else { 0.0 };
        }
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Replace the metadata. Mass properties are recomputed; a fixed body is
    /// stopped and a sleeping one woken.
    pub(crate) fn set_meta(&mut self, meta: Meta) -> Result<()> {
        meta.validate()?;
        self.meta = meta;
        self.refresh_mass_properties();
        self.wake();
        Ok(())
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn angle(&self) -> f32 {
        self.meta.angle
    }

    pub fn velocity(&self) -> Vec2 {
        self.meta.velocity
    }

    pub fn angular_velocity(&self) -> f32 {
        self.meta.angular_velocity
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.meta.angle)
    }

    pub fn is_fixed(&self) -> bool {
        self.meta.is_fixed
    }

    pub fn is_transparent(&self) -> bool {
        self.meta.is_transparent
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Fixed or asleep: only an outside push moves it this step.
    pub(crate) fn is_resting(&self) -> bool {
        self.meta.is_fixed || self.sleeping
    }

    pub(crate) fn wake(&mut self) {
        self.sleeping = false;
        self.motionless_frames = 0;
    }

    /// Count a motionless step (`|v|^2 + w^2 < motion`) and fall asleep after
    /// `frames` of them in a row. Any faster step wakes the body.
    pub(crate) fn update_sleep(&mut self, motion: f32, frames: u32) {
        if self.meta.is_fixed {
            return;
        }
        let w = self.meta.angular_velocity;
        if self.meta.velocity.length_squared() + w * w < motion {
            self.motionless_frames = self.motionless_frames.saturating_add(1);
            if self.motionless_frames >= frames {
                self.sleeping = true;
                self.silence();
            }
        } else {
            self.wake();
        }
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    pub fn inv_inertia(&self) -> f32 {
        self.inv_inertia
    }

    pub fn shape(&self) -> Shape<'_> {
        Shape {
            id: self.id,
            center: self.position,
            angle: self.meta.angle,
            geometry: &self.geometry,
        }
    }

    pub fn aabb(&self) -> Aabb {
        self.geometry.aabb(&self.transform())
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        self.geometry.contains_point(&self.transform(), p)
    }

    /// World point -> anchor relative to the centroid in the body frame.
    pub(crate) fn local_point(&self, world: Vec2) -> Vec2 {
        self.transform().inverse_apply(world)
    }

    pub(crate) fn world_point(&self, local: Vec2) -> Vec2 {
        self.transform().apply(local)
    }

    /// Velocity of the material point at arm `r` from the centroid.
    pub fn velocity_at(&self, r: Vec2) -> Vec2 {
        self.meta.velocity + r.perp() * self.meta.angular_velocity
    }

    /// `r` is the arm from the centroid to the application point. No-op on fixed bodies.
    pub(crate) fn apply_impulse(&mut self, impulse: Vec2, r: Vec2) {
        if self.meta.is_fixed {
            return;
        }
        self.meta.velocity += impulse * self.inv_mass;
        self.meta.angular_velocity += r.perp_dot(impulse) * self.inv_inertia;
    }

    pub(crate) fn apply_acceleration(&mut self, acceleration: Vec2, dt: f32) {
        if self.is_resting() || self.meta.ignore_gravity {
            return;
        }
        self.meta.velocity += acceleration * dt;
    }

    pub(crate) fn integrate(&mut self, dt: f32) {
        if self.is_resting() {
            return;
        }
        self.position += self.meta.velocity * dt;
        self.meta.angle += self.meta.angular_velocity * dt;
    }

    /// Direct positional nudge used by contact projection. Ignored for fixed bodies.
    pub(crate) fn nudge(&mut self, delta: Vec2) {
        if !self.meta.is_fixed {
            self.position += delta;
        }
    }

    /// Host-requested move; applies to fixed bodies as well and wakes sleepers.
    pub(crate) fn translate(&mut self, delta: Vec2) {
        self.position += delta;
        self.wake();
    }

    pub(crate) fn silence(&mut self) {
        self.meta.velocity = Vec2::ZERO;
        self.meta.angular_velocity = 0.0;
    }

    pub fn kinetic_energy(&self) -> f32 {
        if self.meta.is_fixed {
            return 0.0;
        }
        0.5 * (self.meta.mass * self.meta.velocity.length_squared()
            + self.inertia * self.meta.angular_velocity * self.meta.angular_velocity)
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.meta.angle.is_finite()
            && self.meta.velocity.is_finite()
            && self.meta.angular_velocity.is_finite()
    }

    pub(crate) fn state(&self) -> BodyState {
        BodyState {
            position: self.position,
            angle: self.meta.angle,
            velocity: self.meta.velocity,
            angular_velocity: self.meta.angular_velocity,
            sleeping: self.sleeping,
            motionless_frames: self.motionless_frames,
        }
    }

    pub(crate) fn restore(&mut self, state: BodyState) {
        self.position = state.position;
        self.meta.angle = state.angle;
        self.meta.velocity = state.velocity;
        self.meta.angular_velocity = state.angular_velocity;
        self.sleeping = state.sleeping;
        self.motionless_frames = state.motionless_frames;
    }

    /// Delta since the last notification, if any; advances the baseline.
    pub(crate) fn take_pending_delta(&mut self) -> Option<(Vec2, f32)> {
        let translation = self.position - self.notified.position;
        let rotation = self.meta.angle - self.notified.angle;
        if translation == Vec2::ZERO && rotation == 0.0 {
            return None;
        }
        self.notified = self.transform();
        Some((translation, rotation))
    }
}
