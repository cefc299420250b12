use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Body identifier. Equal to the id of the body's shape; never reused within a world.
pub type BodyId = u32;

/// Joint identifier, allocated independently of body ids.
pub type JointId = u32;

/// Handle returned when registering a position-update listener.
pub type ListenerId = u32;

/// Axis-aligned bounding box in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Closed-interval overlap: touching boxes count as overlapping.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Rigid placement of a body: world position of its centroid plus orientation.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    pub angle: f32,
}

impl Transform {
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self { position, angle }
    }

    /// Local point -> world point.
    pub fn apply(&self, local: Vec2) -> Vec2 {
        self.position + Vec2::from_angle(self.angle).rotate(local)
    }

    /// World point -> local point.
    pub fn inverse_apply(&self, world: Vec2) -> Vec2 {
        Vec2::from_angle(-self.angle).rotate(world - self.position)
    }

    pub fn inverse_apply_vector(&self, world: Vec2) -> Vec2 {
        Vec2::from_angle(-self.angle).rotate(world)
    }
}

/// Physical properties of a body.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Meta {
    /// Must be > 0 unless `is_fixed`; ignored (infinite) for fixed bodies.
    pub mass: f32,
    /// Immovable: skipped by integration, infinite mass for the solver.
    pub is_fixed: bool,
    /// Excluded from collision detection and response; still enumerated.
    pub is_transparent: bool,
    /// Orientation in radians.
    pub angle: f32,
    pub velocity: Vec2,
    pub angular_velocity: f32,
    /// Bounce coefficient in [0, 1].
    #[serde(alias = "factorRestitution")]
    pub restitution: f32,
    /// Coulomb friction coefficient, >= 0.
    #[serde(alias = "factorFriction")]
    pub friction: f32,
    /// Skip gravity for this body only.
    pub ignore_gravity: bool,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            mass: 1.0,
            is_fixed: false,
            is_transparent: false,
            angle: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            restitution: 1.0,
            friction: 0.2,
            ignore_gravity: false,
        }
    }
}

impl Meta {
    /// Convenience: an immovable body.
    pub fn fixed() -> Self {
        Self {
            is_fixed: true,
            ..Default::default()
        }
    }

    pub fn with_mass(mass: f32) -> Self {
        Self {
            mass,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.is_fixed && !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "mass must be positive and finite for a non-fixed body (got {})",
                self.mass
            )));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "restitution must be in [0, 1] (got {})",
                self.restitution
            )));
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "friction must be >= 0 (got {})",
                self.friction
            )));
        }
        let motion = self.velocity.is_finite() && self.angular_velocity.is_finite();
        if !(self.angle.is_finite() && motion) {
            return Err(PhysicsError::InvalidConfiguration(
                "angle and velocities must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Sparse `Meta` update: only `Some` fields are applied.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetaPartial {
    pub mass: Option<f32>,
    pub is_fixed: Option<bool>,
    pub is_transparent: Option<bool>,
    pub angle: Option<f32>,
    pub velocity: Option<Vec2>,
    pub angular_velocity: Option<f32>,
    #[serde(alias = "factorRestitution")]
    pub restitution: Option<f32>,
    #[serde(alias = "factorFriction")]
    pub friction: Option<f32>,
    pub ignore_gravity: Option<bool>,
}

impl MetaPartial {
    /// Merge into a copy of `meta`. The caller validates the result.
    pub fn merged(&self, meta: &Meta) -> Meta {
        Meta {
            mass: self.mass.unwrap_or(meta.mass),
            is_fixed: self.is_fixed.unwrap_or(meta.is_fixed),
            is_transparent: self.is_transparent.unwrap_or(meta.is_transparent),
            angle: self.angle.unwrap_or(meta.angle),
            velocity: self.velocity.unwrap_or(meta.velocity),
            angular_velocity: self.angular_velocity.unwrap_or(meta.angular_velocity),
            restitution: self.restitution.unwrap_or(meta.restitution),
            friction: self.friction.unwrap_or(meta.friction),
            ignore_gravity: self.ignore_gravity.unwrap_or(meta.ignore_gravity),
        }
    }
}

/// Spring-damper distance constraint parameters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JoinConstraintConfig {
    /// Rest distance between the two anchors, >= 0.
    pub distance: f32,
    /// 1.0 is critically damped.
    pub damping_ratio: f32,
    /// Spring frequency in Hz; must be > 0 unless `hard`.
    pub frequency: f32,
    /// Rigid equality constraint instead of a spring.
    pub hard: bool,
}

impl Default for JoinConstraintConfig {
    fn default() -> Self {
        Self {
            distance: 0.0,
            damping_ratio: 1.0,
            frequency: 0.5,
            hard: false,
        }
    }
}

impl JoinConstraintConfig {
    pub fn hard(distance: f32) -> Self {
        Self {
            distance,
            hard: true,
            ..Default::default()
        }
    }

    pub fn spring(distance: f32, frequency: f32, damping_ratio: f32) -> Self {
        Self {
            distance,
            frequency,
            damping_ratio,
            hard: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.distance.is_finite() && self.distance >= 0.0) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "joint distance must be >= 0 (got {})",
                self.distance
            )));
        }
        if !(self.damping_ratio.is_finite() && self.damping_ratio >= 0.0) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "damping ratio must be >= 0 (got {})",
                self.damping_ratio
            )));
        }
        if !self.hard && !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "soft joint frequency must be > 0 (got {})",
                self.frequency
            )));
        }
        Ok(())
    }
}

/// Sparse `JoinConstraintConfig` update.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JoinConstraintConfigPartial {
    pub distance: Option<f32>,
    pub damping_ratio: Option<f32>,
    pub frequency: Option<f32>,
    pub hard: Option<bool>,
}

impl JoinConstraintConfigPartial {
    pub fn merged(&self, config: &JoinConstraintConfig) -> JoinConstraintConfig {
        JoinConstraintConfig {
            distance: self.distance.unwrap_or(config.distance),
            damping_ratio: self.damping_ratio.unwrap_or(config.damping_ratio),
            frequency: self.frequency.unwrap_or(config.frequency),
            hard: self.hard.unwrap_or(config.hard),
        }
    }
}

/// How two bodies' material coefficients combine at a contact.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineRule {
    Average,
    Min,
    Max,
    Multiply,
    GeometricMean,
}

impl CombineRule {
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            CombineRule::Average => (a + b) * 0.5,
            CombineRule::Min => a.min(b),
            CombineRule::Max => a.max(b),
            CombineRule::Multiply => a * b,
            CombineRule::GeometricMean => (a * b).sqrt(),
        }
    }
}

/// Broad-phase strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadPhaseKind {
    /// Sort bounds along X and sweep.
    SortAndSweep,
    /// Uniform hash grid keyed by `cell_size`.
    Grid,
}

/// World-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Acceleration applied to non-fixed bodies (screen coordinates, +Y is down).
    pub gravity: Vec2,
    pub enable_gravity: bool,
    /// Sequential-impulse passes per step.
    pub velocity_iterations: u32,
    /// Positional projection passes per step.
    pub position_iterations: u32,
    pub broad_phase: BroadPhaseKind,
    /// Grid cell size in world units (only used by `BroadPhaseKind::Grid`).
    pub cell_size: f32,
    /// Reapply last step's contact impulses before iterating.
    pub warm_starting: bool,
    /// Approach speed below which restitution is ignored.
    pub restitution_threshold: f32,
    /// Penetration allowed without positional correction.
    pub penetration_slop: f32,
    /// Fraction of remaining penetration removed per position pass.
    pub position_correction: f32,
    /// Baumgarte factor for hard joints.
    pub joint_bias_factor: f32,
    /// Cap on the positional error a hard joint corrects per step.
    pub max_joint_correction: f32,
    pub restitution_combine: CombineRule,
    pub friction_combine: CombineRule,
    /// Let bodies that stay still fall asleep (off by default).
    pub enable_sleep_mode: bool,
    /// `|v|^2 + w^2` below which a step counts as motionless.
    pub sleep_motion: f32,
    /// Consecutive motionless steps before a body falls asleep.
    pub sleep_frames: u32,
    /// Enable internal timing instrumentation (adds small overhead when true).
    pub enable_timing: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, 9.8),
            enable_gravity: true,
            velocity_iterations: 10,
            position_iterations: 4,
            broad_phase: BroadPhaseKind::SortAndSweep,
            cell_size: 4.0,
            warm_starting: true,
            restitution_threshold: 0.5,
            penetration_slop: 0.01,
            position_correction: 0.2,
            joint_bias_factor: 0.2,
            max_joint_correction: 0.5,
            restitution_combine: CombineRule::Max,
            friction_combine: CombineRule::GeometricMean,
            enable_sleep_mode: false,
            sleep_motion: 0.07,
            sleep_frames: 40,
            enable_timing: false,
        }
    }
}

impl WorldConfig {
    /// Zero-gravity variant, handy for isolated collision setups.
    pub fn weightless() -> Self {
        Self {
            enable_gravity: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |what: &str| Err(PhysicsError::InvalidConfiguration(what.to_string()));
        if !self.gravity.is_finite() {
            return bad("gravity must be finite");
        }
        if self.velocity_iterations == 0 {
            return bad("velocity_iterations must be at least 1");
        }
        let cell_ok = self.cell_size.is_finite() && self.cell_size > 0.0;
        if self.broad_phase == BroadPhaseKind::Grid && !cell_ok {
            return bad("cell_size must be positive for the grid broad-phase");
        }
        if !(self.restitution_threshold.is_finite() && self.restitution_threshold >= 0.0) {
            return bad("restitution_threshold must be >= 0");
        }
        if !(self.penetration_slop.is_finite() && self.penetration_slop >= 0.0) {
            return bad("penetration_slop must be >= 0");
        }
        if !(0.0..=1.0).contains(&self.position_correction) {
            return bad("position_correction must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.joint_bias_factor) {
            return bad("joint_bias_factor must be in [0, 1]");
        }
        if !(self.max_joint_correction.is_finite() && self.max_joint_correction > 0.0) {
            return bad("max_joint_correction must be positive");
        }
        if !(self.sleep_motion.is_finite() && self.sleep_motion >= 0.0) {
            return bad("sleep_motion must be >= 0");
        }
        if self.sleep_frames == 0 {
            return bad("sleep_frames must be at least 1");
        }
        Ok(())
    }
}

/// One point of a contact manifold.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContactPoint {
    /// World-space contact position.
    pub position: Vec2,
    /// Penetration at this point (> 0).
    pub depth: f32,
}

/// Narrow-phase result for one body pair.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Manifold {
    /// Unit normal pointing from body A toward body B.
    pub normal: Vec2,
    /// Deepest penetration over the points (> 0).
    pub depth: f32,
    points: [ContactPoint; 2],
    count: usize,
}

impl Manifold {
    pub fn single(normal: Vec2, point: ContactPoint) -> Self {
        Self {
            normal,
            depth: point.depth,
            points: [point; 2],
            count: 1,
        }
    }

    pub fn pair(normal: Vec2, a: ContactPoint, b: ContactPoint) -> Self {
        Self {
            normal,
            depth: a.depth.max(b.depth),
            points: [a, b],
            count: 2,
        }
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.count]
    }

    /// Same contact seen from the other body.
    pub fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        self
    }
}

/// Ray cast result.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayHit {
    /// Distance along the ray in units of `dir` (so world distance if `dir` is unit).
    pub toi: f32,
    /// Surface normal at the hit point (zero when the origin starts inside).
    pub normal: Vec2,
    pub point: Vec2,
}

/// Debug statistics for the last completed step.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WorldStats {
    pub bodies: usize,
    pub joints: usize,
    /// Pairs reported by the broad-phase.
    pub candidate_pairs: usize,
    /// Manifolds that survived the narrow-phase.
    pub contacts: usize,
    /// Listener invocations made by the dispatcher.
    pub notifications: usize,
    /// Bodies asleep after the step.
    pub sleeping: usize,
}

/// Timing breakdown for the last completed step.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WorldTiming {
    pub step_ms: f64,
    pub broadphase_ms: f64,
    pub narrowphase_ms: f64,
    pub solver_ms: f64,
    pub integrate_ms: f64,
    pub dispatch_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_transform_roundtrip_and_rotation() {
        let t = Transform::new(Vec2::new(1.0, 2.0), std::f32::consts::FRAC_PI_2);
        let w = t.apply(Vec2::new(1.0, 0.0));
        assert_abs_diff_eq!(w.x, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(w.y, 3.0, epsilon = 1e-5);
        let back = t.inverse_apply(w);
        assert_abs_diff_eq!(back.x, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(back.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_meta_validation() {
        assert!(Meta::default().validate().is_ok());
        assert!(Meta::with_mass(0.0).validate().is_err());
        assert!(Meta::with_mass(-1.0).validate().is_err());
        // fixed bodies don't care about mass
        let weightless_fixed = Meta {
            mass: 0.0,
            ..Meta::fixed()
        };
        assert!(weightless_fixed.validate().is_ok());
        let bouncy = Meta {
            restitution: 1.5,
            ..Default::default()
        };
        assert!(bouncy.validate().is_err());
        let sticky = Meta {
            friction: -0.1,
            ..Default::default()
        };
        assert!(sticky.validate().is_err());
    }

    #[test]
    fn test_meta_partial_only_touches_present_fields() {
        let base = Meta {
            mass: 3.0,
            friction: 0.7,
            ..Default::default()
        };
        let p = MetaPartial {
            velocity: Some(Vec2::new(1.0, 0.0)),
            ..Default::default()
        };
        let m = p.merged(&base);
        assert_eq!(m.mass, 3.0);
        assert_eq!(m.friction, 0.7);
        assert_eq!(m.velocity, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_meta_partial_from_sparse_json() {
        let json = r#"{"isFixed":true,"factorFriction":0.5}"#;
        let p: MetaPartial = serde_json::from_str(json).unwrap();
        assert_eq!(p.is_fixed, Some(true));
        assert_eq!(p.friction, Some(0.5));
        assert_eq!(p.mass, None);
    }

    #[test]
    fn test_join_config_validation_and_partial() {
        assert!(JoinConstraintConfig::default().validate().is_ok());
        assert!(JoinConstraintConfig::spring(1.0, 0.0, 1.0).validate().is_err());
        // hard joints ignore frequency
        let hard = JoinConstraintConfig {
            frequency: 0.0,
            ..JoinConstraintConfig::hard(2.0)
        };
        assert!(hard.validate().is_ok());
        assert!(JoinConstraintConfig::hard(-1.0).validate().is_err());

        let p: JoinConstraintConfigPartial =
            serde_json::from_str(r#"{"dampingRatio":0.3}"#).unwrap();
        let merged = p.merged(&JoinConstraintConfig::hard(5.0));
        assert!(merged.hard);
        assert_eq!(merged.distance, 5.0);
        assert_eq!(merged.damping_ratio, 0.3);
    }

    #[test]
    fn test_combine_rules() {
        assert_eq!(CombineRule::Max.combine(0.2, 0.8), 0.8);
        assert_eq!(CombineRule::Min.combine(0.2, 0.8), 0.2);
        assert_abs_diff_eq!(CombineRule::Average.combine(0.2, 0.8), 0.5);
        assert_abs_diff_eq!(CombineRule::GeometricMean.combine(0.25, 1.0), 0.5);
        assert_abs_diff_eq!(CombineRule::Multiply.combine(0.5, 0.5), 0.25);
    }

    #[test]
    fn test_world_config_defaults_fill_missing_json() {
        let json = r#"{"broad_phase":"grid","cell_size":2.0,"velocity_iterations":8}"#;
        let cfg: WorldConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.broad_phase, BroadPhaseKind::Grid);
        assert_eq!(cfg.velocity_iterations, 8);
        assert_eq!(cfg.restitution_combine, CombineRule::Max);
        assert!(!cfg.enable_sleep_mode);
        assert!(cfg.validate().is_ok());

        let bad = WorldConfig {
            velocity_iterations: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = WorldConfig {
            broad_phase: BroadPhaseKind::Grid,
            cell_size: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = WorldConfig {
            sleep_frames: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_aabb_overlap_is_closed() {
        let a = Aabb::new(Vec2::ZERO, Vec2::ONE);
        let b = Aabb::new(Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0));
        let c = Aabb::new(Vec2::new(1.1, 0.0), Vec2::new(2.0, 1.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
