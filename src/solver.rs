use std::collections::HashMap;
use std::f32::consts::TAU;

use glam::Vec2;

use crate::body::Body;
use crate::joint::{Joint, JointTarget};
use crate::types::{BodyId, Manifold, WorldConfig};

const MIN_JOINT_LENGTH: f32 = 1e-6;

/// Accumulated impulses of one contact pair, carried into the next step.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct CachedImpulses {
    pub normal: [f32; 2],
    pub tangent: [f32; 2],
    pub count: usize,
}

/// Keyed by the body ids of a pair, lower arena index first.
pub(crate) type ImpulseCache = HashMap<(BodyId, BodyId), CachedImpulses>;

/// Two distinct bodies out of the arena at once.
fn pair_mut(bodies: &mut [Body], a: usize, b: usize) -> (&mut Body, &mut Body) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = bodies.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = bodies.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

/// `1 / (m_a^-1 + m_b^-1 + I_a^-1 (r_a x n)^2 + I_b^-1 (r_b x n)^2)`; zero when
/// both ends are immovable.
fn effective_mass(a: &Body, b: Option<&Body>, r_a: Vec2, r_b: Vec2, n: Vec2) -> f32 {
    let rn_a = r_a.perp_dot(n);
    let mut k = a.inv_mass() + a.inv_inertia() * rn_a * rn_a;
    if let Some(b) = b {
        let rn_b = r_b.perp_dot(n);
        k += b.inv_mass() + b.inv_inertia() * rn_b * rn_b;
    }
    if k > 0.0 { k.recip() } else { 0.0 }
}

#[derive(Copy, Clone, Debug, Default)]
struct ContactRow {
    r_a: Vec2,
    r_b: Vec2,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
    normal_impulse: f32,
    tangent_impulse: f32,
}

#[derive(Clone, Debug)]
struct ContactConstraint {
    a: usize,
    b: usize,
    key: (BodyId, BodyId),
    normal: Vec2,
    depth: f32,
    friction: f32,
    rows: [ContactRow; 2],
    count: usize,
    // positions at detection time, for tracking how much penetration is left
    origin_a: Vec2,
    origin_b: Vec2,
}

impl ContactConstraint {
    fn rows(&self) -> &[ContactRow] {
        &self.rows[..self.count]
    }
}

/// Sequential-impulse solver for one step's contacts.
///
/// Rows are solved in the order the manifolds were handed in, which is the
/// sorted broad-phase order, so a given scene always solves identically.
#[derive(Debug, Default)]
pub(crate) struct ContactSolver {
    constraints: Vec<ContactConstraint>,
}

impl ContactSolver {
    pub fn new(
        bodies: &[Body],
        manifolds: &[(usize, usize, Manifold)],
        cache: &ImpulseCache,
        cfg: &WorldConfig,
    ) -> Self {
        let constraints = manifolds
            .iter()
            .map(|&(a, b, m)| {
                let (ba, bb) = (&bodies[a], &bodies[b]);
                let key = (ba.id(), bb.id());
                let normal = m.normal;
                let tangent = normal.perp();
                let (ma, mb) = (ba.meta(), bb.meta());
                let restitution = cfg.restitution_combine.combine(ma.restitution, mb.restitution);
                let friction = cfg.friction_combine.combine(ma.friction, mb.friction);
                let cached = cache
                    .get(&key)
                    .filter(|c| cfg.warm_starting && c.count == m.points().len())
                    .copied()
                    .unwrap_or_default();

                let mut rows = [ContactRow::default(); 2];
                for (i, point) in m.points().iter().enumerate() {
                    let r_a = point.position - ba.position();
                    let r_b = point.position - bb.position();
                    let vn = normal.dot(bb.velocity_at(r_b) - ba.velocity_at(r_a));
                    let velocity_bias = if vn < -cfg.restitution_threshold {
                        -restitution * vn
                    } else {
                        0.0
                    };
                    rows[i] = ContactRow {
                        r_a,
                        r_b,
                        normal_mass: effective_mass(ba, Some(bb), r_a, r_b, normal),
                        tangent_mass: effective_mass(ba, Some(bb), r_a, r_b, tangent),
                        velocity_bias,
                        normal_impulse: cached.normal[i],
                        tangent_impulse: cached.tangent[i],
                    };
                }

                ContactConstraint {
                    a,
                    b,
                    key,
                    normal,
                    depth: m.depth,
                    friction,
                    rows,
                    count: m.points().len(),
                    origin_a: ba.position(),
                    origin_b: bb.position(),
                }
            })
            .collect();
        Self { constraints }
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Re-apply last step's accumulated impulses.
    pub fn warm_start(&self, bodies: &mut [Body]) {
        for c in &self.constraints {
            let tangent = c.normal.perp();
            let (a, b) = pair_mut(bodies, c.a, c.b);
            for row in c.rows() {
                let p = c.normal * row.normal_impulse + tangent * row.tangent_impulse;
                a.apply_impulse(-p, row.r_a);
                b.apply_impulse(p, row.r_b);
            }
        }
    }

    /// One velocity iteration over every contact.
    pub fn solve_velocities(&mut self, bodies: &mut [Body]) {
        for c in &mut self.constraints {
            let normal = c.normal;
            let tangent = normal.perp();
            let friction = c.friction;
            let count = c.count;
            let (a, b) = pair_mut(bodies, c.a, c.b);

            for row in &mut c.rows[..count] {
                // friction row, then normal row
                let dv = b.velocity_at(row.r_b) - a.velocity_at(row.r_a);
                let lambda = -row.tangent_mass * dv.dot(tangent);
                let max_friction = friction * row.normal_impulse;
                let accumulated = (row.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = accumulated - row.tangent_impulse;
                row.tangent_impulse = accumulated;
                let p = tangent * lambda;
                a.apply_impulse(-p, row.r_a);
                b.apply_impulse(p, row.r_b);

                let dv = b.velocity_at(row.r_b) - a.velocity_at(row.r_a);
                let lambda = -row.normal_mass * (dv.dot(normal) - row.velocity_bias);
                let accumulated = (row.normal_impulse + lambda).max(0.0);
                let lambda = accumulated - row.normal_impulse;
                row.normal_impulse = accumulated;
                let p = normal * lambda;
                a.apply_impulse(-p, row.r_a);
                b.apply_impulse(p, row.r_b);
            }
        }
    }

    /// Accumulated impulses of every pair solved this step.
    pub fn impulses(&self) -> ImpulseCache {
        self.constraints
            .iter()
            .map(|c| {
                let mut cached = CachedImpulses { count: c.count, ..Default::default() };
                for (i, row) in c.rows().iter().enumerate() {
                    cached.normal[i] = row.normal_impulse;
                    cached.tangent[i] = row.tangent_impulse;
                }
                (c.key, cached)
            })
            .collect()
    }

    /// Linear projection: move each pair apart along the normal by a fraction
    /// of the penetration beyond the slop, split by inverse mass.
    pub fn correct_positions(&self, bodies: &mut [Body], cfg: &WorldConfig) {
        for _ in 0..cfg.position_iterations {
            for c in &self.constraints {
                let (a, b) = pair_mut(bodies, c.a, c.b);
                let inv_sum = a.inv_mass() + b.inv_mass();
                if inv_sum <= 0.0 {
                    continue;
                }
                let moved = (b.position() - c.origin_b) - (a.position() - c.origin_a);
                let remaining = c.depth - moved.dot(c.normal);
                let excess = (remaining - cfg.penetration_slop).max(0.0);
                let correction = excess * cfg.position_correction / inv_sum;
                if correction <= 0.0 {
                    continue;
                }
                a.nudge(-c.normal * (correction * a.inv_mass()));
                b.nudge(c.normal * (correction * b.inv_mass()));
            }
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct JointRow {
    a: usize,
    b: Option<usize>,
    r_a: Vec2,
    r_b: Vec2,
    axis: Vec2,
    mass: f32,
    bias: f32,
    gamma: f32,
    impulse: f32,
}

/// Distance rows for every joint, rebuilt each step.
#[derive(Debug, Default)]
pub(crate) struct JointSolver {
    rows: Vec<JointRow>,
}

impl JointSolver {
    /// `index_of` maps a body id to its arena slot. Joints whose bodies are
    /// gone, or that are degenerate this step, produce no row.
    pub fn new(
        bodies: &[Body],
        joints: &[Joint],
        index_of: impl Fn(BodyId) -> Option<usize>,
        cfg: &WorldConfig,
        dt: f32,
    ) -> Self {
        let rows = joints
            .iter()
            .filter_map(|joint| {
                let a = index_of(joint.body())?;
                let body_a = &bodies[a];
                let anchor_a = body_a.world_point(joint.anchor());
                let (b, anchor_b) = match joint.target() {
                    JointTarget::Body { id, anchor } => {
                        let b = index_of(id)?;
                        (Some(b), bodies[b].world_point(anchor))
                    }
                    JointTarget::Point(p) => (None, p),
                };
                let body_b = b.map(|i| &bodies[i]);

                let d = anchor_b - anchor_a;
                let length = d.length();
                if length < MIN_JOINT_LENGTH {
                    return None;
                }
                let axis = d / length;
                let r_a = anchor_a - body_a.position();
                let r_b = body_b.map_or(Vec2::ZERO, |body| anchor_b - body.position());

                let m_eff = effective_mass(body_a, body_b, r_a, r_b, axis);
                if m_eff <= 0.0 {
                    return None;
                }
                let config = joint.config();
                let error = length - config.distance;

                let (mass, bias, gamma) = if config.hard {
                    let max = cfg.max_joint_correction / dt;
                    (m_eff, (cfg.joint_bias_factor * error / dt).clamp(-max, max), 0.0)
                } else {
                    let omega = TAU * config.frequency;
                    let stiffness = m_eff * omega * omega;
                    let damping = 2.0 * m_eff * config.damping_ratio * omega;
                    let gamma = dt * (damping + dt * stiffness);
                    let gamma = if gamma > 0.0 { gamma.recip() } else { 0.0 };
                    let bias = error * dt * stiffness * gamma;
                    ((m_eff.recip() + gamma).recip(), bias, gamma)
                };

                Some(JointRow { a, b, r_a, r_b, axis, mass, bias, gamma, impulse: 0.0 })
            })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn solve_velocities(&mut self, bodies: &mut [Body]) {
        for row in &mut self.rows {
            match row.b {
                Some(b) => {
                    let (body_a, body_b) = pair_mut(bodies, row.a, b);
                    let dv = body_b.velocity_at(row.r_b) - body_a.velocity_at(row.r_a);
                    let cdot = row.axis.dot(dv);
                    let lambda = -row.mass * (cdot + row.bias + row.gamma * row.impulse);
                    row.impulse += lambda;
                    let p = row.axis * lambda;
                    body_a.apply_impulse(-p, row.r_a);
                    body_b.apply_impulse(p, row.r_b);
                }
                None => {
                    let body_a = &mut bodies[row.a];
                    let cdot = -row.axis.dot(body_a.velocity_at(row.r_a));
                    let lambda = -row.mass * (cdot + row.bias + row.gamma * row.impulse);
                    row.impulse += lambda;
                    body_a.apply_impulse(-row.axis * lambda, row.r_a);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::types::{ContactPoint, JoinConstraintConfig, Meta};
    use approx::assert_abs_diff_eq;

    fn ball(id: BodyId, x: f32, meta: Meta) -> Body {
        Body::new(id, Geometry::circle(1.0).unwrap(), Vec2::new(x, 0.0), meta).unwrap()
    }

    fn head_on(bodies: &[Body]) -> Vec<(usize, usize, Manifold)> {
        let mid = (bodies[0].position() + bodies[1].position()) * 0.5;
        vec![(0, 1, Manifold::single(Vec2::X, ContactPoint { position: mid, depth: 0.1 }))]
    }

    #[test]
    fn test_pair_mut_either_order() {
        let mut bodies = vec![ball(1, 0.0, Meta::default()), ball(2, 5.0, Meta::default())];
        let (a, b) = pair_mut(&mut bodies, 1, 0);
        assert_eq!((a.id(), b.id()), (2, 1));
    }

    #[test]
    fn test_elastic_head_on_swaps_velocities() {
        let mut bodies = vec![
            ball(1, 0.0, Meta { velocity: Vec2::new(2.0, 0.0), ..Default::default() }),
            ball(2, 1.9, Meta { velocity: Vec2::new(-2.0, 0.0), ..Default::default() }),
        ];
        let cfg = WorldConfig::weightless();
        let mut solver = ContactSolver::new(&bodies, &head_on(&bodies), &ImpulseCache::new(), &cfg);
        for _ in 0..cfg.velocity_iterations {
            solver.solve_velocities(&mut bodies);
        }
        assert_abs_diff_eq!(bodies[0].velocity().x, -2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bodies[1].velocity().x, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_inelastic_contact_stops_approach() {
        let still = Meta {
            restitution: 0.0,
            ..Default::default()
        };
        let meta = Meta {
            velocity: Vec2::new(1.0, 0.0),
            ..still
        };
        let mut bodies = vec![ball(1, 0.0, meta), ball(2, 1.9, still)];
        let mut cfg = WorldConfig::weightless();
        cfg.restitution_combine = crate::types::CombineRule::Min;
        let mut solver = ContactSolver::new(&bodies, &head_on(&bodies), &ImpulseCache::new(), &cfg);
        for _ in 0..cfg.velocity_iterations {
            solver.solve_velocities(&mut bodies);
        }
        // equal masses share the momentum
        assert_abs_diff_eq!(bodies[0].velocity().x, 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(bodies[1].velocity().x, 0.5, epsilon = 1e-4);
        let cache = solver.impulses();
        assert_abs_diff_eq!(cache[&(1, 2)].normal[0], 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_separating_pair_gets_no_impulse() {
        let mut bodies = vec![
            ball(1, 0.0, Meta { velocity: Vec2::new(-1.0, 0.0), ..Default::default() }),
            ball(2, 1.9, Meta::default()),
        ];
        let cfg = WorldConfig::weightless();
        let mut solver = ContactSolver::new(&bodies, &head_on(&bodies), &ImpulseCache::new(), &cfg);
        solver.solve_velocities(&mut bodies);
        assert_eq!(bodies[0].velocity().x, -1.0);
        assert_eq!(bodies[1].velocity(), Vec2::ZERO);
    }

    #[test]
    fn test_friction_bounded_by_normal_impulse() {
        // sliding along +Y while pressed into a fixed floor along +X
        let meta = Meta {
            velocity: Vec2::new(1.0, 5.0),
            restitution: 0.0,
            friction: 0.1,
            ..Default::default()
        };
        let floor = Meta {
            friction: 0.1,
            ..Meta::fixed()
        };
        let mut bodies = vec![ball(1, 0.0, meta), ball(2, 1.9, floor)];
        let mut cfg = WorldConfig::weightless();
        cfg.restitution_combine = crate::types::CombineRule::Min;
        let mut solver = ContactSolver::new(&bodies, &head_on(&bodies), &ImpulseCache::new(), &cfg);
        for _ in 0..cfg.velocity_iterations {
            solver.solve_velocities(&mut bodies);
        }
        let cache = solver.impulses();
        let c = cache[&(1, 2)];
        assert!(c.tangent[0].abs() <= 0.1 * c.normal[0] + 1e-5);
        assert_abs_diff_eq!(bodies[0].velocity().x, 0.0, epsilon = 1e-4);
        assert!(bodies[0].velocity().y < 5.0);
        assert_eq!(bodies[1].velocity(), Vec2::ZERO);
    }

    #[test]
    fn test_warm_start_reapplies_cached_impulse() {
        let mut bodies = vec![ball(1, 0.0, Meta::default()), ball(2, 1.9, Meta::default())];
        let cfg = WorldConfig::weightless();
        let mut cache = ImpulseCache::new();
        cache.insert((1, 2), CachedImpulses { normal: [1.0, 0.0], tangent: [0.0, 0.0], count: 1 });
        let solver = ContactSolver::new(&bodies, &head_on(&bodies), &cache, &cfg);
        solver.warm_start(&mut bodies);
        assert_abs_diff_eq!(bodies[0].velocity().x, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(bodies[1].velocity().x, 1.0, epsilon = 1e-6);

        // disabled warm starting ignores the cache
        let mut bodies = vec![ball(1, 0.0, Meta::default()), ball(2, 1.9, Meta::default())];
        let cfg = WorldConfig { warm_starting: false, ..WorldConfig::weightless() };
        let solver = ContactSolver::new(&bodies, &head_on(&bodies), &cache, &cfg);
        solver.warm_start(&mut bodies);
        assert_eq!(bodies[0].velocity(), Vec2::ZERO);
    }

    #[test]
    fn test_position_projection_splits_by_inverse_mass() {
        let mut bodies = vec![ball(1, 0.0, Meta::fixed()), ball(2, 1.0, Meta::default())];
        let point = ContactPoint {
            position: Vec2::new(0.5, 0.0),
            depth: 1.0,
        };
        let m = Manifold::single(Vec2::X, point);
        let cfg = WorldConfig {
            position_iterations: 1,
            position_correction: 0.5,
            penetration_slop: 0.0,
            ..WorldConfig::weightless()
        };
        let solver = ContactSolver::new(&bodies, &[(0, 1, m)], &ImpulseCache::new(), &cfg);
        solver.correct_positions(&mut bodies, &cfg);
        assert_eq!(bodies[0].position(), Vec2::ZERO);
        assert_abs_diff_eq!(bodies[1].position().x, 1.5, epsilon = 1e-6);

        // a second pass only corrects what is left
        let cfg = WorldConfig { position_iterations: 2, ..cfg };
        let mut bodies = vec![ball(1, 0.0, Meta::fixed()), ball(2, 1.0, Meta::default())];
        let solver = ContactSolver::new(&bodies, &[(0, 1, m)], &ImpulseCache::new(), &cfg);
        solver.correct_positions(&mut bodies, &cfg);
        assert_abs_diff_eq!(bodies[1].position().x, 1.75, epsilon = 1e-6);
    }

    #[test]
    fn test_hard_joint_bias_is_capped() {
        let mut bodies = vec![ball(1, 8.0, Meta::default())];
        let target = JointTarget::Point(Vec2::ZERO);
        let joint = Joint::new(1, 1, Vec2::ZERO, target, JoinConstraintConfig::hard(5.0));
        let cfg = WorldConfig::weightless();
        let dt = 1.0 / 60.0;
        let joints = std::slice::from_ref(&joint);
        let mut solver = JointSolver::new(&bodies, joints, |_| Some(0), &cfg, dt);
        assert_eq!(solver.len(), 1);
        solver.solve_velocities(&mut bodies);
        // error 3 * 0.2 / dt = 36 exceeds the 0.5 / dt = 30 cap
        assert_abs_diff_eq!(bodies[0].velocity().x, -30.0, epsilon = 1e-3);
    }

    #[test]
    fn test_soft_joint_is_gentler_than_hard() {
        let dt = 1.0 / 60.0;
        let cfg = WorldConfig::weightless();
        let pull = |config: JoinConstraintConfig| {
            let mut bodies = vec![ball(1, 8.0, Meta::default())];
            let joint = Joint::new(1, 1, Vec2::ZERO, JointTarget::Point(Vec2::ZERO), config);
            let mut solver = JointSolver::new(&bodies, &[joint], |_| Some(0), &cfg, dt);
            for _ in 0..cfg.velocity_iterations {
                solver.solve_velocities(&mut bodies);
            }
            bodies[0].velocity().x
        };
        let hard = pull(JoinConstraintConfig::hard(5.0));
        let soft = pull(JoinConstraintConfig::spring(5.0, 1.0, 0.5));
        assert!(soft < 0.0);
        assert!(soft > hard);
    }

    #[test]
    fn test_joint_to_missing_body_is_skipped() {
        let bodies = vec![ball(1, 0.0, Meta::default())];
        let joint = Joint::new(
            1,
            1,
            Vec2::ZERO,
            JointTarget::Body { id: 9, anchor: Vec2::ZERO },
            JoinConstraintConfig::default(),
        );
        let cfg = WorldConfig::default();
        let solver = JointSolver::new(&bodies, &[joint], |id| (id == 1).then_some(0), &cfg, 0.1);
        assert_eq!(solver.len(), 0);
    }
}
