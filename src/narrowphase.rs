use glam::Vec2;

use crate::api::NarrowphaseApi;
use crate::body::Body;
use crate::geometry::{Geometry, edges, outward_normal};
use crate::types::*;

/// Below this length a direction is considered degenerate.
const DIR_EPSILON: f32 = 1e-6;

/// Reference-face selection bias: B's axis must beat A's by this margin, so
/// near-equal axes resolve to the first polygon examined.
const REFERENCE_REL_TOL: f32 = 0.98;
const REFERENCE_ABS_TOL: f32 = 0.0005;

/// Exact contact generation for circles and convex polygons.
///
/// Polygon inputs are world-space, counter-clockwise and convex. Bodies with
/// a concave outline are collided through their convex parts.
pub struct Narrowphase;

/// One convex piece of a body, in world space.
enum Piece {
    Circle { center: Vec2, radius: f32 },
    Polygon(Vec<Vec2>),
}

fn world_pieces(body: &Body) -> Vec<Piece> {
    let t = body.transform();
    match body.geometry() {
        Geometry::Circle { radius } => vec![Piece::Circle {
            center: t.position,
            radius: *radius,
        }],
        geometry => geometry
            .convex_parts()
            .iter()
            .map(|part| Piece::Polygon(part.iter().map(|v| t.apply(*v)).collect()))
            .collect(),
    }
}

fn collide_pieces(a: &Piece, b: &Piece) -> Option<Manifold> {
    match (a, b) {
        (Piece::Circle { center: ca, radius: ra }, Piece::Circle { center: cb, radius: rb }) => {
            Narrowphase::circle_circle(*ca, *ra, *cb, *rb)
        }
        (Piece::Polygon(poly), Piece::Circle { center, radius }) => {
            Narrowphase::polygon_circle(poly, *center, *radius)
        }
        (Piece::Circle { center, radius }, Piece::Polygon(poly)) => {
            Narrowphase::polygon_circle(poly, *center, *radius).map(Manifold::flipped)
        }
        (Piece::Polygon(pa), Piece::Polygon(pb)) => Narrowphase::polygon_polygon(pa, pb),
    }
}

impl Narrowphase {
    /// Contact manifold for a body pair, normal pointing from `a` to `b`.
    ///
    /// With several convex pieces per body the deepest piece pair wins; equal
    /// depths keep the first pair in part order.
    pub fn collide(a: &Body, b: &Body) -> Option<Manifold> {
        let (pieces_a, pieces_b) = (world_pieces(a), world_pieces(b));
        let mut best: Option<Manifold> = None;
        for pa in &pieces_a {
            for pb in &pieces_b {
                let Some(m) = collide_pieces(pa, pb) else {
                    continue;
                };
                if best.is_none_or(|current| m.depth > current.depth) {
                    best = Some(m);
                }
            }
        }
        best
    }

    /// Ray against a body's shape. `dir` need not be unit length.
    pub fn ray_body(origin: Vec2, dir: Vec2, body: &Body) -> Option<RayHit> {
        world_pieces(body)
            .iter()
            .filter_map(|piece| match piece {
                Piece::Circle { center, radius } => {
                    Self::ray_circle(origin, dir, *center, *radius)
                }
                Piece::Polygon(poly) => Self::ray_polygon(origin, dir, poly),
            })
            .min_by(|x, y| x.toi.total_cmp(&y.toi))
    }
}

/// Edge of `poly` whose outward normal maximizes the minimum separation of
/// `other`. Strict comparison keeps the first edge on ties; zero-length edges
/// have no axis and are skipped.
fn find_max_separation(poly: &[Vec2], other: &[Vec2]) -> (usize, f32) {
    let mut best_index = 0;
    let mut best_sep = f32::NEG_INFINITY;
    for (i, (v1, v2)) in edges(poly).enumerate() {
        let n = outward_normal(v1, v2);
        if n == Vec2::ZERO {
            continue;
        }
        let sep = other
            .iter()
            .map(|p| n.dot(*p - v1))
            .fold(f32::INFINITY, f32::min);
        if sep > best_sep {
            best_sep = sep;
            best_index = i;
        }
    }
    (best_index, best_sep)
}

/// Edge of `incident` most anti-parallel to `ref_normal`.
fn find_incident_edge(incident: &[Vec2], ref_normal: Vec2) -> (Vec2, Vec2) {
    let mut best = 0;
    let mut best_dot = f32::INFINITY;
    for (i, (v1, v2)) in edges(incident).enumerate() {
        let n = outward_normal(v1, v2);
        if n == Vec2::ZERO {
            continue;
        }
        let d = n.dot(ref_normal);
        if d < best_dot {
            best_dot = d;
            best = i;
        }
    }
    (incident[best], incident[(best + 1) % incident.len()])
}

/// Keep the part of segment `pts` with `n·p <= offset`. `None` if fewer than two points remain.
fn clip_segment(pts: [Vec2; 2], n: Vec2, offset: f32) -> Option<[Vec2; 2]> {
    let d0 = n.dot(pts[0]) - offset;
    let d1 = n.dot(pts[1]) - offset;
    let mut out = [Vec2::ZERO; 2];
    let mut count = 0;
    if d0 <= 0.0 {
        out[count] = pts[0];
        count += 1;
    }
    if d1 <= 0.0 {
        out[count] = pts[1];
        count += 1;
    }
    if d0 * d1 < 0.0 && count < 2 {
        let t = d0 / (d0 - d1);
        out[count] = pts[0] + (pts[1] - pts[0]) * t;
        count += 1;
    }
    (count == 2).then_some(out)
}

impl NarrowphaseApi for Narrowphase {
    fn circle_circle(ca: Vec2, ra: f32, cb: Vec2, rb: f32) -> Option<Manifold> {
        let delta = cb - ca;
        let dist2 = delta.length_squared();
        let rsum = ra + rb;
        if dist2 >= rsum * rsum {
            return None;
        }
        let dist = dist2.sqrt();
        // Coincident centers: no preferred axis, pick +Y.
        let normal = if dist > DIR_EPSILON { delta / dist } else { Vec2::Y };
        let depth = rsum - dist;
        let position = ca + normal * (ra - depth * 0.5);
        Some(Manifold::single(normal, ContactPoint { position, depth }))
    }

    fn polygon_circle(poly: &[Vec2], center: Vec2, radius: f32) -> Option<Manifold> {
        let mut sep = f32::NEG_INFINITY;
        let mut index = 0;
        for (i, (v1, v2)) in edges(poly).enumerate() {
            let n = outward_normal(v1, v2);
            if n == Vec2::ZERO {
                continue;
            }
            let s = n.dot(center - v1);
            if s > radius {
                return None;
            }
            if s > sep {
                sep = s;
                index = i;
            }
        }
        let v1 = poly[index];
        let v2 = poly[(index + 1) % poly.len()];
        let face_normal = outward_normal(v1, v2);

        // Center inside the polygon: push out through the closest face.
        if sep < DIR_EPSILON {
            let depth = radius - sep;
            let position = center - face_normal * ((radius + sep) * 0.5);
            return Some(Manifold::single(face_normal, ContactPoint { position, depth }));
        }

        let vertex_region = if (center - v1).dot(v2 - v1) <= 0.0 {
            Some(v1)
        } else if (center - v2).dot(v1 - v2) <= 0.0 {
            Some(v2)
        } else {
            None
        };

        match vertex_region {
            Some(v) => {
                let d = center - v;
                let dist2 = d.length_squared();
                if dist2 >= radius * radius {
                    return None;
                }
                let dist = dist2.sqrt();
                let normal = if dist > DIR_EPSILON { d / dist } else { face_normal };
                let depth = radius - dist;
                let position = (v + center - normal * radius) * 0.5;
                Some(Manifold::single(normal, ContactPoint { position, depth }))
            }
            None => {
                let depth = radius - sep;
                if depth <= 0.0 {
                    return None;
                }
                let position = center - face_normal * ((radius + sep) * 0.5);
                Some(Manifold::single(face_normal, ContactPoint { position, depth }))
            }
        }
    }

    fn polygon_polygon(a: &[Vec2], b: &[Vec2]) -> Option<Manifold> {
        let (edge_a, sep_a) = find_max_separation(a, b);
        if sep_a > 0.0 {
            return None;
        }
        let (edge_b, sep_b) = find_max_separation(b, a);
        if sep_b > 0.0 {
            return None;
        }

        let b_is_reference = sep_b > REFERENCE_REL_TOL * sep_a + REFERENCE_ABS_TOL;
        let (reference, incident, edge, flip) = if b_is_reference {
            (b, a, edge_b, true)
        } else {
            (a, b, edge_a, false)
        };

        let v1 = reference[edge];
        let v2 = reference[(edge + 1) % reference.len()];
        let tangent = (v2 - v1).normalize_or_zero();
        if tangent == Vec2::ZERO {
            return None;
        }
        let ref_normal = Vec2::new(tangent.y, -tangent.x);

        let (i1, i2) = find_incident_edge(incident, ref_normal);
        let clipped = clip_segment([i1, i2], -tangent, -tangent.dot(v1))?;
        let clipped = clip_segment(clipped, tangent, tangent.dot(v2))?;

        let front = ref_normal.dot(v1);
        let mut points = clipped.iter().filter_map(|p| {
            let separation = ref_normal.dot(*p) - front;
            (separation < 0.0).then(|| ContactPoint {
                position: *p - ref_normal * (separation * 0.5),
                depth: -separation,
            })
        });

        let normal = if flip { -ref_normal } else { ref_normal };
        match (points.next(), points.next()) {
            (Some(p0), Some(p1)) => Some(Manifold::pair(normal, p0, p1)),
            (Some(p0), None) => Some(Manifold::single(normal, p0)),
            _ => None,
        }
    }

    fn ray_circle(origin: Vec2, dir: Vec2, center: Vec2, r: f32) -> Option<RayHit> {
        // Solve ||origin + t*dir - center||^2 = r^2 for t >= 0
        let m = origin - center;
        let a = dir.length_squared();
        if a == 0.0 {
            return None;
        }
        let c = m.length_squared() - r * r;
        if c <= 0.0 {
            // Origin inside: immediate hit without a surface normal.
            return Some(RayHit { toi: 0.0, normal: Vec2::ZERO, point: origin });
        }
        let b = 2.0 * m.dot(dir);
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return None;
        }
        let t = (-b - disc.sqrt()) / (2.0 * a);
        if t < 0.0 {
            return None;
        }
        let point = origin + dir * t;
        let normal = (point - center).normalize_or_zero();
        Some(RayHit { toi: t, normal, point })
    }

    fn ray_polygon(origin: Vec2, dir: Vec2, poly: &[Vec2]) -> Option<RayHit> {
        if dir.length_squared() == 0.0 {
            return None;
        }
        let mut lower = 0.0f32;
        let mut upper = f32::INFINITY;
        let mut entry_normal: Option<Vec2> = None;
        for (v1, v2) in edges(poly) {
            let n = outward_normal(v1, v2);
            let numerator = n.dot(v1 - origin);
            let denominator = n.dot(dir);
            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                lower = numerator / denominator;
                entry_normal = Some(n);
            } else if denominator > 0.0 && numerator < upper * denominator {
                upper = numerator / denominator;
            }
            if upper < lower {
                return None;
            }
        }
        let normal = entry_normal.unwrap_or(Vec2::ZERO);
        Some(RayHit { toi: lower, normal, point: origin + dir * lower })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square(center: Vec2, half: f32) -> Vec<Vec2> {
        vec![
            center + Vec2::new(-half, -half),
            center + Vec2::new(half, -half),
            center + Vec2::new(half, half),
            center + Vec2::new(-half, half),
        ]
    }

    #[test]
    fn test_circle_circle_basic() {
        let m = Narrowphase::circle_circle(Vec2::ZERO, 1.0, Vec2::new(1.5, 0.0), 1.0).unwrap();
        assert_abs_diff_eq!(m.depth, 0.5, epsilon = 1e-6);
        // normal points from A to B
        assert_abs_diff_eq!(m.normal.x, 1.0, epsilon = 1e-6);
        assert_eq!(m.points().len(), 1);
        assert_abs_diff_eq!(m.points()[0].position.x, 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_circle_circle_touching_is_not_contact() {
        assert!(Narrowphase::circle_circle(Vec2::ZERO, 1.0, Vec2::new(2.0, 0.0), 1.0).is_none());
    }

    #[test]
    fn test_circle_circle_coincident_uses_fallback_axis() {
        let m = Narrowphase::circle_circle(Vec2::ZERO, 1.0, Vec2::ZERO, 1.0).unwrap();
        assert_eq!(m.normal, Vec2::Y);
        assert_abs_diff_eq!(m.depth, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_polygon_circle_face_region() {
        let poly = square(Vec2::ZERO, 1.0);
        let m = Narrowphase::polygon_circle(&poly, Vec2::new(1.4, 0.2), 0.5).unwrap();
        assert_abs_diff_eq!(m.normal.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(m.depth, 0.1, epsilon = 1e-5);
        assert!(Narrowphase::polygon_circle(&poly, Vec2::new(1.6, 0.0), 0.5).is_none());
    }

    #[test]
    fn test_polygon_circle_vertex_region() {
        let poly = square(Vec2::ZERO, 1.0);
        let c = Vec2::new(1.3, 1.3);
        let m = Narrowphase::polygon_circle(&poly, c, 0.5).unwrap();
        let expected = Vec2::new(1.0, 1.0).normalize();
        assert_abs_diff_eq!(m.normal.x, expected.x, epsilon = 1e-5);
        assert_abs_diff_eq!(m.depth, 0.5 - 0.3 * 2.0f32.sqrt(), epsilon = 1e-5);
        // just outside the corner
        assert!(Narrowphase::polygon_circle(&poly, Vec2::new(1.4, 1.4), 0.5).is_none());
    }

    #[test]
    fn test_polygon_circle_center_inside() {
        let poly = square(Vec2::ZERO, 1.0);
        let m = Narrowphase::polygon_circle(&poly, Vec2::new(0.0, 0.8), 0.5).unwrap();
        assert_abs_diff_eq!(m.normal.y, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(m.depth, 0.7, epsilon = 1e-5);
    }

    #[test]
    fn test_polygon_polygon_face_contact_has_two_points() {
        let a = square(Vec2::ZERO, 1.0);
        let b = square(Vec2::new(1.9, 0.5), 1.0);
        let m = Narrowphase::polygon_polygon(&a, &b).unwrap();
        assert_abs_diff_eq!(m.normal.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(m.depth, 0.1, epsilon = 1e-5);
        assert_eq!(m.points().len(), 2);
        for p in m.points() {
            assert!(p.position.y >= -0.5 - 1e-5 && p.position.y <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_polygon_polygon_separated_and_touching() {
        let a = square(Vec2::ZERO, 1.0);
        assert!(Narrowphase::polygon_polygon(&a, &square(Vec2::new(2.5, 0.0), 1.0)).is_none());
        assert!(Narrowphase::polygon_polygon(&a, &square(Vec2::new(2.0, 0.0), 1.0)).is_none());
    }

    #[test]
    fn test_polygon_polygon_normal_points_a_to_b_when_b_is_reference() {
        // B's axis is clearly better, so B becomes the reference face
        let a = vec![Vec2::new(-0.5, 0.9), Vec2::new(0.0, 0.4), Vec2::new(0.5, 0.9)];
        let b = square(Vec2::new(0.0, -0.5), 1.0);
        let m = Narrowphase::polygon_polygon(&a, &b).unwrap();
        assert!(m.normal.y < -0.99);
        assert_abs_diff_eq!(m.depth, 0.1, epsilon = 1e-5);
    }

    #[test]
    fn test_polygon_polygon_tie_break_is_deterministic() {
        let a = square(Vec2::ZERO, 1.0);
        let b = square(Vec2::new(1.5, 1.5), 1.0);
        let m1 = Narrowphase::polygon_polygon(&a, &b).unwrap();
        let m2 = Narrowphase::polygon_polygon(&a, &b).unwrap();
        assert_eq!(m1, m2);
        // equal X/Y overlap: A's +X edge is examined before its +Y edge
        assert_abs_diff_eq!(m1.normal.x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_repeated_corner_keeps_real_axes() {
        let mut poly = square(Vec2::ZERO, 1.0);
        poly.insert(1, poly[1]);

        let m = Narrowphase::polygon_circle(&poly, Vec2::new(0.0, 0.8), 0.5).unwrap();
        assert_abs_diff_eq!(m.normal.y, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(m.depth, 0.7, epsilon = 1e-5);

        let m = Narrowphase::polygon_polygon(&poly, &square(Vec2::new(1.9, 0.5), 1.0)).unwrap();
        assert_abs_diff_eq!(m.normal.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(m.depth, 0.1, epsilon = 1e-5);
        assert_eq!(m.points().len(), 2);
    }

    #[test]
    fn test_concave_body_collides_through_its_parts() {
        let outline = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        let (geometry, centroid) = Geometry::concave(&outline).unwrap();
        let l = Body::new(1, geometry, centroid, Meta::fixed()).unwrap();

        let ball = |id: BodyId, center: Vec2, radius: f32| {
            Body::new(id, Geometry::circle(radius).unwrap(), center, Meta::default()).unwrap()
        };

        // ball sitting in the notch, pressing on the inner vertical face
        let m = Narrowphase::collide(&l, &ball(2, Vec2::new(1.4, 1.5), 0.5)).unwrap();
        assert_abs_diff_eq!(m.normal.x, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(m.depth, 0.1, epsilon = 1e-4);

        // the notch itself is empty
        assert!(Narrowphase::collide(&l, &ball(3, Vec2::new(1.5, 1.5), 0.3)).is_none());

        let hit = Narrowphase::ray_body(Vec2::new(1.5, 1.5), -Vec2::X, &l).unwrap();
        assert_abs_diff_eq!(hit.toi, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_ray_circle_hit_and_inside() {
        let hit = Narrowphase::ray_circle(Vec2::new(-3.0, 0.0), Vec2::X, Vec2::ZERO, 1.0).unwrap();
        assert_abs_diff_eq!(hit.toi, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.normal.x, -1.0, epsilon = 1e-5);
        let inside = Narrowphase::ray_circle(Vec2::ZERO, Vec2::X, Vec2::ZERO, 1.0).unwrap();
        assert_eq!(inside.toi, 0.0);
        assert!(Narrowphase::ray_circle(Vec2::new(-3.0, 2.0), Vec2::X, Vec2::ZERO, 1.0).is_none());
        assert!(Narrowphase::ray_circle(Vec2::new(3.0, 0.0), Vec2::X, Vec2::ZERO, 1.0).is_none());
    }

    #[test]
    fn test_ray_polygon() {
        let poly = square(Vec2::ZERO, 1.0);
        let hit = Narrowphase::ray_polygon(Vec2::new(-5.0, 0.0), Vec2::X, &poly).unwrap();
        assert_abs_diff_eq!(hit.toi, 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.normal.x, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(hit.point.x, -1.0, epsilon = 1e-5);
        assert!(Narrowphase::ray_polygon(Vec2::new(-5.0, 2.0), Vec2::X, &poly).is_none());
        assert!(Narrowphase::ray_polygon(Vec2::new(5.0, 0.0), Vec2::X, &poly).is_none());
        let inside = Narrowphase::ray_polygon(Vec2::ZERO, Vec2::Y, &poly).unwrap();
        assert_eq!(inside.normal, Vec2::ZERO);
    }
}
