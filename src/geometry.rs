//! Shape math for circles, convex polygons and concave polygons.
//!
//! Geometry is stored in the body's local frame with the centroid at the
//! origin; every query takes the body's [`Transform`] and works in world space.
//! A concave polygon keeps its outline for drawing and bounds, and a convex
//! decomposition that the narrow-phase collides part by part.

use glam::Vec2;

use crate::error::{PhysicsError, Result};
use crate::types::{Aabb, Transform};

/// Areas below this are treated as degenerate polygons.
const MIN_POLYGON_AREA: f32 = 1e-6;

/// Consecutive vertices closer than this are merged into one.
const VERTEX_MERGE_DISTANCE: f32 = 1e-4;

/// Sine of the turn angle below which a vertex counts as straight.
const COLLINEAR_EPSILON: f32 = 1e-5;

/// Local-frame collision geometry.
///
/// Polygons are counter-clockwise and must be convex. Convexity is a
/// precondition: a concave vertex list handed to [`Geometry::polygon`] is
/// accepted but produces undefined contact results. Use
/// [`Geometry::concave`] for outlines that may be concave.
///
/// The variants are public for matching. Bodies re-derive them through the
/// checked constructors (see [`Geometry::validated`]), so hand-built values
/// never skip validation.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Circle { radius: f32 },
    Polygon { vertices: Vec<Vec2> },
    /// Simple non-convex polygon: `outline` is the counter-clockwise boundary,
    /// `parts` its convex decomposition in the same frame.
    Concave { outline: Vec<Vec2>, parts: Vec<Vec<Vec2>> },
}

impl Geometry {
    pub fn circle(radius: f32) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(PhysicsError::InvalidShape(format!(
                "circle radius must be positive (got {radius})"
            )));
        }
        Ok(Geometry::Circle { radius })
    }

    /// Build a convex polygon from world-space points.
    ///
    /// Returns the local geometry and the world-space centroid that becomes
    /// the body's position. Clockwise input is reversed and repeated
    /// neighbouring vertices are merged.
    pub fn polygon(points: &[Vec2]) -> Result<(Self, Vec2)> {
        let ordered = clean_outline(points)?;
        let centroid = polygon_centroid(&ordered);
        let vertices = localize(ordered, centroid);
        Ok((Geometry::Polygon { vertices }, centroid))
    }

    /// Build any simple polygon from world-space points.
    ///
    /// Convex input comes back as a plain [`Geometry::Polygon`]. Otherwise the
    /// outline is ear-clipped and neighbouring pieces are merged while their
    /// union stays convex. A self-intersecting outline is rejected.
    pub fn concave(points: &[Vec2]) -> Result<(Self, Vec2)> {
        let outline = drop_collinear(clean_outline(points)?);
        if !is_simple(&outline) {
            return Err(PhysicsError::InvalidShape("polygon outline intersects itself".into()));
        }
        if is_convex(&outline) {
            return Self::polygon(&outline);
        }
        let parts = decompose(&outline)?;
        let centroid = polygon_centroid(&outline);
        let geometry = Geometry::Concave {
            outline: localize(outline, centroid),
            parts: parts.into_iter().map(|part| localize(part, centroid)).collect(),
        };
        Ok((geometry, centroid))
    }

    /// Axis-aligned rectangle centered on the origin.
    pub fn rect(width: f32, height: f32) -> Result<Self> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(PhysicsError::InvalidShape(format!(
                "rect size must be positive (got {width} x {height})"
            )));
        }
        let h = Vec2::new(width, height) * 0.5;
        let (geometry, _) = Self::polygon(&[
            Vec2::new(-h.x, -h.y),
            Vec2::new(h.x, -h.y),
            Vec2::new(h.x, h.y),
            Vec2::new(-h.x, h.y),
        ])?;
        Ok(geometry)
    }

    /// Regular polygon inscribed in a circle of `radius`, first vertex on +X.
    pub fn regular_polygon(sides: usize, radius: f32) -> Result<Self> {
        if sides < 3 {
            return Err(PhysicsError::InvalidShape(format!(
                "regular polygon needs at least 3 sides (got {sides})"
            )));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(PhysicsError::InvalidShape(format!(
                "regular polygon radius must be positive (got {radius})"
            )));
        }
        let step = std::f32::consts::TAU / sides as f32;
        let points: Vec<Vec2> = (0..sides)
            .map(|i| Vec2::from_angle(step * i as f32) * radius)
            .collect();
        let (geometry, _) = Self::polygon(&points)?;
        Ok(geometry)
    }

    /// Re-derive this geometry through the checked constructors.
    ///
    /// Polygons come back centred on their centroid; a concave polygon is
    /// rebuilt from its outline and any given parts are discarded.
    pub fn validated(self) -> Result<Self> {
        match self {
            Geometry::Circle { radius } => Self::circle(radius),
            Geometry::Polygon { vertices } => Ok(Self::polygon(&vertices)?.0),
            Geometry::Concave { outline, .. } => Ok(Self::concave(&outline)?.0),
        }
    }

    pub fn area(&self) -> f32 {
        match self {
            Geometry::Circle { radius } => std::f32::consts::PI * radius * radius,
            _ => signed_area(self.outline()),
        }
    }

    /// Moment of inertia about the centroid per unit mass.
    pub fn unit_inertia(&self) -> f32 {
        match self {
            Geometry::Circle { radius } => 0.5 * radius * radius,
            _ => {
                // triangle fan from the origin; signed, so concave outlines work too
                let mut num = 0.0;
                let mut den = 0.0;
                for (a, b) in edges(self.outline()) {
                    let cross = a.perp_dot(b);
                    num += cross * (a.dot(a) + a.dot(b) + b.dot(b));
                    den += cross;
                }
                if den > 0.0 { num / (6.0 * den) } else { 0.0 }
            }
        }
    }

    /// Boundary vertices in the local frame (empty for circles).
    pub fn outline(&self) -> &[Vec2] {
        match self {
            Geometry::Circle { .. } => &[],
            Geometry::Polygon { vertices } => vertices,
            Geometry::Concave { outline, .. } => outline,
        }
    }

    /// Convex pieces in the local frame: the polygon itself, or the parts of a
    /// concave polygon. Circles have none.
    pub fn convex_parts(&self) -> &[Vec<Vec2>] {
        match self {
            Geometry::Circle { .. } => &[],
            Geometry::Polygon { vertices } => std::slice::from_ref(vertices),
            Geometry::Concave { parts, .. } => parts,
        }
    }

    pub fn aabb(&self, t: &Transform) -> Aabb {
        match self {
            Geometry::Circle { radius } => {
                let r = Vec2::splat(*radius);
                Aabb::new(t.position - r, t.position + r)
            }
            _ => {
                let mut min = Vec2::splat(f32::INFINITY);
                let mut max = Vec2::splat(f32::NEG_INFINITY);
                for v in self.outline() {
                    let w = t.apply(*v);
                    min = min.min(w);
                    max = max.max(w);
                }
                Aabb::new(min, max)
            }
        }
    }

    /// Furthest world point along `dir`. Ties keep the first vertex in winding order.
    pub fn support(&self, t: &Transform, dir: Vec2) -> Vec2 {
        match self {
            Geometry::Circle { radius } => t.position + dir.normalize_or_zero() * *radius,
            _ => {
                let local_dir = t.inverse_apply_vector(dir);
                let mut best = Vec2::ZERO;
                let mut best_dot = f32::NEG_INFINITY;
                for v in self.outline() {
                    let d = v.dot(local_dir);
                    if d > best_dot {
                        best_dot = d;
                        best = *v;
                    }
                }
                t.apply(best)
            }
        }
    }

    /// Boundary points count as inside.
    pub fn contains_point(&self, t: &Transform, p: Vec2) -> bool {
        match self {
            Geometry::Circle { radius } => (p - t.position).length_squared() <= radius * radius,
            _ => {
                let local = t.inverse_apply(p);
                self.convex_parts().iter().any(|part| {
                    edges(part).all(|(a, b)| (b - a).perp_dot(local - a) >= 0.0)
                })
            }
        }
    }

    /// World-space outline vertices, computed on each call. Circles yield nothing.
    pub fn world_vertices<'a>(&'a self, t: Transform) -> impl Iterator<Item = Vec2> + 'a {
        self.outline().iter().map(move |v| t.apply(*v))
    }
}

/// Consecutive vertex pairs, closing the loop.
pub(crate) fn edges(vertices: &[Vec2]) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
    let n = vertices.len();
    (0..n).map(move |i| (vertices[i], vertices[(i + 1) % n]))
}

/// Outward normal of edge `a -> b` on a counter-clockwise polygon. Zero for a
/// zero-length edge.
pub(crate) fn outward_normal(a: Vec2, b: Vec2) -> Vec2 {
    let e = b - a;
    Vec2::new(e.y, -e.x).normalize_or_zero()
}

/// Positive for counter-clockwise winding.
fn signed_area(points: &[Vec2]) -> f32 {
    edges(points).map(|(a, b)| a.perp_dot(b)).sum::<f32>() * 0.5
}

fn polygon_centroid(points: &[Vec2]) -> Vec2 {
    // Relative to the first vertex to keep precision for far-away polygons.
    let origin = points[0];
    let mut weighted = Vec2::ZERO;
    let mut area2 = 0.0;
    for (a, b) in edges(points) {
        let (a, b) = (a - origin, b - origin);
        let cross = a.perp_dot(b);
        weighted += (a + b) * cross;
        area2 += cross;
    }
    origin + weighted / (3.0 * area2)
}

fn localize(points: Vec<Vec2>, centroid: Vec2) -> Vec<Vec2> {
    points.into_iter().map(|p| p - centroid).collect()
}

/// Checks raw input and returns it counter-clockwise with near-coincident
/// neighbours merged.
fn clean_outline(points: &[Vec2]) -> Result<Vec<Vec2>> {
    if points.iter().any(|p| !p.is_finite()) {
        return Err(PhysicsError::InvalidShape("polygon vertex is not finite".into()));
    }
    let mut out: Vec<Vec2> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last().is_none_or(|last| last.distance(p) > VERTEX_MERGE_DISTANCE) {
            out.push(p);
        }
    }
    while out.len() > 1 && out[0].distance(out[out.len() - 1]) <= VERTEX_MERGE_DISTANCE {
        out.pop();
    }
    if out.len() < 3 {
        return Err(PhysicsError::InvalidShape(format!(
            "polygon needs at least 3 distinct vertices (got {})",
            out.len()
        )));
    }
    let area = signed_area(&out);
    if area.abs() < MIN_POLYGON_AREA {
        return Err(PhysicsError::InvalidShape("polygon has zero area".into()));
    }
    if area < 0.0 {
        out.reverse();
    }
    Ok(out)
}

/// Turn at `b` along `a -> b -> c`, scaled to the sine of the angle.
fn turn(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    let (e1, e2) = (b - a, c - b);
    let scale = e1.length() * e2.length();
    if scale > 0.0 { e1.perp_dot(e2) / scale } else { 0.0 }
}

/// Remove vertices that sit on a straight line between their neighbours.
fn drop_collinear(mut points: Vec<Vec2>) -> Vec<Vec2> {
    let mut i = 0;
    while points.len() > 3 && i < points.len() {
        let n = points.len();
        let t = turn(points[(i + n - 1) % n], points[i], points[(i + 1) % n]);
        if t.abs() <= COLLINEAR_EPSILON {
            points.remove(i);
            i = 0;
        } else {
            i += 1;
        }
    }
    points
}

fn is_convex(points: &[Vec2]) -> bool {
    let n = points.len();
    (0..n).all(|i| turn(points[i], points[(i + 1) % n], points[(i + 2) % n]) >= -COLLINEAR_EPSILON)
}

/// Proper crossing of two segments; touching endpoints do not count.
fn segments_cross(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2) -> bool {
    let d1 = (p2 - p1).perp_dot(q1 - p1);
    let d2 = (p2 - p1).perp_dot(q2 - p1);
    let d3 = (q2 - q1).perp_dot(p1 - q1);
    let d4 = (q2 - q1).perp_dot(p2 - q1);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

/// No two non-adjacent edges cross.
fn is_simple(points: &[Vec2]) -> bool {
    let n = points.len();
    (0..n).all(|i| {
        ((i + 2)..n)
            .filter(|&j| !(i == 0 && j == n - 1))
            .all(|j| {
                !segments_cross(points[i], points[(i + 1) % n], points[j], points[(j + 1) % n])
            })
    })
}

/// Closed test: points on the triangle's edges count as inside.
fn in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    (b - a).perp_dot(p - a) >= 0.0
        && (c - b).perp_dot(p - b) >= 0.0
        && (a - c).perp_dot(p - c) >= 0.0
}

/// Union of two index polygons sharing an edge, walking `p` from the shared
/// edge's far end round to its near end, then the rest of `q`.
fn merge_pieces(p: &[usize], q: &[usize]) -> Option<Vec<usize>> {
    let (np, nq) = (p.len(), q.len());
    for i in 0..np {
        let (u, v) = (p[i], p[(i + 1) % np]);
        let Some(j) = (0..nq).find(|&j| q[j] == v && q[(j + 1) % nq] == u) else {
            continue;
        };
        let mut out: Vec<usize> = (0..np).map(|k| p[(i + 1 + k) % np]).collect();
        out.extend((2..nq).map(|k| q[(j + k) % nq]));
        return Some(out);
    }
    None
}

/// Convex decomposition of a counter-clockwise simple outline.
fn decompose(outline: &[Vec2]) -> Result<Vec<Vec<Vec2>>> {
    let mut remaining: Vec<usize> = (0..outline.len()).collect();
    let mut pieces: Vec<Vec<usize>> = Vec::new();
    while remaining.len() > 3 {
        let m = remaining.len();
        let ear = (0..m).find(|&i| {
            let tri = [remaining[(i + m - 1) % m], remaining[i], remaining[(i + 1) % m]];
            let [a, b, c] = tri.map(|k| outline[k]);
            (b - a).perp_dot(c - b) > 0.0
                && remaining
                    .iter()
                    .filter(|&&k| !tri.contains(&k))
                    .all(|&k| !in_triangle(outline[k], a, b, c))
        });
        let Some(i) = ear else {
            return Err(PhysicsError::InvalidShape("polygon outline intersects itself".into()));
        };
        pieces.push(vec![remaining[(i + m - 1) % m], remaining[i], remaining[(i + 1) % m]]);
        remaining.remove(i);
    }
    pieces.push(remaining);

    let points = |piece: &[usize]| piece.iter().map(|&k| outline[k]).collect::<Vec<Vec2>>();
    'merge: loop {
        for i in 0..pieces.len() {
            for j in (i + 1)..pieces.len() {
                let Some(union) = merge_pieces(&pieces[i], &pieces[j]) else {
                    continue;
                };
                if is_convex(&points(&union)) {
                    pieces[i] = union;
                    pieces.swap_remove(j);
                    continue 'merge;
                }
            }
        }
        break;
    }
    Ok(pieces.iter().map(|piece| drop_collinear(points(piece))).collect())
}
