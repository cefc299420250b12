use std::collections::{HashMap, HashSet};

use crate::body::Body;
use crate::types::{Aabb, BroadPhaseKind};

/// Candidate pair generator over body bounds.
///
/// Pairs are arena indices `(a, b)` with `a < b`, sorted, so the solver sees
/// the same order on every run regardless of strategy or hashing.
pub struct BroadPhase {
    kind: BroadPhaseKind,
    cell_size: f32,
    aabbs: Vec<Aabb>,
    // Uniform grid: cell coord -> list of body indices
    grid: HashMap<(i32, i32), Vec<usize>>,
    // Sort-and-sweep order, reused between steps (mostly sorted already)
    order: Vec<usize>,
}

impl BroadPhase {
    pub fn new(kind: BroadPhaseKind, cell_size: f32) -> Self {
        Self {
            kind,
            cell_size,
            aabbs: Vec::new(),
            grid: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Number of occupied grid cells from the last `find_pairs` (0 for sort-and-sweep).
    pub fn cells(&self) -> usize {
        self.grid.len()
    }

    pub fn find_pairs(&mut self, bodies: &[Body]) -> Vec<(usize, usize)> {
        self.aabbs.clear();
        self.aabbs.extend(bodies.iter().map(Body::aabb));
        let mut pairs = match self.kind {
            BroadPhaseKind::Grid => self.grid_pairs(bodies),
            BroadPhaseKind::SortAndSweep => self.sweep_pairs(bodies),
        };
        pairs.sort_unstable();
        pairs
    }

    fn grid_pairs(&mut self, bodies: &[Body]) -> Vec<(usize, usize)> {
        self.grid.clear();
        let cs = self.cell_size.max(1e-5);
        for (i, body) in bodies.iter().enumerate() {
            if body.is_transparent() {
                continue;
            }
            let bb = self.aabbs[i];
            let ix0 = (bb.min.x / cs).floor() as i32;
            let iy0 = (bb.min.y / cs).floor() as i32;
            let ix1 = (bb.max.x / cs).floor() as i32;
            let iy1 = (bb.max.y / cs).floor() as i32;
            for iy in iy0..=iy1 {
                for ix in ix0..=ix1 {
                    self.grid.entry((ix, iy)).or_default().push(i);
                }
            }
        }

        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut out = Vec::new();
        for indices in self.grid.values() {
            for i0 in 0..indices.len() {
                for i1 in (i0 + 1)..indices.len() {
                    let (a, b) = (indices[i0], indices[i1]);
                    let key = if a < b { (a, b) } else { (b, a) };
                    if !seen.insert(key) {
                        continue;
                    }
                    let overlap = self.aabbs[key.0].overlaps(&self.aabbs[key.1]);
                    if overlap && admissible(&bodies[key.0], &bodies[key.1]) {
                        out.push(key);
                    }
                }
            }
        }
        out
    }

    fn sweep_pairs(&mut self, bodies: &[Body]) -> Vec<(usize, usize)> {
        let aabbs = &self.aabbs;
        self.order.clear();
        self.order.extend((0..bodies.len()).filter(|&i| !bodies[i].is_transparent()));
        self.order
            .sort_by(|&a, &b| aabbs[a].min.x.total_cmp(&aabbs[b].min.x).then(a.cmp(&b)));

        let mut out = Vec::new();
        for (k, &i) in self.order.iter().enumerate() {
            let bi = aabbs[i];
            for &j in &self.order[k + 1..] {
                let bj = aabbs[j];
                if bj.min.x > bi.max.x {
                    break;
                }
                let overlap_y = bi.min.y <= bj.max.y && bi.max.y >= bj.min.y;
                if overlap_y && admissible(&bodies[i], &bodies[j]) {
                    out.push(if i < j { (i, j) } else { (j, i) });
                }
            }
        }
        out
    }
}

/// Transparent bodies never collide; two resting bodies (fixed or asleep) have
/// nothing to resolve.
fn admissible(a: &Body, b: &Body) -> bool {
    !a.is_transparent() && !b.is_transparent() && !(a.is_resting() && b.is_resting())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::types::Meta;
    use glam::Vec2;

    fn circle(id: u32, x: f32, y: f32, meta: Meta) -> Body {
        Body::new(id, Geometry::circle(0.5).unwrap(), Vec2::new(x, y), meta).unwrap()
    }

    fn scene() -> Vec<Body> {
        vec![
            circle(1, 0.0, 0.0, Meta::default()),
            circle(2, 0.8, 0.0, Meta::default()),
            circle(3, 5.0, 0.0, Meta::default()),
            circle(4, 0.4, 0.6, Meta { is_transparent: true, ..Default::default() }),
            circle(5, 5.5, 0.0, Meta::fixed()),
            circle(6, 5.2, 0.5, Meta::fixed()),
        ]
    }

    #[test]
    fn test_grid_coverage_matches_bounds() {
        let mut bp = BroadPhase::new(BroadPhaseKind::Grid, 1.0);
        let bodies = vec![circle(1, 0.0, 0.0, Meta::default())];
        bp.find_pairs(&bodies);
        // bounds straddling the origin cover 4 cells with floor indexing
        assert_eq!(bp.cells(), 4);
    }

    #[test]
    fn test_filters_transparent_and_fixed_pairs() {
        for kind in [BroadPhaseKind::Grid, BroadPhaseKind::SortAndSweep] {
            let mut bp = BroadPhase::new(kind, 1.0);
            let pairs = bp.find_pairs(&scene());
            // 0-1 overlap; 2-4 and 2-5 dynamic vs fixed; 4-5 both fixed; 3 transparent
            assert_eq!(pairs, vec![(0, 1), (2, 4), (2, 5)], "{kind:?}");
        }
    }

    #[test]
    fn test_sleeping_pairs_skipped() {
        let mut bodies = vec![
            circle(1, 0.0, 0.0, Meta::default()),
            circle(2, 0.8, 0.0, Meta::default()),
            circle(3, 0.0, 0.8, Meta::fixed()),
        ];
        for body in &mut bodies[..2] {
            body.update_sleep(1.0, 1);
        }
        let mut bp = BroadPhase::new(BroadPhaseKind::SortAndSweep, 1.0);
        assert!(bp.find_pairs(&bodies).is_empty());

        bodies[1].wake();
        assert_eq!(bp.find_pairs(&bodies), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_strategies_agree_on_random_scene() {
        let mut seed = 7u32;
        let mut rnd = || {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            seed as f32 / u32::MAX as f32
        };
        let bodies: Vec<Body> = (0..200)
            .map(|i| circle(i + 1, rnd() * 30.0, rnd() * 30.0, Meta::default()))
            .collect();
        let grid = BroadPhase::new(BroadPhaseKind::Grid, 2.0).find_pairs(&bodies);
        let sweep = BroadPhase::new(BroadPhaseKind::SortAndSweep, 2.0).find_pairs(&bodies);
        assert_eq!(grid, sweep);
        // completeness against brute force
        let mut brute = Vec::new();
        for a in 0..bodies.len() {
            for b in (a + 1)..bodies.len() {
                if bodies[a].aabb().overlaps(&bodies[b].aabb()) {
                    brute.push((a, b));
                }
            }
        }
        assert_eq!(sweep, brute);
    }
}
