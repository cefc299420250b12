use glam::Vec2;
use rigidbonk::*;
use std::time::Instant;

fn lcg(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}

fn main() -> Result<()> {
    for broad_phase in [BroadPhaseKind::SortAndSweep, BroadPhaseKind::Grid] {
        let mut world = PhysicsWorld::try_new(WorldConfig {
            broad_phase,
            cell_size: 2.0,
            enable_timing: true,
            ..Default::default()
        })?;

        world.add_rect(-110.0, 100.0, 220.0, 4.0, Meta::fixed())?;
        let n = 2_000usize; // number of dynamic bodies
        let mut seed = 1u32;
        for i in 0..n {
            let rx = (lcg(&mut seed) as f32 / u32::MAX as f32) * 200.0 - 100.0;
            let ry = (lcg(&mut seed) as f32 / u32::MAX as f32) * 180.0 - 90.0;
            let vx = (lcg(&mut seed) as f32 / u32::MAX as f32) * 4.0 - 2.0;
            let meta = Meta {
                velocity: Vec2::new(vx, 0.0),
                restitution: 0.2,
                ..Default::default()
            };
            if i % 2 == 0 {
                world.add_rect(rx - 0.5, ry - 0.5, 1.0, 1.0, meta)?;
            } else {
                world.add_circle(Vec2::new(rx, ry), 0.5, meta)?;
            }
        }

        let steps = 120;
        let t0 = Instant::now();
        let mut worst = 0.0f64;
        for _ in 0..steps {
            world.step(1.0 / 60.0)?;
            if let Some(t) = world.timing() {
                worst = worst.max(t.step_ms);
            }
        }
        let total = t0.elapsed();
        let stats = world.stats();
        if let Some(t) = world.timing() {
            println!(
                "{:?} N={} steps={} total={:?} worst={:.3}ms last: broad={:.3}ms narrow={:.3}ms solve={:.3}ms integrate={:.3}ms pairs={} contacts={}",
                broad_phase,
                n,
                steps,
                total,
                worst,
                t.broadphase_ms,
                t.narrowphase_ms,
                t.solver_ms,
                t.integrate_ms,
                stats.candidate_pairs,
                stats.contacts
            );
        }
    }
    Ok(())
}
