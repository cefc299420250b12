use glam::Vec2;
use rigidbonk::*;

fn main() -> Result<()> {
    let mut world = PhysicsWorld::default();
    let radius = 0.5;
    let length = 4.0;
    let mut balls = Vec::new();
    for i in 0..5 {
        let x = i as f32 * 2.0 * radius;
        let pivot = Vec2::new(x, 0.0);
        let meta = Meta { friction: 0.0, ..Default::default() };
        let ball = if i == 0 {
            // first ball pulled out to the side
            world.add_circle(pivot + Vec2::new(-length, 0.0), radius, meta)?
        } else {
            world.add_circle(pivot + Vec2::new(0.0, length), radius, meta)?
        };
        let center = world.body(ball).map(Body::position).unwrap_or(pivot);
        world.add_point_constraint(ball, center, pivot, JoinConstraintConfig::hard(length))?;
        balls.push(ball);
    }

    for frame in 0..240 {
        world.step(1.0 / 60.0)?;
        if frame % 20 == 0 {
            let xs: Vec<String> = balls
                .iter()
                .filter_map(|&id| world.body(id))
                .map(|b| format!("{:6.2}", b.position().x))
                .collect();
            println!(
                "t={:.2}s x=[{}] ke={:.3}",
                world.total_time(),
                xs.join(", "),
                world.kinetic_energy()
            );
        }
    }
    Ok(())
}
