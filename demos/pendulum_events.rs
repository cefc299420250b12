use glam::Vec2;
use rigidbonk::*;

use std::cell::RefCell;
use std::rc::Rc;

fn main() -> Result<()> {
    let mut world = PhysicsWorld::default();

    let ceiling = world.add_rect(-5.0, -1.0, 10.0, 1.0, Meta::fixed())?;
    let bob = world.add_circle(Vec2::new(3.0, 2.0), 0.4, Meta::default())?;
    let weight = world.add_rect(2.6, 5.0, 0.8, 0.8, Meta::with_mass(2.0))?;
    let rod = JoinConstraintConfig::hard(3.6);
    world.add_point_constraint(bob, Vec2::new(3.0, 2.0), Vec2::ZERO, rod)?;
    let spring = world.add_join_constraint(
        bob,
        Vec2::new(3.0, 2.0),
        weight,
        Vec2::new(3.0, 5.4),
        JoinConstraintConfig::spring(2.0, 1.5, 0.3),
    )?;

    println!("Inserted ceiling={} bob={} weight={} spring={}", ceiling, bob, weight, spring);

    let moved = Rc::new(RefCell::new(Vec::new()));
    let sink = moved.clone();
    world.register_element_position_update_callback(move |id, translation, rotation| {
        sink.borrow_mut().push((id, translation, rotation));
    });

    for frame in 0..90 {
        world.step(1.0 / 60.0)?;
        if frame % 30 != 0 {
            moved.borrow_mut().clear();
            continue;
        }
        for (id, t, r) in moved.borrow_mut().drain(..) {
            println!("frame {frame}: body {id} moved ({:.3},{:.3}) rot={:.4}", t.x, t.y, r);
        }
        if let Some((a, b)) = world.joint_anchors(spring) {
            println!("  spring length={:.3}", (b - a).length());
        }
    }

    world.for_each_element(|shape| match shape.kind() {
        ShapeKind::Circle => println!(
            "circle {} at ({:.2},{:.2}) r={:.2}",
            shape.id,
            shape.center.x,
            shape.center.y,
            shape.radius().unwrap_or_default()
        ),
        ShapeKind::Polygon => {
            let vs: Vec<String> =
                shape.vertices().map(|v| format!("({:.2},{:.2})", v.x, v.y)).collect();
            println!("polygon {} [{}]", shape.id, vs.join(" "));
        }
    });
    Ok(())
}
