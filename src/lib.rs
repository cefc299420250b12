//! rigidbonk: 2D rigid-body engine with a persistent world, a sequential-impulse
//! solver and position listeners

pub mod types;
pub mod error;
pub mod api;
pub mod geometry;
pub mod body;
pub mod broadphase;
pub mod narrowphase;
pub mod joint;
pub mod dispatch;
pub mod world;

mod solver;

pub use crate::types::*;
pub use crate::api::*;
pub use crate::error::{PhysicsError, Result};
pub use crate::body::{Body, Shape, ShapeKind};
pub use crate::geometry::Geometry;
pub use crate::joint::{Joint, JointTarget};
pub use crate::world::PhysicsWorld;
