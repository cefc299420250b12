//! Error types for the rigid-body world.

use thiserror::Error;

use crate::types::{BodyId, JointId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// Rejected at construction; the shape never enters a world.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A step produced a non-finite position or velocity. The world is left
    /// as it was before the step.
    #[error("numerical divergence on body {body}")]
    NumericalDivergence { body: BodyId },

    #[error("unknown body: {0}")]
    UnknownBody(BodyId),

    #[error("unknown joint: {0}")]
    UnknownJoint(JointId),

    #[error("joint endpoints must be two different bodies (got {0} twice)")]
    SelfJoint(BodyId),
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
