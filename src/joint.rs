use glam::Vec2;

use crate::types::{BodyId, JoinConstraintConfig, JointId};

/// Second end of a joint.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum JointTarget {
    /// Anchor on another body, in that body's local frame.
    Body { id: BodyId, anchor: Vec2 },
    /// Fixed world-space point (a pin).
    Point(Vec2),
}

/// Distance constraint between a body anchor and a target.
#[derive(Clone, Debug, PartialEq)]
pub struct Joint {
    id: JointId,
    body: BodyId,
    /// Local-frame anchor on `body`.
    anchor: Vec2,
    target: JointTarget,
    config: JoinConstraintConfig,
}

impl Joint {
    pub(crate) fn new(
        id: JointId,
        body: BodyId,
        anchor: Vec2,
        target: JointTarget,
        config: JoinConstraintConfig,
    ) -> Self {
        Self { id, body, anchor, target, config }
    }

    pub fn id(&self) -> JointId {
        self.id
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn anchor(&self) -> Vec2 {
        self.anchor
    }

    pub fn target(&self) -> JointTarget {
        self.target
    }

    pub fn config(&self) -> &JoinConstraintConfig {
        &self.config
    }

    pub(crate) fn set_config(&mut self, config: JoinConstraintConfig) {
        self.config = config;
    }

    /// Other body, if the target is a body.
    pub fn other_body(&self) -> Option<BodyId> {
        match self.target {
            JointTarget::Body { id, .. } => Some(id),
            JointTarget::Point(_) => None,
        }
    }

    pub fn involves(&self, body: BodyId) -> bool {
        self.body == body || self.other_body() == Some(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_involves_both_ends() {
        let j = Joint::new(
            1,
            3,
            Vec2::ZERO,
            JointTarget::Body { id: 4, anchor: Vec2::X },
            JoinConstraintConfig::default(),
        );
        assert!(j.involves(3));
        assert!(j.involves(4));
        assert!(!j.involves(5));

        let pin = JointTarget::Point(Vec2::ONE);
        let pin = Joint::new(2, 3, Vec2::ZERO, pin, JoinConstraintConfig::hard(1.0));
        assert_eq!(pin.other_body(), None);
        assert!(!pin.involves(4));
    }
}
