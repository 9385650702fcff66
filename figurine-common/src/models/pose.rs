// File: figurine-common/src/models/pose.rs

use serde::{Deserialize, Serialize};

use crate::models::joint::JointMap;

/// Point-in-time joint values. Camera heading is body + head.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub body: f64,
    pub head: f64,
    pub left_hand: f64,
    pub right_hand: f64,
}

impl Pose {
    pub fn camera_heading(&self) -> f64 {
        self.body + self.head
    }
}

impl From<JointMap<f64>> for Pose {
    fn from(m: JointMap<f64>) -> Self {
        Self {
            body: m.body,
            head: m.head,
            left_hand: m.left_hand,
            right_hand: m.right_hand,
        }
    }
}

impl From<Pose> for JointMap<f64> {
    fn from(p: Pose) -> Self {
        JointMap {
            body: p.body,
            head: p.head,
            left_hand: p.left_hand,
            right_hand: p.right_hand,
        }
    }
}
