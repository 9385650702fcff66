// File: figurine-common/src/models/event.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::models::behavior::IdleBehavior;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HandGesture {
    Down,
    Up,
}

impl fmt::Display for HandGesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandGesture::Down => write!(f, "down"),
            HandGesture::Up => write!(f, "up"),
        }
    }
}

impl FromStr for HandGesture {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "down" => Ok(HandGesture::Down),
            "up" => Ok(HandGesture::Up),
            _ => Err(format!("Unknown hand gesture: {}", s)),
        }
    }
}

/// Requests accepted by the motion controller. Queued, then applied in
/// submission order at the start of the next tick.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Reset behaviour state to the idle baseline.
    Idle,
    /// Manual camera heading in degrees; overrides tracking and idle.
    AimCamera { heading: f64 },
    /// Drop the manual heading.
    ClearTarget,
    SetLeftHandGesture { gesture: HandGesture },
    SetRightHandGesture { gesture: HandGesture },
    SetIdleBehavior { behavior: IdleBehavior },
    /// `offset` is the normalised horizontal position in the frame, -1..=1, 0 = centred.
    PersonDetected { offset: f64, face_yaw: Option<f64> },
    PersonLost,
    StartPointingGesture,
    PointingAttentionDone,
    PointingLectureDone,
    SuppressWaving,
    AllowWaving,
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Idle => "idle",
            Event::AimCamera { .. } => "aim_camera",
            Event::ClearTarget => "clear_target",
            Event::SetLeftHandGesture { .. } => "set_left_hand_gesture",
            Event::SetRightHandGesture { .. } => "set_right_hand_gesture",
            Event::SetIdleBehavior { .. } => "set_idle_behavior",
            Event::PersonDetected { .. } => "person_detected",
            Event::PersonLost => "person_lost",
            Event::StartPointingGesture => "start_pointing_gesture",
            Event::PointingAttentionDone => "pointing_attention_done",
            Event::PointingLectureDone => "pointing_lecture_done",
            Event::SuppressWaving => "suppress_waving",
            Event::AllowWaving => "allow_waving",
        }
    }

    pub fn person(offset: f64) -> Self {
        Event::PersonDetected {
            offset,
            face_yaw: None,
        }
    }
}
