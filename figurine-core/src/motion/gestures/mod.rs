//! src/motion/gestures/mod.rs
//!
//! Hand autopilots. Each one is an explicit state machine that moves on measured
//! joint feedback (and, for the wave, a timed pause), never on a fixed script.

pub mod point;
pub mod wave;

use serde::Serialize;

use figurine_common::models::JointId;

pub use point::{PointAutopilot, PointState};
pub use wave::{WaveAutopilot, WaveInputs, WavePhase, WaveState};

/// A state change, reported for logging and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GestureTransition {
    pub hand: JointId,
    pub from: &'static str,
    pub to: &'static str,
    pub reason: &'static str,
}

/// Measured position is close enough to the commanded one.
pub(crate) fn reached(measured: Option<f64>, target: f64, tolerance: f64) -> bool {
    measured.map(|m| (m - target).abs() <= tolerance).unwrap_or(false)
}
