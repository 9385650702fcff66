//! src/motion/mod.rs
//!
//! Deterministic motion logic. Everything under this module takes the current
//! time as an argument and never sleeps, so it can be exercised without a runtime;
//! `controller` is the only part that owns a task.

pub mod controller;
pub mod gestures;
pub mod idle;
pub mod solver;
pub mod stall_guard;
pub mod state;
pub mod tracking;

use std::fmt;
use serde::{Deserialize, Serialize};

/// Which source currently owns the desired camera heading.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MotionContext {
    Manual,
    Tracking,
    Search,
}

impl fmt::Display for MotionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionContext::Manual => write!(f, "manual"),
            MotionContext::Tracking => write!(f, "tracking"),
            MotionContext::Search => write!(f, "search"),
        }
    }
}

/// First-order blend of `current` towards `target` at `rate` (1/s) over `dt` seconds.
pub(crate) fn follow(current: f64, target: f64, rate: f64, dt: f64) -> f64 {
    if rate <= 0.0 || dt <= 0.0 {
        return current;
    }
    let alpha = 1.0 - (-rate * dt).exp();
    current + (target - current) * alpha
}

/// Move `current` towards `target` by at most `max_step`.
pub(crate) fn approach(current: f64, target: f64, max_step: f64) -> f64 {
    let step = (target - current).clamp(-max_step.abs(), max_step.abs());
    current + step
}
