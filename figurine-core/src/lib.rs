// src/lib.rs

pub mod drivers;
pub mod eventbus;
pub mod motion;
pub mod tasks;

pub use figurine_common::error::Error;
pub use motion::controller::{ControllerStatus, MotionController};
pub use motion::MotionContext;
