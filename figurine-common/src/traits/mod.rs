// File: figurine-common/src/traits/mod.rs
pub mod joint_driver;

pub use joint_driver::{JointDriver, PositionObserver, TelemetryLogger};
