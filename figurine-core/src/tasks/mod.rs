//! src/tasks/mod.rs
//!
//! Long-running helpers spawned next to the controller.

pub mod pose_sampler;
pub mod telemetry_logger;

pub use pose_sampler::spawn_pose_sampler;
pub use telemetry_logger::spawn_telemetry_logger;
