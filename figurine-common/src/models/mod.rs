// File: figurine-common/src/models/mod.rs
pub mod joint;
pub mod pose;
pub mod event;
pub mod behavior;
pub mod settings;
pub mod detection;
pub mod telemetry;

pub use joint::{JointConfig, JointId, JointMap, Orientation, StallGuardConfig, ValueRange};
pub use pose::Pose;
pub use event::{Event, HandGesture};
pub use behavior::{
    IdleBehavior, MinimalIdleConfig, PatrolConfig, PointConfig, SolverConfig, SweepConfig,
    TrackingBehavior, WaveConfig,
};
pub use settings::Settings;
pub use detection::DetectionUpdate;
pub use telemetry::TelemetryEvent;
