// File: figurine-common/src/traits/joint_driver.rs

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;

use crate::error::Error;
use crate::models::joint::JointId;
use crate::models::telemetry::TelemetryEvent;

/// Called with the measured logical position whenever it changes.
pub type PositionObserver = Arc<dyn Fn(f64) + Send + Sync>;

/// Structured diagnostics sink handed to each driver.
pub type TelemetryLogger = Arc<dyn Fn(TelemetryEvent) + Send + Sync>;

/// One actuated joint. Implemented by hardware and simulation backends;
/// the motion controller only ever talks to joints through this trait.
#[async_trait]
pub trait JointDriver: Send + Sync {
    fn id(&self) -> JointId;

    /// Bring the joint online, waiting at most `timeout` for attachment.
    async fn open(&self, timeout: Duration) -> Result<(), Error>;

    /// Command a new logical target. Repeating an unchanged target is a no-op.
    fn move_to_logical(&self, value: f64) -> Result<(), Error>;

    /// Maximum speed for subsequent moves, in logical units per second.
    fn set_velocity(&self, limit: f64) -> Result<(), Error>;

    /// Release the joint. Safe to call on a joint that never opened.
    fn shutdown(&self);

    fn set_position_observer(&self, observer: PositionObserver);

    fn set_telemetry_logger(&self, logger: TelemetryLogger);
}
